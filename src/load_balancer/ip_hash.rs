//! IP hash load balancing strategy.
//!
//! Maps a client address to `backends[fnv1a(client) % size]`. The mapping is
//! stable for a fixed pool size and reshuffles when the size changes, which
//! only happens at startup.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::Pool, LoadBalancer};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a(key: &str) -> u32 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Client-affinity selector.
///
/// Without `strict`, the hashed slot is returned even when ineligible. With
/// `strict`, the next eligible backend after the slot is used instead.
#[derive(Debug, Default)]
pub struct IpHash {
    strict: bool,
}

impl IpHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl LoadBalancer for IpHash {
    fn name(&self) -> &'static str {
        "ip-hash"
    }

    fn next_server(&self, pool: &Pool, client: Option<&str>) -> Option<Arc<Backend>> {
        let key = client.unwrap_or_default();
        pool.with_backends(|backends| {
            let len = backends.len();
            if len == 0 {
                return None;
            }
            let slot = fnv1a(key) as usize % len;
            if !self.strict {
                return Some(backends[slot].clone());
            }
            (0..len)
                .map(|i| &backends[(slot + i) % len])
                .find(|b| b.is_eligible())
                .cloned()
        })
    }
}
