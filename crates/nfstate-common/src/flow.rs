//! Flow identifiers used as container keys

use std::net::Ipv4Addr;

use crate::hash::{fold64, FnKeyOps};

/// IPv4 5-tuple flow key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct FlowKey {
    /// Source IP (host order)
    pub src_ip: u32,
    /// Destination IP (host order)
    pub dst_ip: u32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol (TCP=6, UDP=17)
    pub protocol: u8,
}

impl FlowKey {
    /// Create from raw fields
    #[inline(always)]
    pub const fn new(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16, protocol: u8) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Create from IPv4 addresses
    #[inline(always)]
    pub const fn from_v4(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self::new(
            u32::from_be_bytes(src.octets()),
            u32::from_be_bytes(dst.octets()),
            src_port,
            dst_port,
            protocol,
        )
    }

    /// Reverse (reply) direction
    #[inline(always)]
    pub const fn reverse(&self) -> Self {
        Self::new(
            self.dst_ip,
            self.src_ip,
            self.dst_port,
            self.src_port,
            self.protocol,
        )
    }

    /// FxHash-style mix of all fields, folded to 32 bits
    #[inline(always)]
    pub fn fx_hash(&self) -> u32 {
        const K: u64 = 0x517cc1b727220a95;
        let mut h: u64 = 0;

        h = h.wrapping_add((self.src_ip as u64).wrapping_mul(K));
        h = h.rotate_left(31);
        h = h.wrapping_add((self.dst_ip as u64).wrapping_mul(K));
        h = h.rotate_left(31);
        h = h.wrapping_add(
            ((self.src_port as u64) << 48 | (self.dst_port as u64) << 32 | (self.protocol as u64))
                .wrapping_mul(K),
        );
        fold64(h)
    }

    /// Key capability using [`FlowKey::fx_hash`]
    pub const fn key_ops() -> FnKeyOps<FlowKey> {
        fn eq(a: &FlowKey, b: &FlowKey) -> bool {
            a == b
        }
        fn hash(k: &FlowKey) -> u32 {
            k.fx_hash()
        }
        FnKeyOps::new(eq, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::KeyOps;

    #[test]
    fn test_flow_hash() {
        let flow = FlowKey::from_v4(
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(10, 0, 0, 1),
            12345,
            443,
            6,
        );
        let other = FlowKey::from_v4(
            Ipv4Addr::new(192, 168, 1, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            12345,
            443,
            6,
        );

        let copy = flow;
        assert_eq!(flow.fx_hash(), copy.fx_hash());
        assert_ne!(flow.fx_hash(), other.fx_hash());
    }

    #[test]
    fn test_reverse() {
        let flow = FlowKey::new(1, 2, 3, 4, 17);
        let rev = flow.reverse();

        assert_eq!(rev, FlowKey::new(2, 1, 4, 3, 17));
        assert_eq!(rev.reverse(), flow);
    }

    #[test]
    fn test_key_ops() {
        let ops = FlowKey::key_ops();
        let a = FlowKey::new(1, 2, 3, 4, 6);

        assert_eq!(ops.key_hash(&a), a.fx_hash());
        assert!(ops.key_eq(&a, &FlowKey::new(1, 2, 3, 4, 6)));
        assert!(!ops.key_eq(&a, &a.reverse()));
    }
}
