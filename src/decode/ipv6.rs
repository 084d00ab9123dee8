//! IPv6 network decoder
//!
//! Fixed 40-byte header only; extension-header chains are not walked, so a
//! datagram whose first next-header is not TCP ends the chain.

use etherparse::Ipv6HeaderSlice;

use crate::netdec::{Decoder, EvId, Registry, ValId};
use crate::property::Property;

const PROTO_TCP: u8 = 6;
const HEADER_LEN: usize = 40;

pub struct Ipv6Decoder {
    ev_pkt: EvId,
    p_hdr: ValId,
    p_src: ValId,
    p_dst: ValId,
    p_next: ValId,
}

impl Ipv6Decoder {
    pub fn new(reg: &mut Registry) -> Self {
        Self {
            ev_pkt: reg.assign_event("ipv6.packet", "IPv6 packet"),
            p_hdr: reg.assign_value("ipv6.header", "IPv6 header"),
            p_src: reg.assign_value("ipv6.src", "IPv6 source address"),
            p_dst: reg.assign_value("ipv6.dst", "IPv6 destination address"),
            p_next: reg.assign_value("ipv6.next", "IPv6 next header"),
        }
    }
}

impl Decoder for Ipv6Decoder {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn decode(&mut self, p: &mut Property) -> Option<&'static str> {
        let ip = Ipv6HeaderSlice::from_slice(p.remaining()).ok()?;
        let next_header = ip.next_header().0;
        let payload_len = ip.payload_length() as usize;

        let base = p.offset();
        p.set(self.p_hdr, base..base + HEADER_LEN);
        p.set(self.p_src, base + 8..base + 24);
        p.set(self.p_dst, base + 24..base + 40);
        p.set(self.p_next, base + 6..base + 7);
        p.set_addrs(base + 8..base + 24, base + 24..base + 40, next_header);
        p.push_event(self.ev_pkt);

        p.truncate(base + HEADER_LEN + payload_len);
        p.advance(HEADER_LEN);

        match next_header {
            PROTO_TCP => Some("tcp"),
            _ => None,
        }
    }
}
