//! Ethernet-II link decoder

use etherparse::Ethernet2HeaderSlice;

use crate::netdec::{Decoder, EvId, Registry, ValId};
use crate::property::Property;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const HEADER_LEN: usize = 14;

pub struct EthernetDecoder {
    ev_pkt: EvId,
    p_hdr: ValId,
    p_src: ValId,
    p_dst: ValId,
    p_type: ValId,
}

impl EthernetDecoder {
    pub fn new(reg: &mut Registry) -> Self {
        Self {
            ev_pkt: reg.assign_event("ether.packet", "Ethernet packet"),
            p_hdr: reg.assign_value("ether.header", "Ethernet header"),
            p_src: reg.assign_value("ether.src", "Ethernet source address"),
            p_dst: reg.assign_value("ether.dst", "Ethernet destination address"),
            p_type: reg.assign_value("ether.type", "Ethernet type"),
        }
    }
}

impl Decoder for EthernetDecoder {
    fn name(&self) -> &'static str {
        "ethernet"
    }

    fn decode(&mut self, p: &mut Property) -> Option<&'static str> {
        let eth = Ethernet2HeaderSlice::from_slice(p.remaining()).ok()?;
        let ether_type = eth.ether_type().0;

        let base = p.offset();
        p.set(self.p_hdr, base..base + HEADER_LEN);
        p.set(self.p_dst, base..base + 6);
        p.set(self.p_src, base + 6..base + 12);
        p.set(self.p_type, base + 12..base + 14);
        p.push_event(self.ev_pkt);

        p.advance(HEADER_LEN);

        match ether_type {
            ETHERTYPE_IPV4 => Some("ipv4"),
            ETHERTYPE_IPV6 => Some("ipv6"),
            _ => None,
        }
    }
}
