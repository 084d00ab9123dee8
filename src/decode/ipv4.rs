//! IPv4 network decoder

use etherparse::Ipv4HeaderSlice;

use crate::netdec::{Decoder, EvId, Registry, ValId};
use crate::property::Property;

const PROTO_TCP: u8 = 6;

pub struct Ipv4Decoder {
    ev_pkt: EvId,
    p_hdr: ValId,
    p_src: ValId,
    p_dst: ValId,
    p_proto: ValId,
    p_ttl: ValId,
}

impl Ipv4Decoder {
    pub fn new(reg: &mut Registry) -> Self {
        Self {
            ev_pkt: reg.assign_event("ipv4.packet", "IPv4 packet"),
            p_hdr: reg.assign_value("ipv4.header", "IPv4 header"),
            p_src: reg.assign_value("ipv4.src", "IPv4 source address"),
            p_dst: reg.assign_value("ipv4.dst", "IPv4 destination address"),
            p_proto: reg.assign_value("ipv4.proto", "IPv4 protocol number"),
            p_ttl: reg.assign_value("ipv4.ttl", "IPv4 time to live"),
        }
    }
}

impl Decoder for Ipv4Decoder {
    fn name(&self) -> &'static str {
        "ipv4"
    }

    fn decode(&mut self, p: &mut Property) -> Option<&'static str> {
        let ip = Ipv4HeaderSlice::from_slice(p.remaining()).ok()?;
        let hdr_len = ip.slice().len();
        let total_len = ip.total_len() as usize;
        let proto = ip.protocol().0;
        let first_fragment = ip.fragments_offset().value() == 0;

        let base = p.offset();
        p.set(self.p_hdr, base..base + hdr_len);
        p.set(self.p_src, base + 12..base + 16);
        p.set(self.p_dst, base + 16..base + 20);
        p.set(self.p_proto, base + 9..base + 10);
        p.set(self.p_ttl, base + 8..base + 9);
        p.set_addrs(base + 12..base + 16, base + 16..base + 20, proto);
        p.push_event(self.ev_pkt);

        // Strip link-layer padding beyond the datagram.
        p.truncate(base + total_len);
        p.advance(hdr_len);

        // Transport headers only exist in the first fragment.
        if !first_fragment {
            return None;
        }
        match proto {
            PROTO_TCP => Some("tcp"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netdec::Registry;

    /// Minimal 20-byte header, no options.
    fn header(proto: u8, total_len: u16, frag_offset: u16) -> Vec<u8> {
        let mut h = vec![0u8; 20];
        h[0] = 0x45;
        h[2..4].copy_from_slice(&total_len.to_be_bytes());
        h[6..8].copy_from_slice(&(frag_offset & 0x1fff).to_be_bytes());
        h[8] = 64;
        h[9] = proto;
        h[12..16].copy_from_slice(&[192, 168, 1, 100]);
        h[16..20].copy_from_slice(&[10, 0, 0, 1]);
        h
    }

    #[test]
    fn test_routes_tcp_and_records_values() {
        let mut reg = Registry::default();
        let mut dec = Ipv4Decoder::new(&mut reg);
        let mut p = Property::new(reg.value_count());

        let mut frame = header(6, 40, 0);
        frame.extend_from_slice(&[0u8; 20]);
        p.init(&frame, 0);

        assert_eq!(dec.decode(&mut p), Some("tcp"));
        assert_eq!(p.offset(), 20);
        assert_eq!(p.get_u8(dec.p_proto), Some(6));
        assert_eq!(p.get_u8(dec.p_ttl), Some(64));
        assert_eq!(p.get_bytes(dec.p_src), Some(&[192, 168, 1, 100][..]));
    }

    #[test]
    fn test_padding_stripped_by_total_len() {
        let mut reg = Registry::default();
        let mut dec = Ipv4Decoder::new(&mut reg);
        let mut p = Property::new(reg.value_count());

        // 20-byte header + 10 payload bytes, then 16 bytes of padding.
        let mut frame = header(6, 30, 0);
        frame.extend_from_slice(&[0xaa; 10]);
        frame.extend_from_slice(&[0u8; 16]);
        p.init(&frame, 0);

        dec.decode(&mut p);
        assert_eq!(p.remain(), 10);
    }

    #[test]
    fn test_non_first_fragment_stops_chain() {
        let mut reg = Registry::default();
        let mut dec = Ipv4Decoder::new(&mut reg);
        let mut p = Property::new(reg.value_count());

        let mut frame = header(6, 40, 100);
        frame.extend_from_slice(&[0u8; 20]);
        p.init(&frame, 0);

        assert_eq!(dec.decode(&mut p), None);
    }

    #[test]
    fn test_non_tcp_stops_chain() {
        let mut reg = Registry::default();
        let mut dec = Ipv4Decoder::new(&mut reg);
        let mut p = Property::new(reg.value_count());

        let mut frame = header(17, 28, 0);
        frame.extend_from_slice(&[0u8; 8]);
        p.init(&frame, 0);

        assert_eq!(dec.decode(&mut p), None);
        // The layer itself is still decoded and announced.
        assert_eq!(p.events().len(), 1);
    }
}
