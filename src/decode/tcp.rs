//! TCP header decoder
//!
//! Records the header fields as network-byte-order slices into the frame
//! and completes the Property's flow label with the port pair. The session
//! decoder downstream resolves these values by name at setup.

use etherparse::TcpHeaderSlice;

use crate::netdec::{Decoder, EvId, Registry, ValId};
use crate::property::Property;

pub struct TcpDecoder {
    ev_pkt: EvId,
    p_hdr: ValId,
    p_src_port: ValId,
    p_dst_port: ValId,
    p_seq: ValId,
    p_ack: ValId,
    p_flags: ValId,
    p_window: ValId,
}

impl TcpDecoder {
    pub fn new(reg: &mut Registry) -> Self {
        Self {
            ev_pkt: reg.assign_event("tcp.packet", "TCP packet"),
            p_hdr: reg.assign_value("tcp.header", "TCP header"),
            p_src_port: reg.assign_value("tcp.src_port", "TCP source port"),
            p_dst_port: reg.assign_value("tcp.dst_port", "TCP destination port"),
            p_seq: reg.assign_value("tcp.seq", "TCP sequence number"),
            p_ack: reg.assign_value("tcp.ack", "TCP acknowledgment number"),
            p_flags: reg.assign_value("tcp.flags", "TCP flags"),
            p_window: reg.assign_value("tcp.window", "TCP window size"),
        }
    }
}

impl Decoder for TcpDecoder {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn decode(&mut self, p: &mut Property) -> Option<&'static str> {
        let tcp = TcpHeaderSlice::from_slice(p.remaining()).ok()?;
        let hdr_len = tcp.slice().len();
        let (src_port, dst_port) = (tcp.source_port(), tcp.destination_port());

        let base = p.offset();
        p.set(self.p_hdr, base..base + hdr_len);
        p.set(self.p_src_port, base..base + 2);
        p.set(self.p_dst_port, base + 2..base + 4);
        p.set(self.p_seq, base + 4..base + 8);
        p.set(self.p_ack, base + 8..base + 12);
        p.set(self.p_flags, base + 13..base + 14);
        p.set(self.p_window, base + 14..base + 16);
        p.set_ports(src_port, dst_port);
        p.push_event(self.ev_pkt);

        p.advance(hdr_len);

        Some("tcp_ssn")
    }
}
