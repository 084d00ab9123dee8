//! Protocol decoders
//!
//! The chain is built from the explicit constructor list in [`build`];
//! adding a decoder means adding one line there. Routing between decoders is
//! by name: each decoder's `decode` hands back the name of the decoder that
//! should continue with the rest of the frame.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod tcp_ssn;

use crate::config::Config;
use crate::netdec::{Decoder, Registry};

/// Name of the decoder every frame enters the chain at.
pub const ENTRY: &str = "ethernet";

/// Construct every decoder, assigning their events and values. Callers run
/// the `setup` phase afterwards to resolve cross-decoder value IDs.
pub fn build(reg: &mut Registry, config: &Config) -> Vec<Box<dyn Decoder>> {
    vec![
        Box::new(ethernet::EthernetDecoder::new(reg)),
        Box::new(ipv4::Ipv4Decoder::new(reg)),
        Box::new(ipv6::Ipv6Decoder::new(reg)),
        Box::new(tcp::TcpDecoder::new(reg)),
        Box::new(tcp_ssn::TcpSsnDecoder::new(reg, &config.session)),
    ]
}
