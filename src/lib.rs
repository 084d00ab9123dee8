//! # hornet
//!
//! Streaming packet inspection with TCP session tracking.
//!
//! Frames read from a live device or a pcap file pass through a chain of
//! protocol decoders (ethernet, IPv4/IPv6, TCP, TCP session). Decoders
//! record named, typed per-packet attributes and push named events; handlers
//! bound to events receive both after each packet. The TCP session decoder
//! keeps a bounded, time-bucketed table of per-flow connection state
//! machines and reports direction, endpoint states, and in-order segment
//! payloads.
//!
//! ```rust,no_run
//! use hornet::{Config, Engine, EvId, Handler, Property, Registry};
//!
//! struct Print;
//!
//! impl Handler for Print {
//!     fn recv(&mut self, _ev: EvId, p: &Property, _reg: &Registry) {
//!         println!("segment of {} bytes", p.remain());
//!     }
//! }
//!
//! fn main() -> hornet::Result<()> {
//!     let config = Config::default();
//!     let mut engine = Engine::from_file("capture.pcap", &config)?;
//!     engine.netdec_mut().bind_handler("tcp_ssn.data", Box::new(Print))?;
//!     engine.run()?;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod lru;
pub mod netdec;
pub mod property;

pub use config::{CaptureConfig, Config, SessionConfig};
pub use decode::tcp_ssn::{TcpSession, TcpState};
pub use engine::{Engine, EngineStats};
pub use error::{HornetError, Result};
pub use netdec::{Decoder, EvId, Handler, NetDec, Registry, ValId};
pub use property::{FlowDir, Property};
