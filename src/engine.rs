//! Capture-to-decoder engine loop

use tracing::info;

use crate::capture::{DeviceSource, FileSource, PacketSource};
use crate::config::Config;
use crate::error::Result;
use crate::netdec::NetDec;

/// Counters for one engine run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Owns one decoder chain and one capture source. Each engine processes its
/// packets to completion, one at a time; engines share nothing, so several
/// may run on their own captures in parallel.
pub struct Engine {
    nd: NetDec,
    source: Box<dyn PacketSource>,
    stats: EngineStats,
}

impl Engine {
    pub fn from_file(path: &str, config: &Config) -> Result<Self> {
        let nd = NetDec::new(config)?;
        let source = Box::new(FileSource::open(path)?);
        Ok(Self {
            nd,
            source,
            stats: EngineStats::default(),
        })
    }

    pub fn from_device(device: &str, config: &Config) -> Result<Self> {
        let nd = NetDec::new(config)?;
        let source = Box::new(DeviceSource::open(device, &config.capture)?);
        Ok(Self {
            nd,
            source,
            stats: EngineStats::default(),
        })
    }

    /// The decoder hub, for binding handlers before `run`.
    pub fn netdec_mut(&mut self) -> &mut NetDec {
        &mut self.nd
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Pump frames through the chain until the source is exhausted.
    pub fn run(&mut self) -> Result<EngineStats> {
        while let Some(frame) = self.source.next_frame()? {
            self.stats.packets += 1;
            self.stats.bytes += frame.data.len() as u64;
            self.nd.input(&frame.data, frame.tv_sec);
        }
        info!(
            packets = self.stats.packets,
            bytes = self.stats.bytes,
            "capture source exhausted"
        );
        Ok(self.stats)
    }
}
