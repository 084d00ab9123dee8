//! Packet capture sources
//!
//! Two sources behind one trait: offline pcap files and live devices. Both
//! hand frames to the engine as owned byte buffers stamped with the capture
//! header's wall-clock second.

use pcap::{Active, Capture, Offline};
use tracing::info;

use crate::config::CaptureConfig;
use crate::error::Result;

/// One captured frame.
pub struct RawFrame {
    pub data: Vec<u8>,
    pub tv_sec: i64,
}

/// A stream of frames. `Ok(None)` means the source is exhausted; live
/// sources block (retrying read timeouts) until a frame arrives.
pub trait PacketSource: Send {
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Offline pcap file replay.
pub struct FileSource {
    cap: Capture<Offline>,
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        let cap = Capture::from_file(path)?;
        info!(path, "reading capture file");
        Ok(Self { cap })
    }
}

impl PacketSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match self.cap.next_packet() {
            Ok(pkt) => Ok(Some(RawFrame {
                data: pkt.data.to_vec(),
                tv_sec: pkt.header.ts.tv_sec as i64,
            })),
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Live capture on a network device.
pub struct DeviceSource {
    cap: Capture<Active>,
}

impl DeviceSource {
    pub fn open(device: &str, config: &CaptureConfig) -> Result<Self> {
        let cap = Capture::from_device(device)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .open()?;
        info!(device, promisc = config.promiscuous, "capturing on device");
        Ok(Self { cap })
    }
}

impl PacketSource for DeviceSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            match self.cap.next_packet() {
                Ok(pkt) => {
                    return Ok(Some(RawFrame {
                        data: pkt.data.to_vec(),
                        tv_sec: pkt.header.ts.tv_sec as i64,
                    }))
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
