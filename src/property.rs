//! Per-packet scratch state shared along the decoder chain
//!
//! One `Property` is reused for every packet. Decoders consume header bytes
//! by advancing the cursor, record attribute values as ranges into the frame
//! (network byte order) or as owned copies, and queue events for handler
//! delivery after the chain finishes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Range;

use crate::netdec::{EvId, ValId};

/// Packet direction derived from the byte order of the endpoint identities,
/// before any session state exists. `L2R` means the lexicographically lower
/// endpoint is the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDir {
    Nil,
    L2R,
    R2L,
}

impl Default for FlowDir {
    fn default() -> Self {
        FlowDir::Nil
    }
}

/// One attribute slot.
#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    /// Range into the frame buffer.
    Slice(Range<usize>),
    /// Owned copy, for values that do not live in the frame.
    Owned(Vec<u8>),
}

/// Per-packet state: frame bytes, cursor, attribute slots, events, and the
/// direction-symmetric flow identity.
pub struct Property {
    data: Vec<u8>,
    /// Readable limit; clamped below `data.len()` once the IP layer reports
    /// its total length (strips link-layer padding).
    end: usize,
    offset: usize,
    tv_sec: i64,
    slots: Vec<Slot>,
    events: Vec<EvId>,
    src_addr: Option<Range<usize>>,
    dst_addr: Option<Range<usize>>,
    src_port: u16,
    dst_port: u16,
    proto: u8,
    label: Vec<u8>,
    hash: u64,
    dir: FlowDir,
}

impl Property {
    pub fn new(n_values: usize) -> Self {
        Self {
            data: Vec::new(),
            end: 0,
            offset: 0,
            tv_sec: 0,
            slots: vec![Slot::Empty; n_values],
            events: Vec::new(),
            src_addr: None,
            dst_addr: None,
            src_port: 0,
            dst_port: 0,
            proto: 0,
            label: Vec::new(),
            hash: 0,
            dir: FlowDir::Nil,
        }
    }

    /// Reset for the next frame.
    pub fn init(&mut self, data: &[u8], tv_sec: i64) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.end = self.data.len();
        self.offset = 0;
        self.tv_sec = tv_sec;
        for slot in &mut self.slots {
            *slot = Slot::Empty;
        }
        self.events.clear();
        self.src_addr = None;
        self.dst_addr = None;
        self.src_port = 0;
        self.dst_port = 0;
        self.proto = 0;
        self.label.clear();
        self.hash = 0;
        self.dir = FlowDir::Nil;
    }

    pub fn tv_sec(&self) -> i64 {
        self.tv_sec
    }

    pub fn dir(&self) -> FlowDir {
        self.dir
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// Unconsumed bytes below the readable limit.
    pub fn remain(&self) -> usize {
        self.end.saturating_sub(self.offset)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The unconsumed slice, for header parsers.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset.min(self.end)..self.end]
    }

    /// The first `n` unconsumed bytes, without advancing.
    pub fn payload(&self, n: usize) -> Option<&[u8]> {
        if n > self.remain() {
            return None;
        }
        Some(&self.data[self.offset..self.offset + n])
    }

    pub fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.end);
    }

    /// Clamp the readable limit to `end` bytes from the frame start. Used by
    /// the IP decoders so trailing link-layer padding never counts as
    /// payload. Never extends past the captured bytes.
    pub fn truncate(&mut self, end: usize) {
        self.end = end.min(self.data.len());
    }

    // =========================================================================
    // Attribute slots
    // =========================================================================

    /// Attach a frame range as the value of `id`.
    pub fn set(&mut self, id: ValId, range: Range<usize>) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = Slot::Slice(range);
        }
    }

    /// Attach an owned copy as the value of `id`.
    pub fn copy(&mut self, id: ValId, bytes: &[u8]) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = Slot::Owned(bytes.to_vec());
        }
    }

    pub fn get_bytes(&self, id: ValId) -> Option<&[u8]> {
        match self.slots.get(id)? {
            Slot::Empty => None,
            Slot::Slice(r) => self.data.get(r.clone()),
            Slot::Owned(v) => Some(v),
        }
    }

    pub fn get_u8(&self, id: ValId) -> Option<u8> {
        self.get_bytes(id)?.first().copied()
    }

    pub fn get_u16(&self, id: ValId) -> Option<u16> {
        let b = self.get_bytes(id)?;
        Some(u16::from_be_bytes(b.get(..2)?.try_into().ok()?))
    }

    pub fn get_u32(&self, id: ValId) -> Option<u32> {
        let b = self.get_bytes(id)?;
        Some(u32::from_be_bytes(b.get(..4)?.try_into().ok()?))
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn push_event(&mut self, id: EvId) {
        self.events.push(id);
    }

    pub fn events(&self) -> &[EvId] {
        &self.events
    }

    // =========================================================================
    // Flow identity
    // =========================================================================

    /// Record the network-layer endpoint addresses (frame ranges) and the
    /// transport protocol number.
    pub fn set_addrs(&mut self, src: Range<usize>, dst: Range<usize>, proto: u8) {
        self.src_addr = Some(src);
        self.dst_addr = Some(dst);
        self.proto = proto;
    }

    /// Record the transport ports and finalize the flow label. Both
    /// directions of a connection produce identical label bytes: the lower
    /// (addr, port) endpoint always comes first, and the packet direction is
    /// derived from the same comparison.
    pub fn set_ports(&mut self, src_port: u16, dst_port: u16) {
        self.src_port = src_port;
        self.dst_port = dst_port;

        let (src, dst) = match (&self.src_addr, &self.dst_addr) {
            (Some(s), Some(d)) => (s.clone(), d.clone()),
            _ => return,
        };
        let src_bytes = match self.data.get(src) {
            Some(b) => b,
            None => return,
        };
        let dst_bytes = match self.data.get(dst) {
            Some(b) => b,
            None => return,
        };

        let a = (src_bytes, src_port);
        let b = (dst_bytes, dst_port);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.dir = if a <= b { FlowDir::L2R } else { FlowDir::R2L };

        self.label.clear();
        self.label.extend_from_slice(lo.0);
        self.label.extend_from_slice(&lo.1.to_be_bytes());
        self.label.extend_from_slice(hi.0);
        self.label.extend_from_slice(&hi.1.to_be_bytes());
        self.label.push(self.proto);

        let mut hasher = DefaultHasher::new();
        self.label.hash(&mut hasher);
        self.hash = hasher.finish();
    }

    /// Direction-symmetric flow label, once both layers contributed.
    pub fn ssn_label(&self) -> Option<&[u8]> {
        if self.label.is_empty() {
            None
        } else {
            Some(&self.label)
        }
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    // =========================================================================
    // Display accessors
    // =========================================================================

    pub fn src_addr(&self) -> Option<IpAddr> {
        addr_from_range(&self.data, self.src_addr.as_ref()?)
    }

    pub fn dst_addr(&self) -> Option<IpAddr> {
        addr_from_range(&self.data, self.dst_addr.as_ref()?)
    }

    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }
}

fn addr_from_range(data: &[u8], range: &Range<usize>) -> Option<IpAddr> {
    let bytes = data.get(range.clone())?;
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
