//! TCP session decoder
//!
//! Reconstructs per-flow connection state from passive observation. One
//! `TcpSession` per bidirectional flow holds two endpoint state machines
//! (client and server, roles fixed by the first SYN's direction) and lives
//! in a time-bucketed LRU table keyed by the Property's symmetric flow
//! label. Each packet drives both endpoints, and the decoder publishes the
//! derived direction, endpoint states, and in-order segment payloads as
//! `tcp_ssn.*` attributes and events.

use tracing::debug;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::lru::{LruEntry, LruHash};
use crate::netdec::{Decoder, EvId, Registry, ValId};
use crate::property::{FlowDir, Property};

const FIN: u8 = 0x01;
const SYN: u8 = 0x02;
const RST: u8 = 0x04;
const ACK: u8 = 0x10;
/// Only these bits participate in session tracking.
const FLAG_MASK: u8 = FIN | SYN | RST | ACK;

/// Widest plausible forward jump past the expected next sequence number.
/// Covers FIN consumption and segments the capture never saw, while still
/// rejecting garbage. Anything at or behind the expectation (retransmission)
/// always passes.
const SEQ_WINDOW: u32 = 65535;

/// Wheel size of the session table; one bucket per second.
const MAX_TTL: usize = 3600;

/// Connection state of one endpoint, as reconstructed from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TcpState {
    Closed = 0,
    Listen = 1,
    SynSent = 2,
    SynRcvd = 3,
    Established = 4,
    Closing = 5,
    TimeWait = 6,
}

impl Default for TcpState {
    fn default() -> Self {
        TcpState::Closed
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TcpState::Closed => "CLOSED",
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRcvd => "SYN_RCVD",
            TcpState::Established => "ESTABLISHED",
            TcpState::Closing => "CLOSING",
            TcpState::TimeWait => "TIME_WAIT",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TcpState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CLOSED" => Ok(TcpState::Closed),
            "LISTEN" => Ok(TcpState::Listen),
            "SYN_SENT" => Ok(TcpState::SynSent),
            "SYN_RCVD" => Ok(TcpState::SynRcvd),
            "ESTABLISHED" => Ok(TcpState::Established),
            "CLOSING" => Ok(TcpState::Closing),
            "TIME_WAIT" => Ok(TcpState::TimeWait),
            other => Err(format!("not a TCP state: {}", other)),
        }
    }
}

impl TryFrom<u8> for TcpState {
    type Error = u8;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(TcpState::Closed),
            1 => Ok(TcpState::Listen),
            2 => Ok(TcpState::SynSent),
            3 => Ok(TcpState::SynRcvd),
            4 => Ok(TcpState::Established),
            5 => Ok(TcpState::Closing),
            6 => Ok(TcpState::TimeWait),
            other => Err(other),
        }
    }
}

/// Renders a one-byte state attribute as its symbolic name.
fn fmt_tcp_state(bytes: &[u8]) -> String {
    bytes
        .first()
        .and_then(|b| TcpState::try_from(*b).ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string())
}

/// One half of a session. `send` is driven by packets this endpoint emitted,
/// `recv` by packets addressed to it.
#[derive(Debug, Default)]
struct Endpoint {
    /// First sequence number seen from this endpoint (its SYN), valid once
    /// `avail_seq` is set.
    base_seq: u32,
    /// Payload bytes observed from this endpoint while ESTABLISHED.
    sent_len: u64,
    /// Next sequence number this endpoint is expected to acknowledge.
    /// Reserved for ack liveness checks.
    #[allow(dead_code)]
    next_ack: u32,
    avail_seq: bool,
    #[allow(dead_code)]
    avail_ack: bool,
    state: TcpState,
    recv_fin: bool,
    recv_finack: bool,
    sent_finack: bool,
    /// True iff the last send/recv changed `state`. Gates both the
    /// established event and segment-data emission.
    updated: bool,
}

impl Endpoint {
    fn set_state(&mut self, state: TcpState) {
        self.state = state;
        self.updated = true;
    }

    /// This endpoint emitted a packet. `ack` is accepted for symmetry and
    /// reserved for retransmission checks.
    fn send(&mut self, flags: u8, seq: u32, _ack: u32, data_len: usize) {
        debug_assert_eq!(flags & !FLAG_MASK, 0);
        self.updated = false;

        match self.state {
            TcpState::Closed => {
                if flags == SYN {
                    self.set_state(TcpState::SynSent);
                    self.base_seq = seq;
                    self.avail_seq = true;
                }
            }
            TcpState::Listen => {
                if flags == SYN | ACK {
                    self.set_state(TcpState::SynRcvd);
                    self.base_seq = seq;
                    self.avail_seq = true;
                }
            }
            TcpState::SynSent => {
                if flags == ACK {
                    self.set_state(TcpState::Established);
                }
            }
            TcpState::SynRcvd => {
                if flags & FIN != 0 {
                    self.set_state(TcpState::Closing);
                } else {
                    self.set_state(TcpState::Established);
                }
            }
            TcpState::Established => {
                if flags & FIN != 0 {
                    self.set_state(TcpState::Closing);
                }
                if self.recv_fin && flags & ACK != 0 {
                    self.sent_finack = true;
                }
            }
            TcpState::Closing => {
                if self.recv_fin && flags & ACK != 0 {
                    self.sent_finack = true;
                }
            }
            TcpState::TimeWait => {}
        }

        if self.state == TcpState::Established {
            self.sent_len += data_len as u64;
        }
    }

    /// The peer emitted a packet addressed to this endpoint.
    fn recv(&mut self, flags: u8, seq: u32, _ack: u32, data_len: usize) {
        debug_assert_eq!(flags & !FLAG_MASK, 0);
        self.updated = false;

        match self.state {
            TcpState::Closed => {
                if flags == SYN {
                    self.set_state(TcpState::Listen);
                    self.next_ack = seq.wrapping_add(1);
                    self.avail_ack = true;
                }
            }
            TcpState::Listen => {}
            TcpState::SynSent => {
                if flags == SYN | ACK {
                    self.next_ack = seq.wrapping_add(1);
                    self.avail_ack = true;
                }
            }
            TcpState::SynRcvd => {}
            TcpState::Established => {
                if flags & FIN != 0 {
                    self.recv_fin = true;
                }
            }
            TcpState::Closing => {
                if flags & FIN != 0 {
                    self.recv_fin = true;
                }
                if flags & ACK != 0 {
                    self.recv_finack = true;
                }
                if self.recv_fin && self.recv_finack && self.sent_finack {
                    self.set_state(TcpState::TimeWait);
                }
            }
            TcpState::TimeWait => {}
        }

        if matches!(self.state, TcpState::Established | TcpState::SynRcvd) {
            self.next_ack = self.next_ack.wrapping_add(data_len as u32);
        }
    }

    /// Sequence plausibility, modulo 2^32: accept anything at or behind the
    /// expected next sequence number, and at most `SEQ_WINDOW` ahead of it.
    /// The +1 accounts for SYN consumption.
    fn check_seq(&self, seq: u32) -> bool {
        if !self.avail_seq {
            return true;
        }
        let expected = self
            .base_seq
            .wrapping_add(self.sent_len as u32)
            .wrapping_add(1);
        let ahead = seq.wrapping_sub(expected);
        ahead <= SEQ_WINDOW || ahead >= 1 << 31
    }
}

/// Per-flow session record, owned by the LRU table.
pub struct TcpSession {
    key: Vec<u8>,
    hash: u64,
    ts: i64,
    client: Endpoint,
    server: Endpoint,
    /// Direction of client-to-server traffic. Fixed by the first SYN.
    dir: FlowDir,
}

impl LruEntry for TcpSession {
    fn hash(&self) -> u64 {
        self.hash
    }

    fn key(&self) -> &[u8] {
        &self.key
    }
}

impl TcpSession {
    pub fn new(key: &[u8], hash: u64) -> Self {
        Self {
            key: key.to_vec(),
            hash,
            ts: 0,
            client: Endpoint::default(),
            server: Endpoint::default(),
            dir: FlowDir::Nil,
        }
    }

    pub fn set_ts(&mut self, ts: i64) {
        self.ts = ts;
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }

    pub fn to_server(&self, dir: FlowDir) -> bool {
        self.dir != FlowDir::Nil && self.dir == dir
    }

    pub fn to_client(&self, dir: FlowDir) -> bool {
        self.dir != FlowDir::Nil && self.dir != dir
    }

    pub fn server_stat(&self) -> TcpState {
        self.server.state
    }

    pub fn client_stat(&self) -> TcpState {
        self.client.state
    }

    /// Gate for segment-data emission: the sender for `dir` is ESTABLISHED
    /// and did not just transition. Suppresses emission on the packet that
    /// completes the handshake.
    pub fn is_data_available(&self, dir: FlowDir) -> bool {
        let sender = if self.dir == dir {
            &self.client
        } else {
            &self.server
        };
        !sender.updated && sender.state == TcpState::Established
    }

    /// True on the packet where the client endpoint entered ESTABLISHED.
    pub fn just_established(&self) -> bool {
        self.client.updated && self.client.state == TcpState::Established
    }

    /// Drive both endpoints with one observed packet. Returns false when the
    /// packet cannot be attributed: no SYN seen yet, unattributable
    /// direction, or an implausible sequence number. A false return leaves
    /// both endpoints untouched.
    pub fn update(&mut self, flags: u8, seq: u32, ack: u32, data_len: usize, dir: FlowDir) -> bool {
        let f = flags & FLAG_MASK;

        if self.dir == FlowDir::Nil {
            // Roles are fixed by the first SYN's direction; everything
            // before that is ignored.
            if f == SYN && dir != FlowDir::Nil {
                self.dir = dir;
                self.client.send(f, seq, ack, data_len);
                self.server.recv(f, seq, ack, data_len);
                true
            } else {
                false
            }
        } else {
            let to_server = self.to_server(dir);
            if !to_server && !self.to_client(dir) {
                return false;
            }
            let (sender, recver) = if to_server {
                (&mut self.client, &mut self.server)
            } else {
                (&mut self.server, &mut self.client)
            };
            if !sender.check_seq(seq) {
                return false;
            }
            sender.send(f, seq, ack, data_len);
            recver.recv(f, seq, ack, data_len);
            true
        }
    }
}

/// The session decoder: advances the table clock, fetches or creates the
/// session for the packet's flow, drives it, and publishes the results.
pub struct TcpSsnDecoder {
    ev_est: EvId,
    ev_data: EvId,
    p_seg: ValId,
    p_to_server: ValId,
    p_server_stat: ValId,
    p_client_stat: ValId,

    // Published by the TCP header decoder, resolved at setup.
    p_tcp_hdr: ValId,
    p_tcp_seq: ValId,
    p_tcp_ack: ValId,
    p_tcp_flags: ValId,

    table: LruHash<TcpSession>,
    timeout: i64,
    last_ts: i64,
}

impl TcpSsnDecoder {
    pub fn new(reg: &mut Registry, config: &SessionConfig) -> Self {
        Self {
            ev_est: reg.assign_event("tcp_ssn.established", "TCP session established"),
            ev_data: reg.assign_event("tcp_ssn.data", "TCP session segment data"),
            p_seg: reg.assign_value("tcp_ssn.segment", "TCP segment data"),
            p_to_server: reg.assign_value("tcp_ssn.to_server", "Packet to server"),
            p_server_stat: reg.assign_value_with(
                "tcp_ssn.server_stat",
                "TCP server status",
                fmt_tcp_state,
            ),
            p_client_stat: reg.assign_value_with(
                "tcp_ssn.client_stat",
                "TCP client status",
                fmt_tcp_state,
            ),
            p_tcp_hdr: ValId::MAX,
            p_tcp_seq: ValId::MAX,
            p_tcp_ack: ValId::MAX,
            p_tcp_flags: ValId::MAX,
            table: LruHash::new(MAX_TTL, config.table_size),
            timeout: config.timeout_sec,
            last_ts: 0,
        }
    }

    /// Advance the table clock to `now` and reap idle sessions. Entries the
    /// wheel expired but which saw traffic within the timeout are re-armed;
    /// backwards timestamps pause the clock without corrupting it.
    fn timeout_session(&mut self, now: i64) {
        if self.last_ts > 0 && self.last_ts < now {
            self.table.prog((now - self.last_ts) as usize);
        }
        self.last_ts = now;

        // Reinsertion can itself force-expire a bucket when the table is at
        // capacity; collecting first keeps the drain finite.
        let mut keep = Vec::new();
        while let Some(ssn) = self.table.pop() {
            if ssn.ts() + self.timeout < now {
                debug!(sessions = self.table.len(), "tcp session timed out");
            } else {
                keep.push(ssn);
            }
        }
        for ssn in keep {
            self.table.put(self.timeout as usize, ssn);
        }
    }

    /// Look up the packet's session, creating and inserting one on first
    /// sight. Refreshes the session timestamp either way.
    fn fetch_session(&mut self, p: &Property) -> Option<&mut TcpSession> {
        let hash = p.hash_value();
        let key = p.ssn_label()?;

        if self.table.get(hash, key).is_none() {
            self.table.put(self.timeout as usize, TcpSession::new(key, hash));
        }
        let ssn = self
            .table
            .get(hash, key)
            .expect("session inserted above");
        ssn.set_ts(p.tv_sec());
        Some(ssn)
    }
}

impl Decoder for TcpSsnDecoder {
    fn name(&self) -> &'static str {
        "tcp_ssn"
    }

    fn setup(&mut self, reg: &Registry) -> Result<()> {
        self.p_tcp_hdr = reg.lookup_value_id("tcp.header")?;
        self.p_tcp_seq = reg.lookup_value_id("tcp.seq")?;
        self.p_tcp_ack = reg.lookup_value_id("tcp.ack")?;
        self.p_tcp_flags = reg.lookup_value_id("tcp.flags")?;
        Ok(())
    }

    fn decode(&mut self, p: &mut Property) -> Option<&'static str> {
        self.timeout_session(p.tv_sec());

        if p.get_bytes(self.p_tcp_hdr).is_none() {
            return None;
        }
        let flags = p.get_u8(self.p_tcp_flags)?;
        let seq = p.get_u32(self.p_tcp_seq)?;
        let ack = p.get_u32(self.p_tcp_ack)?;
        let data_len = p.remain();
        let dir = p.dir();

        let (ev_est, ev_data) = (self.ev_est, self.ev_data);
        let (p_seg, p_to_server) = (self.p_seg, self.p_to_server);
        let (p_server_stat, p_client_stat) = (self.p_server_stat, self.p_client_stat);

        let ssn = self.fetch_session(p)?;
        if ssn.update(flags, seq, ack, data_len, dir) {
            let to_server = ssn.to_server(dir);
            p.copy(p_to_server, &[to_server as u8]);

            if ssn.just_established() {
                p.push_event(ev_est);
            }
            if ssn.is_data_available(dir) && data_len > 0 {
                let off = p.offset();
                p.set(p_seg, off..off + data_len);
                p.push_event(ev_data);
            }
        }

        p.copy(p_server_stat, &[ssn.server_stat() as u8]);
        p.copy(p_client_stat, &[ssn.client_stat() as u8]);

        None
    }
}
