//! End-to-end decoder chain tests over synthesized frames

use std::cell::RefCell;
use std::rc::Rc;

use etherparse::PacketBuilder;

use hornet::{Config, EvId, Handler, NetDec, Property, Registry};

/// One delivered event with the attributes the session decoder published.
#[derive(Debug, Clone)]
struct Delivered {
    event: String,
    to_server: Option<u8>,
    client: String,
    server: String,
    seg_len: usize,
}

#[derive(Clone)]
struct Recorder {
    log: Rc<RefCell<Vec<Delivered>>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn events(&self, name: &str) -> Vec<Delivered> {
        self.log
            .borrow()
            .iter()
            .filter(|d| d.event == name)
            .cloned()
            .collect()
    }

    fn total(&self) -> usize {
        self.log.borrow().len()
    }
}

impl Handler for Recorder {
    fn recv(&mut self, ev: EvId, p: &Property, reg: &Registry) {
        let get = |name: &str| reg.lookup_value_id(name).ok();
        let seg_len = get("tcp_ssn.segment")
            .and_then(|id| p.get_bytes(id))
            .map(|s| s.len())
            .unwrap_or(0);

        self.log.borrow_mut().push(Delivered {
            event: reg.event_name(ev).unwrap_or("?").to_string(),
            to_server: get("tcp_ssn.to_server").and_then(|id| p.get_u8(id)),
            client: get("tcp_ssn.client_stat")
                .and_then(|id| reg.repr(id, p))
                .unwrap_or_default(),
            server: get("tcp_ssn.server_stat")
                .and_then(|id| reg.repr(id, p))
                .unwrap_or_default(),
            seg_len,
        });
    }
}

fn netdec_with_recorder() -> (NetDec, Recorder) {
    let mut nd = NetDec::new(&Config::default()).expect("decoder chain");
    let rec = Recorder::new();
    nd.bind_handler("tcp_ssn.established", Box::new(rec.clone()))
        .unwrap();
    nd.bind_handler("tcp_ssn.data", Box::new(rec.clone())).unwrap();
    (nd, rec)
}

#[allow(clippy::too_many_arguments)]
fn frame(
    src: ([u8; 4], u16),
    dst: ([u8; 4], u16),
    seq: u32,
    ack: Option<u32>,
    syn: bool,
    fin: bool,
    payload: &[u8],
) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
        .ipv4(src.0, dst.0, 64)
        .tcp(src.1, dst.1, seq, 65535);
    let builder = if syn { builder.syn() } else { builder };
    let builder = if fin { builder.fin() } else { builder };
    let builder = match ack {
        Some(n) => builder.ack(n),
        None => builder,
    };

    let mut out = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut out, payload).unwrap();
    out
}

const CLIENT: ([u8; 4], u16) = ([192, 168, 1, 100], 54321);
const SERVER: ([u8; 4], u16) = ([10, 0, 0, 1], 80);

#[test]
fn test_handshake_emits_established() {
    let (mut nd, rec) = netdec_with_recorder();

    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 100);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 100);
    assert_eq!(rec.total(), 0);

    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 101);

    let est = rec.events("tcp_ssn.established");
    assert_eq!(est.len(), 1);
    assert_eq!(est[0].to_server, Some(1));
    assert_eq!(est[0].client, "ESTABLISHED");
    assert_eq!(est[0].server, "SYN_RCVD");
    // The handshake ACK is not a data segment.
    assert!(rec.events("tcp_ssn.data").is_empty());
}

#[test]
fn test_data_segment_emits_data_event() {
    let (mut nd, rec) = netdec_with_recorder();

    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 100);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 100);
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 101);

    let payload = vec![0x41u8; 100];
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, &payload), 102);

    let data = rec.events("tcp_ssn.data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].seg_len, 100);
    assert_eq!(data[0].to_server, Some(1));
    assert_eq!(data[0].client, "ESTABLISHED");
}

#[test]
fn test_server_reply_is_to_client() {
    let (mut nd, rec) = netdec_with_recorder();

    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 100);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 100);
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 101);
    // First server segment flips it into ESTABLISHED (no event for that
    // packet); the second one is reported.
    nd.input(&frame(SERVER, CLIENT, 5001, Some(1001), false, false, b"ok"), 102);
    nd.input(&frame(SERVER, CLIENT, 5003, Some(1001), false, false, b"more"), 103);

    let data = rec.events("tcp_ssn.data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].to_server, Some(0));
    assert_eq!(data[0].seg_len, 4);
    assert_eq!(data[0].server, "ESTABLISHED");
}

#[test]
fn test_pre_syn_traffic_is_silent() {
    let (mut nd, rec) = netdec_with_recorder();

    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b"data"), 100);
    nd.input(&frame(SERVER, CLIENT, 5001, Some(1005), false, false, b"back"), 101);

    assert_eq!(rec.total(), 0);
}

#[test]
fn test_implausible_seq_suppresses_emission() {
    let (mut nd, rec) = netdec_with_recorder();

    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 100);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 100);
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 101);

    nd.input(&frame(CLIENT, SERVER, 900_000, Some(5001), false, false, b"xx"), 102);
    assert!(rec.events("tcp_ssn.data").is_empty());

    // The session is still usable afterwards.
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b"ok"), 103);
    assert_eq!(rec.events("tcp_ssn.data").len(), 1);
}

#[test]
fn test_session_evicted_after_timeout() {
    let (mut nd, rec) = netdec_with_recorder();
    let other = ([172, 16, 0, 9], 40000);

    // Establish a session at t=1000.
    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 1000);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 1000);
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 1000);
    assert_eq!(rec.events("tcp_ssn.established").len(), 1);

    // Unrelated heartbeat past the idle deadline advances the table clock
    // and reaps the first flow.
    nd.input(&frame(other, SERVER, 7000, None, true, false, b""), 1301);

    // The old flow's state is gone: its data now hits a fresh pre-SYN
    // session and produces nothing.
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b"late"), 1302);
    assert!(rec.events("tcp_ssn.data").is_empty());

    // A new handshake on the same five-tuple starts over cleanly.
    nd.input(&frame(CLIENT, SERVER, 9000, None, true, false, b""), 1303);
    nd.input(&frame(SERVER, CLIENT, 400, Some(9001), true, false, b""), 1303);
    nd.input(&frame(CLIENT, SERVER, 9001, Some(401), false, false, b""), 1304);
    assert_eq!(rec.events("tcp_ssn.established").len(), 2);
}

#[test]
fn test_session_survives_within_timeout() {
    let (mut nd, rec) = netdec_with_recorder();
    let other = ([172, 16, 0, 9], 40000);

    nd.input(&frame(CLIENT, SERVER, 1000, None, true, false, b""), 1000);
    nd.input(&frame(SERVER, CLIENT, 5000, Some(1001), true, false, b""), 1000);
    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b""), 1000);

    // 200 idle seconds is within the deadline.
    nd.input(&frame(other, SERVER, 7000, None, true, false, b""), 1200);

    nd.input(&frame(CLIENT, SERVER, 1001, Some(5001), false, false, b"hi"), 1201);
    assert_eq!(rec.events("tcp_ssn.data").len(), 1);
}

#[test]
fn test_ipv6_flow_tracks_sessions() {
    let (mut nd, rec) = netdec_with_recorder();

    let c6 = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
    let s6 = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
    let v6 = |src: [u8; 16],
              dst: [u8; 16],
              sport: u16,
              dport: u16,
              seq: u32,
              ack: Option<u32>,
              syn: bool,
              payload: &[u8]| {
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv6(src, dst, 64)
            .tcp(sport, dport, seq, 65535);
        let builder = if syn { builder.syn() } else { builder };
        let builder = match ack {
            Some(n) => builder.ack(n),
            None => builder,
        };
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    };

    nd.input(&v6(c6, s6, 443, 50000, 1000, None, true, b""), 100);
    nd.input(&v6(s6, c6, 50000, 443, 5000, Some(1001), true, b""), 100);
    nd.input(&v6(c6, s6, 443, 50000, 1001, Some(5001), false, b""), 101);
    nd.input(&v6(c6, s6, 443, 50000, 1001, Some(5001), false, b"GET"), 102);

    assert_eq!(rec.events("tcp_ssn.established").len(), 1);
    let data = rec.events("tcp_ssn.data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].seg_len, 3);
}
