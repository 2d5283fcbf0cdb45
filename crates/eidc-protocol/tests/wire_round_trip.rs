//! Byte-identity of the parse/marshal/impersonate pipeline against
//! wire-shaped captures of both endpoints.

use bytes::Bytes;
use eidc_protocol::{Direction, Message};
use http_wire::{impersonate, HttpFramer};

/// Messages as a real controller puts them on the wire.
const CONTROLLER_CAPTURE: &[&str] = &[
    "POST /eidc/connected HTTP/1.1\r\n\
     Host: fake.server.com\r\n\
     Content-Type: application/json\r\n\
     Content-Length: 116\r\n\
     ServerKey: 9c6e4f9330f54e4b8b911d5a22e85a6b\r\n\r\n\
     {\"serialNumber\":\"0127F01A\",\"firmwareVersion\":\"3.4.20\",\"ipAddress\":\"192.168.6.40\",\"siteKey\":\"ABC\",\"cardFormat\":\"26b\"}",
    "HTTP/1.0 200 OK\r\n\
     Server: eIDC32 WebServer\r\n\
     Content-type: application/json\r\n\
     Content-Length:  32\r\n\
     Cache-Control: no-cache\r\n\r\n\
     {\"result\":true, \"cmd\":\"SETTIME\"}",
    "POST /eidc/pointStatus HTTP/1.1\r\n\
     Host: fake.server.com\r\n\
     Content-Type: application/json\r\n\
     Content-Length: 66\r\n\
     ServerKey: 9c6e4f9330f54e4b8b911d5a22e85a6b\r\n\r\n\
     {\"time\":\"t\",\"points\":[{\"pointId\":12,\"oldStatus\":0,\"newStatus\":1}]}",
];

/// Messages as the real manager's listener puts them on the wire,
/// including the stray CRLF after empty-body GETs.
const MANAGER_CAPTURE: &[&str] = &[
    "GET /eidc/heartbeat?username=admin&password=admin&seq=9 HTTP/1.1\r\n\
     Host: 192.168.6.40\r\n\
     User-Agent: eIDCListener\r\n\r\n\r\n",
    "POST /eidc/setTime?username=admin&password=admin&seq=2 HTTP/1.1\r\n\
     Host: 192.168.6.40\r\n\
     User-Agent: eIDCListener\r\n\
     Content-Type: application/json\r\n\
     Content-Length: 28\r\n\r\n\
     {\"time\":\"2019-11-01T18:39Z\"}",
    "HTTP/1.1 200 OK\r\n\
     Content-Type: application/json\r\n\
     Content-Length: 26\r\n\r\n\
     {\"serverKey\":\"aabbccddee\"}",
];

fn frames(wire: &[u8]) -> Vec<Bytes> {
    let mut framer = HttpFramer::new();
    framer.extend(wire);
    let mut out = Vec::new();
    while let Some(frame) = framer.next_frame().unwrap() {
        out.push(frame);
    }
    framer.finish().unwrap();
    out
}

fn assert_round_trip(capture: &[&str], direction: Direction) {
    let wire: Vec<u8> = capture.concat().into_bytes();
    let framed = frames(&wire);
    assert_eq!(framed.len(), capture.len(), "framer lost or merged messages");

    for (frame, original) in framed.iter().zip(capture) {
        let msg = Message::parse(frame.clone(), direction).unwrap();
        let marshalled = msg.marshal().unwrap();
        let impersonated = impersonate(&marshalled, direction).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&impersonated),
            *original,
            "round trip diverged"
        );
    }
}

#[test]
fn controller_capture_round_trips() {
    assert_round_trip(CONTROLLER_CAPTURE, Direction::Northbound);
}

#[test]
fn manager_capture_round_trips() {
    assert_round_trip(MANAGER_CAPTURE, Direction::Southbound);
}

#[test]
fn framer_splits_mixed_pipelined_captures() {
    let mut wire = CONTROLLER_CAPTURE.concat().into_bytes();
    wire.extend_from_slice(MANAGER_CAPTURE.concat().as_bytes());
    let framed = frames(&wire);
    assert_eq!(framed.len(), CONTROLLER_CAPTURE.len() + MANAGER_CAPTURE.len());
    // Every frame reassembles the original stream.
    let rejoined: Vec<u8> = framed.iter().flat_map(|f| f.to_vec()).collect();
    assert_eq!(rejoined, wire);
}
