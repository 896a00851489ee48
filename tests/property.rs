//! Property-based tests for the frame codecs and handshake primitives.
//!
//! These tests use proptest to fuzz the wire-level logic and find edge cases.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use wsproto::codec::{FrameDecoder, FrameDecoder00, FrameEncoder, FrameEncoder00};
use wsproto::handshake::{ServerHandshaker, compute_accept_key, hixie_key_number};
use wsproto::protocol::{Frame, OpCode, apply_mask, apply_mask_fast};
use wsproto::status::CloseStatus;
use wsproto::{Config, Encoder};

/// Strategy for generating data frame opcodes that may start a message.
fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

/// Encode `frames` in order and return the concatenated wire bytes.
fn encode_all(encoder: &mut FrameEncoder, frames: &[Frame]) -> BytesMut {
    let mut buf = BytesMut::new();
    for frame in frames {
        buf.extend_from_slice(&encoder.encode(frame).unwrap().into_bytes());
    }
    buf
}

/// Decode every complete frame in `src`.
fn decode_all(decoder: &mut FrameDecoder, src: &mut BytesMut) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = decoder.decode(src).unwrap() {
        frames.push(frame);
    }
    frames
}

proptest! {
    // =========================================================================
    // Property 1: client-to-server round trip (masked wire format)
    // =========================================================================
    #[test]
    fn test_round_trip_masked(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(opcode, Bytes::from(payload.clone()), true);
        let mut encoder = FrameEncoder::new(&Config::client());
        let mut decoder = FrameDecoder::new(&Config::server());

        let mut wire = encode_all(&mut encoder, &[frame]);
        let decoded = decode_all(&mut decoder, &mut wire);

        prop_assert_eq!(decoded.len(), 1);
        prop_assert_eq!(decoded[0].opcode(), opcode);
        prop_assert!(decoded[0].is_final());
        prop_assert_eq!(decoded[0].payload().as_ref(), payload.as_slice());
        prop_assert!(wire.is_empty(), "all wire bytes should be consumed");
    }

    // =========================================================================
    // Property 2: server-to-client round trip (unmasked wire format)
    // =========================================================================
    #[test]
    fn test_round_trip_unmasked(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(opcode, Bytes::from(payload.clone()), true);
        let mut encoder = FrameEncoder::new(&Config::server());
        let mut decoder = FrameDecoder::new(&Config::client());

        let mut wire = encode_all(&mut encoder, &[frame]);
        let decoded = decode_all(&mut decoder, &mut wire);

        prop_assert_eq!(decoded.len(), 1);
        prop_assert_eq!(decoded[0].payload().as_ref(), payload.as_slice());
    }

    // =========================================================================
    // Property 3: legal fragment sequences survive the codec intact
    // =========================================================================
    #[test]
    fn test_fragment_sequence_round_trip(
        opcode in data_opcode_strategy(),
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 1..5)
    ) {
        let last = chunks.len() - 1;
        let frames: Vec<Frame> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let op = if i == 0 { opcode } else { OpCode::Continuation };
                Frame::new(op, Bytes::from(chunk.clone()), i == last)
            })
            .collect();

        let mut encoder = FrameEncoder::new(&Config::client());
        let mut decoder = FrameDecoder::new(&Config::server());
        let mut wire = encode_all(&mut encoder, &frames);
        let decoded = decode_all(&mut decoder, &mut wire);

        prop_assert_eq!(decoded.len(), chunks.len());
        for (frame, chunk) in decoded.iter().zip(&chunks) {
            prop_assert_eq!(frame.payload().as_ref(), chunk.as_slice());
        }
        prop_assert!(decoded[last].is_final());
    }

    // =========================================================================
    // Property 4: masking is an involution, and the fast path agrees with
    // the byte-at-a-time path
    // =========================================================================
    #[test]
    fn test_mask_involution(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut twice = data.clone();
        apply_mask(&mut twice, mask);
        apply_mask(&mut twice, mask);
        prop_assert_eq!(&twice, &data);

        let mut slow = data.clone();
        let mut fast = data.clone();
        apply_mask(&mut slow, mask);
        apply_mask_fast(&mut fast, mask);
        prop_assert_eq!(slow, fast);
    }

    // =========================================================================
    // Property 5: the decoder never panics on arbitrary input
    // =========================================================================
    #[test]
    fn test_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let mut decoder = FrameDecoder::new(&Config::server());
        let mut src = BytesMut::from(&data[..]);
        loop {
            match decoder.decode(&mut src) {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }

    // =========================================================================
    // Property 6: close status encoding round-trips code and reason
    // =========================================================================
    #[test]
    fn test_close_status_round_trip(reason in ".{0,30}") {
        let status = CloseStatus::new(1000, reason.clone()).unwrap();
        let encoded = status.encode();
        let parsed = CloseStatus::parse(&encoded).unwrap().unwrap();
        prop_assert_eq!(parsed.code(), 1000);
        prop_assert_eq!(parsed.reason(), reason.as_str());
    }

    // =========================================================================
    // Property 7: hybi-00 framing round-trips text and binary payloads
    // =========================================================================
    #[test]
    fn test_v00_round_trip(
        text in "[a-zA-Z0-9 ]{0,200}",
        binary in prop::collection::vec(any::<u8>(), 0..200),
    ) {
        let mut encoder = FrameEncoder00::new();
        let mut decoder = FrameDecoder00::new(&Config::server());
        let text_frame = Frame::text(text.clone());
        let binary_frame = Frame::binary(binary.clone());
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&encoder.encode(&text_frame).unwrap().into_bytes());
        wire.extend_from_slice(&encoder.encode(&binary_frame).unwrap().into_bytes());

        let first = decoder.decode(&mut wire).unwrap().unwrap();
        prop_assert_eq!(first.opcode(), OpCode::Text);
        prop_assert_eq!(first.payload().as_ref(), text.as_bytes());

        let second = decoder.decode(&mut wire).unwrap().unwrap();
        prop_assert_eq!(second.opcode(), OpCode::Binary);
        prop_assert_eq!(second.payload().as_ref(), binary.as_slice());
    }

    // =========================================================================
    // Property 8: the accept digest is deterministic and base64-shaped
    // =========================================================================
    #[test]
    fn test_accept_key_deterministic(key in "[A-Za-z0-9+/]{22}==") {
        let first = compute_accept_key(&key);
        let second = compute_accept_key(&key);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 28);
    }

    // =========================================================================
    // Property 9: hixie key extraction never panics
    // =========================================================================
    #[test]
    fn test_hixie_key_number_never_panics(key in ".{0,60}") {
        let _ = hixie_key_number(&key);
    }

    // =========================================================================
    // Property 10: the server handshaker never panics on arbitrary input
    // =========================================================================
    #[test]
    fn test_server_handshake_never_panics(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let mut handshaker = ServerHandshaker::new(Config::server());
        let mut src = BytesMut::from(&data[..]);
        let _ = handshaker.read_request(&mut src);
    }

    // =========================================================================
    // Property 11: well-formed upgrade requests parse for any path and host
    // =========================================================================
    #[test]
    fn test_handshake_valid_variations(
        path in "/[a-z]{1,20}",
        host in "[a-z]{3,10}\\.[a-z]{2,4}"
    ) {
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );

        let mut handshaker = ServerHandshaker::new(Config::server());
        let mut src = BytesMut::from(request.as_bytes());
        let parsed = handshaker.read_request(&mut src);
        prop_assert!(matches!(parsed, Ok(Some(_))), "valid request should parse: {parsed:?}");
    }
}

mod targeted_tests {
    use super::*;

    /// Length encodings switch at 126 and 65536 bytes.
    #[test]
    fn test_length_encoding_boundaries() {
        for len in [0usize, 125, 126, 127, 65535, 65536] {
            let payload = vec![0xAB; len];
            let frame = Frame::new(OpCode::Binary, Bytes::from(payload), true);
            let mut encoder = FrameEncoder::new(&Config::server());
            let mut decoder = FrameDecoder::new(
                &Config::client().with_max_frame_payload_len(1 << 20),
            );

            let mut wire = encode_all(&mut encoder, &[frame]);
            let decoded = decode_all(&mut decoder, &mut wire);
            assert_eq!(decoded[0].len(), len, "payload length {len} mangled");
        }
    }

    /// Control frames are capped at 125 payload bytes on the way out.
    #[test]
    fn test_oversized_ping_rejected_by_encoder() {
        let mut encoder = FrameEncoder::new(&Config::client());
        let frame = Frame::ping(Bytes::from(vec![0u8; 126]));
        assert!(encoder.encode(&frame).is_err());
    }

    /// A split encode carries the same bytes as a single-buffer encode.
    #[test]
    fn test_split_encode_matches_single() {
        let payload = Bytes::from(vec![0x42u8; 128 * 1024]);
        let frame = Frame::new(OpCode::Binary, payload, true);
        let mut encoder = FrameEncoder::new(&Config::server());

        let mut wire = BytesMut::new();
        wire.extend_from_slice(&encoder.encode(&frame).unwrap().into_bytes());

        let mut decoder =
            FrameDecoder::new(&Config::client().with_max_frame_payload_len(1 << 20));
        let decoded = decode_all(&mut decoder, &mut wire);
        assert_eq!(decoded[0].len(), 128 * 1024);
    }

    /// The version dispatcher hands oversized pings the same treatment.
    #[test]
    fn test_dispatch_encoder_matches_direct() {
        let mut dispatch = Encoder::for_version(wsproto::WebSocketVersion::V13, &Config::client());
        let frame = Frame::ping(Bytes::from(vec![0u8; 126]));
        assert!(dispatch.encode(&frame).is_err());
    }
}
