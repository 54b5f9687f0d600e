// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn set(names: &[&str]) -> StrategySet {
    names.iter().copied().collect()
}

/// Feed `chunks` one by one into a shared buffer, collecting every payload.
fn decode_chunks(chunks: &[&[u8]]) -> anyhow::Result<Vec<Bytes>> {
    let mut decoder = FrameDecoder;
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(payload) = decoder.decode(&mut buf)? {
            out.push(payload);
        }
    }
    Ok(out)
}

#[test]
fn encode_writes_length_header_and_json() -> anyhow::Result<()> {
    let frame = encode(&set(&["local", "facebook"]))?;
    let json = br#"["local","facebook"]"#;
    assert_eq!(&frame[..HEADER_LEN], &(json.len() as u32).to_be_bytes());
    assert_eq!(&frame[HEADER_LEN..], json);
    Ok(())
}

#[test]
fn empty_set_encodes_as_empty_array() -> anyhow::Result<()> {
    let frame = encode(&StrategySet::new())?;
    assert_eq!(&frame[HEADER_LEN..], b"[]");
    Ok(())
}

#[test]
fn decode_parses_back_to_equal_set() -> anyhow::Result<()> {
    let original = set(&["local", "facebook", "git${}hub"]);
    let frame = encode(&original)?;
    let payloads = decode_chunks(&[&frame[..]])?;
    assert_eq!(payloads.len(), 1);
    assert_eq!(parse_payload(&payloads[0])?, original);
    Ok(())
}

#[test]
fn decode_holds_partial_header() -> anyhow::Result<()> {
    let frame = encode(&set(&["local"]))?;
    let payloads = decode_chunks(&[&frame[..2], &frame[2..]])?;
    assert_eq!(payloads.len(), 1);
    assert_eq!(parse_payload(&payloads[0])?, set(&["local"]));
    Ok(())
}

#[test]
fn decode_holds_partial_payload_across_chunks() -> anyhow::Result<()> {
    let frame = encode(&set(&["local", "facebook"]))?;
    let mid = HEADER_LEN + 5;
    let mut decoder = FrameDecoder;
    let mut buf = BytesMut::from(&frame[..mid]);

    assert!(decoder.decode(&mut buf)?.is_none());
    assert_eq!(buf.len(), mid, "partial frame must stay buffered");

    buf.extend_from_slice(&frame[mid..]);
    let payload = decoder.decode(&mut buf)?;
    assert!(payload.is_some());
    assert!(buf.is_empty());
    Ok(())
}

#[test]
fn decode_yields_frames_in_arrival_order() -> anyhow::Result<()> {
    let first = encode(&set(&["local"]))?;
    let second = encode(&set(&["local", "facebook"]))?;
    let third = encode(&set(&["facebook"]))?;

    // Second frame straddles the two chunks.
    let mut stream = Vec::new();
    stream.extend_from_slice(&first);
    stream.extend_from_slice(&second);
    stream.extend_from_slice(&third);
    let cut = first.len() + 3;

    let payloads = decode_chunks(&[&stream[..cut], &stream[cut..]])?;
    let sets: Vec<StrategySet> =
        payloads.iter().map(|p| parse_payload(p)).collect::<Result<_, _>>()?;
    assert_eq!(sets, vec![set(&["local"]), set(&["local", "facebook"]), set(&["facebook"])]);
    Ok(())
}

#[test]
fn decode_rejects_oversized_frame() {
    let mut buf = BytesMut::new();
    buf.put_u32((MAX_FRAME_LEN + 1) as u32);
    let result = FrameDecoder.decode(&mut buf);
    assert!(matches!(result, Err(FrameError::TooLarge { .. })));
}

#[test]
fn encode_rejects_set_over_frame_limit() {
    let huge = set(&["x".repeat(MAX_FRAME_LEN).as_str()]);
    assert!(matches!(encode(&huge), Err(ProtocolError::TooLarge { .. })));
}

#[yare::parameterized(
    not_json = { b"local" },
    object = { br#"{"name":"local"}"# },
    numbers = { b"[1,2]" },
    truncated = { br#"["local""# },
)]
fn parse_payload_rejects_malformed(payload: &[u8]) {
    assert!(matches!(parse_payload(payload), Err(ProtocolError::Malformed(_))));
}

#[test]
fn parse_payload_collapses_duplicates() -> anyhow::Result<()> {
    let parsed = parse_payload(br#"["local","local","facebook"]"#)?;
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.to_vec(), vec!["local".to_owned(), "facebook".to_owned()]);
    Ok(())
}
