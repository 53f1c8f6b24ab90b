//! TLS record fragmentation.
//!
//! Splits the first bytes of a ClientHello into several short TLS
//! application-data-shaped records so that middleboxes matching SNI via a
//! single contiguous byte window miss the signature, while the origin's TLS
//! stack reassembles the stream transparently.

use rand::RngCore;

/// TLS record header: content type 0x16 (handshake), legacy version 0x0304.
const RECORD_PREFIX: [u8; 3] = [0x16, 0x03, 0x04];

/// Splits `payload` into one or more framed TLS records.
///
/// If `payload` contains a `0x00` byte, the first record's payload ends at
/// and includes that byte — this lands the split near the SNI extension's
/// host-name terminator, so the SNI value itself straddles a record
/// boundary. The remaining bytes are then emitted as records of
/// uniformly-random length in `[1, remaining]`.
///
/// An empty `payload` produces no records.
pub fn fragment(payload: &[u8], rng: &mut dyn RngCore) -> Vec<u8> {
    if payload.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(payload.len() + 16 * payload.len().max(1) / 8);
    let mut rest = payload;

    if let Some(nul_at) = rest.iter().position(|&b| b == 0x00) {
        let (first, remainder) = rest.split_at(nul_at + 1);
        write_record(&mut out, first);
        rest = remainder;
    }

    while !rest.is_empty() {
        let max_len = rest.len() as u32;
        let take = if max_len == 1 { 1 } else { 1 + (rng.next_u32() % max_len) };
        let take = take as usize;
        let (chunk, remainder) = rest.split_at(take);
        write_record(&mut out, chunk);
        rest = remainder;
    }

    out
}

fn write_record(out: &mut Vec<u8>, chunk: &[u8]) {
    out.extend_from_slice(&RECORD_PREFIX);
    out.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
    out.extend_from_slice(chunk);
}

/// Parses the records `fragment` produces back into a list of
/// `(length_field, payload)` pairs. Exposed for tests only: production code
/// never needs to undo its own fragmentation.
#[cfg(test)]
fn parse_records(buf: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut records = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        assert!(rest.len() >= 5, "truncated record header");
        assert_eq!(&rest[0..3], &RECORD_PREFIX);
        let len = u16::from_be_bytes([rest[3], rest[4]]);
        let payload = rest[5..5 + len as usize].to_vec();
        records.push((len, payload));
        rest = &rest[5 + len as usize..];
    }
    records
}
