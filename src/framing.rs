//! Pure byte-level framing over a circular buffer: `spec.md` §4.1.
//!
//! Every function here is a free function over a `&[u8]`/`&mut [u8]` slice
//! plus explicit offsets, so it can be exercised directly by the property
//! tests without touching shared memory or synchronization at all.

const LEN_PREFIX_BYTES: usize = 4;

/// Total framed size of a record with payload length `len`.
pub(crate) const fn framed_size(len: usize) -> usize {
    LEN_PREFIX_BYTES + len
}

fn wrapping_write(ring: &mut [u8], at: usize, bytes: &[u8]) -> usize {
    let capacity = ring.len();
    let first_len = (capacity - at).min(bytes.len());
    ring[at..at + first_len].copy_from_slice(&bytes[..first_len]);
    if first_len < bytes.len() {
        let rest = &bytes[first_len..];
        ring[..rest.len()].copy_from_slice(rest);
    }
    (at + bytes.len()) % capacity
}

fn wrapping_read(ring: &[u8], at: usize, out: &mut [u8]) -> usize {
    let capacity = ring.len();
    let first_len = (capacity - at).min(out.len());
    out[..first_len].copy_from_slice(&ring[at..at + first_len]);
    if first_len < out.len() {
        let rest_len = out.len() - first_len;
        out[first_len..].copy_from_slice(&ring[..rest_len]);
    }
    (at + out.len()) % capacity
}

/// Writes `records` into `ring` starting at `tail`, each as a 4-byte
/// little-endian length prefix followed by its payload, wrapping at
/// capacity as needed.
///
/// The caller must already have verified `used + Σ framed_size(r) ≤
/// ring.len()`; this function does no bounds checking of its own beyond what
/// slice indexing provides.
///
/// Returns the new tail offset and the total number of bytes written.
pub(crate) fn write_records(ring: &mut [u8], tail: usize, records: &[&[u8]]) -> (usize, usize) {
    let mut at = tail;
    let mut written = 0;
    for record in records {
        let len_prefix = (record.len() as u32).to_le_bytes();
        at = wrapping_write(ring, at, &len_prefix);
        at = wrapping_write(ring, at, record);
        written += framed_size(record.len());
    }
    (at, written)
}

/// Parses records from `ring` starting at `head`, stopping at the first of:
/// `max_count` records consumed, the next record's payload would exceed the
/// remaining room in `scratch`, or `used` bytes have been exhausted.
///
/// Each payload is copied into `scratch` and returned as a `(start, len)`
/// range into it, so the caller can hand out sub-slices without further
/// copying. Returns the list of ranges and the total number of ring bytes
/// consumed (which the caller subtracts from `used`).
///
/// A record's length prefix is only consumed once its entire payload has
/// also been confirmed to fit; `read_records` never advances past a record
/// it could not fully stage, so a caller seeing fewer than `max_count`
/// ranges back can always grow its scratch and retry from the same `head`.
pub(crate) fn read_records(
    ring: &[u8],
    head: usize,
    used: usize,
    scratch: &mut [u8],
    max_count: usize,
    max_bytes: usize,
) -> (Vec<(usize, usize)>, usize) {
    let capacity = ring.len();
    let scratch_cap = scratch.len().min(max_bytes);
    let mut at = head;
    let mut remaining = used;
    let mut consumed = 0;
    let mut scratch_used = 0;
    let mut out = Vec::new();

    while out.len() < max_count && remaining >= LEN_PREFIX_BYTES {
        let mut len_buf = [0u8; LEN_PREFIX_BYTES];
        let after_len = wrapping_read(ring, at, &mut len_buf);
        let len = u32::from_le_bytes(len_buf) as usize;
        let total = framed_size(len);
        if total > remaining {
            // A well-formed ring never has a partial record resident, but
            // guard against reading past `used` defensively.
            break;
        }
        if scratch_used + len > scratch_cap {
            break;
        }
        let (payload_start, new_at) = if len == 0 {
            (scratch_used, after_len)
        } else {
            let dest = &mut scratch[scratch_used..scratch_used + len];
            (scratch_used, wrapping_read(ring, after_len, dest))
        };
        out.push((payload_start, len));
        scratch_used += len;
        consumed += total;
        remaining -= total;
        at = new_at;
    }

    debug_assert!(consumed <= used);
    debug_assert_eq!((head + consumed) % capacity.max(1), at % capacity.max(1));
    (out, consumed)
}
