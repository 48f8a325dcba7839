//! Persisted tail-source position, version 4 of the entry format named in
//! the persistent state format (§6): `{u8 version, u8 big_endian}` followed
//! by entry-type-specific fields. Numeric fields are written in this host's
//! native order and swapped on read when the stored tag disagrees, the same
//! scheme `logcore`'s NVTable block codec uses for its own host-order tag.

use crate::errors::TailError;
use logcore::serialize::{Reader, Writer};

pub const TAIL_STATE_VERSION: u8 = 4;

/// Bound on a partial multi-byte character held across reads. Generous for
/// the encodings `encoding_rs` supports (UTF-8 needs at most 4, UTF-16
/// surrogate halves need 2); chosen with headroom rather than cut exactly to
/// UTF-8's worst case.
pub const LEFTOVER_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    pub buffer_pos: u32,
    pub pending_buffer_pos: u32,
    pub pending_buffer_end: u32,
    pub buffer_size: u32,
    pub raw_stream_pos: u64,
    pub raw_buffer_size: u32,
    pub pending_raw_stream_pos: u64,
    pub pending_raw_buffer_size: u32,
    pub file_size: u64,
    pub file_inode: u64,
    pub raw_buffer_leftover: Vec<u8>,
}

impl Default for TailState {
    fn default() -> Self {
        TailState {
            buffer_pos: 0,
            pending_buffer_pos: 0,
            pending_buffer_end: 0,
            buffer_size: 0,
            raw_stream_pos: 0,
            raw_buffer_size: 0,
            pending_raw_stream_pos: 0,
            pending_raw_buffer_size: 0,
            file_size: 0,
            file_inode: 0,
            raw_buffer_leftover: Vec::new(),
        }
    }
}

impl TailState {
    /// Encodes the header (version, byte order) and body; the caller stores
    /// the whole blob as the payload of a state-store entry.
    pub fn encode(&self) -> Result<Vec<u8>, TailError> {
        if self.raw_buffer_leftover.len() > LEFTOVER_CAPACITY {
            return Err(TailError::LeftoverOverflow(self.raw_buffer_leftover.len(), LEFTOVER_CAPACITY));
        }
        let mut w = Writer::new();
        w.emit_u8(TAIL_STATE_VERSION);
        w.emit_u8(cfg!(target_endian = "big") as u8);
        w.emit_u32_ne(self.buffer_pos);
        w.emit_u32_ne(self.pending_buffer_pos);
        w.emit_u32_ne(self.pending_buffer_end);
        w.emit_u32_ne(self.buffer_size);
        w.emit_u64_ne_via_two_u32(self.raw_stream_pos);
        w.emit_u32_ne(self.raw_buffer_size);
        w.emit_u64_ne_via_two_u32(self.pending_raw_stream_pos);
        w.emit_u32_ne(self.pending_raw_buffer_size);
        w.emit_u64_ne_via_two_u32(self.file_size);
        w.emit_u64_ne_via_two_u32(self.file_inode);
        w.emit_u32_ne(self.raw_buffer_leftover.len() as u32);
        let mut padded = self.raw_buffer_leftover.clone();
        padded.resize(LEFTOVER_CAPACITY, 0);
        w.emit_bytes(&padded);
        Ok(w.into_bytes())
    }

    /// Decodes any on-disk version this format has ever used (1 through
    /// the current version), migrating older layouts to the current
    /// in-memory representation. The returned `bool` is `true` when the
    /// input was an older version, telling the caller to persist the
    /// result at the current version to complete the migration, per the
    /// persistent state store's upgrade contract: allocate the entry
    /// fresh at the new version, read the old one through a versioned
    /// decoder, and let the write replace the old one on success.
    pub fn decode_versioned(bytes: &[u8]) -> Result<(Self, bool), TailError> {
        let version = *bytes.first().ok_or_else(|| TailError::StateMismatch {
            path: Default::default(),
            reason: "state blob too short to contain a version byte".into(),
        })?;
        match version {
            TAIL_STATE_VERSION => Ok((Self::decode(bytes)?, false)),
            1..=3 => Ok((Self::decode_legacy(version, bytes)?, true)),
            other => Err(TailError::StateMismatch {
                path: Default::default(),
                reason: format!("unsupported tail-state version {other}"),
            }),
        }
    }

    /// Reads versions 1-3, each a strict prefix of the next: v1 wrote only
    /// the live cursor (no ack bookmark, no byte-level leftover); v2 added
    /// `raw_buffer_size` and the leftover blob; v3 added the `pending_*`
    /// ack bookmark that v4 carries unchanged. Fields a version didn't
    /// have yet default to the corresponding live-cursor value, which is
    /// exactly what a freshly-attached v4 source would have computed for
    /// them before its first ack.
    fn decode_legacy(version: u8, bytes: &[u8]) -> Result<Self, TailError> {
        let mut r = Reader::new(bytes);
        let _version = r.read_u8().map_err(err_short)?;
        let stored_big_endian = r.read_u8().map_err(err_short)? != 0;
        let swap = stored_big_endian != cfg!(target_endian = "big");

        let read_u32 = |r: &mut Reader| -> Result<u32, TailError> {
            let raw = r.read_u32_ne().map_err(err_short)?;
            Ok(if swap { raw.swap_bytes() } else { raw })
        };
        let read_u64 = |r: &mut Reader| -> Result<u64, TailError> {
            let hi = read_u32(r)?;
            let lo = read_u32(r)?;
            Ok(((hi as u64) << 32) | lo as u64)
        };

        let buffer_pos = read_u32(&mut r)?;
        let raw_stream_pos = read_u64(&mut r)?;
        let file_size = read_u64(&mut r)?;
        let file_inode = read_u64(&mut r)?;

        let (raw_buffer_size, raw_buffer_leftover) = if version >= 2 {
            let size = read_u32(&mut r)?;
            let leftover_size = read_u32(&mut r)? as usize;
            if leftover_size > LEFTOVER_CAPACITY {
                return Err(TailError::LeftoverOverflow(leftover_size, LEFTOVER_CAPACITY));
            }
            let padded = r.take(LEFTOVER_CAPACITY).map_err(err_short)?;
            (size, padded[..leftover_size].to_vec())
        } else {
            (0, Vec::new())
        };

        let (pending_buffer_pos, pending_raw_stream_pos, pending_raw_buffer_size) = if version >= 3 {
            let p = read_u32(&mut r)?;
            let prs = read_u64(&mut r)?;
            let prb = read_u32(&mut r)?;
            (p, prs, prb)
        } else {
            (buffer_pos, raw_stream_pos, raw_buffer_size)
        };

        Ok(TailState {
            buffer_pos,
            pending_buffer_pos,
            pending_buffer_end: pending_buffer_pos,
            buffer_size: 0,
            raw_stream_pos,
            raw_buffer_size,
            pending_raw_stream_pos,
            pending_raw_buffer_size,
            file_size,
            file_inode,
            raw_buffer_leftover,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TailError> {
        let mut r = Reader::new(bytes);
        let version = r.read_u8().map_err(|_| TailError::StateMismatch {
            path: Default::default(),
            reason: "state blob too short to contain a version byte".into(),
        })?;
        if version != TAIL_STATE_VERSION {
            return Err(TailError::StateMismatch {
                path: Default::default(),
                reason: format!("unsupported tail-state version {version}"),
            });
        }
        let stored_big_endian = r.read_u8().map_err(err_short)? != 0;
        let swap = stored_big_endian != cfg!(target_endian = "big");

        let read_u32 = |r: &mut Reader| -> Result<u32, TailError> {
            let raw = r.read_u32_ne().map_err(err_short)?;
            Ok(if swap { raw.swap_bytes() } else { raw })
        };
        let read_u64 = |r: &mut Reader| -> Result<u64, TailError> {
            let hi = read_u32(r)?;
            let lo = read_u32(r)?;
            let v = ((hi as u64) << 32) | lo as u64;
            Ok(v)
        };

        let buffer_pos = read_u32(&mut r)?;
        let pending_buffer_pos = read_u32(&mut r)?;
        let pending_buffer_end = read_u32(&mut r)?;
        let buffer_size = read_u32(&mut r)?;
        let raw_stream_pos = read_u64(&mut r)?;
        let raw_buffer_size = read_u32(&mut r)?;
        let pending_raw_stream_pos = read_u64(&mut r)?;
        let pending_raw_buffer_size = read_u32(&mut r)?;
        let file_size = read_u64(&mut r)?;
        let file_inode = read_u64(&mut r)?;
        let leftover_size = read_u32(&mut r)? as usize;
        if leftover_size > LEFTOVER_CAPACITY {
            return Err(TailError::LeftoverOverflow(leftover_size, LEFTOVER_CAPACITY));
        }
        let padded = r.take(LEFTOVER_CAPACITY).map_err(err_short)?;
        let raw_buffer_leftover = padded[..leftover_size].to_vec();

        Ok(TailState {
            buffer_pos,
            pending_buffer_pos,
            pending_buffer_end,
            buffer_size,
            raw_stream_pos,
            raw_buffer_size,
            pending_raw_stream_pos,
            pending_raw_buffer_size,
            file_size,
            file_inode,
            raw_buffer_leftover,
        })
    }
}

fn err_short(_: logcore::SerializeError) -> TailError {
    TailError::StateMismatch { path: Default::default(), reason: "state blob truncated".into() }
}

/// A 64-bit value split into two native-order halves so it reads/writes
/// symmetrically with the rest of this blob's per-u32 byte-swap scheme.
trait WriteU64Halves {
    fn emit_u64_ne_via_two_u32(&mut self, v: u64);
}

impl WriteU64Halves for Writer {
    fn emit_u64_ne_via_two_u32(&mut self, v: u64) {
        self.emit_u32_ne((v >> 32) as u32);
        self.emit_u32_ne(v as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TailState {
        TailState {
            buffer_pos: 10,
            pending_buffer_pos: 20,
            pending_buffer_end: 30,
            buffer_size: 4096,
            raw_stream_pos: 123_456_789,
            raw_buffer_size: 512,
            pending_raw_stream_pos: 123_457_000,
            pending_raw_buffer_size: 256,
            file_size: 999_999,
            file_inode: 42,
            raw_buffer_leftover: vec![0xE2, 0x82],
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let state = sample();
        let bytes = state.encode().unwrap();
        let decoded = TailState::decode(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn rejects_leftover_larger_than_capacity() {
        let mut state = sample();
        state.raw_buffer_leftover = vec![0u8; LEFTOVER_CAPACITY + 1];
        assert!(matches!(state.encode(), Err(TailError::LeftoverOverflow(_, _))));
    }

    #[test]
    fn rejects_wrong_version_byte() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = 3;
        assert!(matches!(TailState::decode(&bytes), Err(TailError::StateMismatch { .. })));
    }

    #[test]
    fn empty_leftover_round_trips() {
        let mut state = sample();
        state.raw_buffer_leftover = Vec::new();
        let bytes = state.encode().unwrap();
        let decoded = TailState::decode(&bytes).unwrap();
        assert_eq!(decoded.raw_buffer_leftover, Vec::<u8>::new());
    }

    #[test]
    fn decode_versioned_passes_current_version_through_unmigrated() {
        let state = sample();
        let bytes = state.encode().unwrap();
        let (decoded, migrated) = TailState::decode_versioned(&bytes).unwrap();
        assert_eq!(decoded, state);
        assert!(!migrated);
    }

    #[test]
    fn decode_versioned_rejects_a_version_newer_than_current() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = TAIL_STATE_VERSION + 1;
        assert!(matches!(TailState::decode_versioned(&bytes), Err(TailError::StateMismatch { .. })));
    }

    fn write_legacy_v1(buffer_pos: u32, raw_stream_pos: u64, file_size: u64, file_inode: u64) -> Vec<u8> {
        let mut w = Writer::new();
        w.emit_u8(1);
        w.emit_u8(cfg!(target_endian = "big") as u8);
        w.emit_u32_ne(buffer_pos);
        w.emit_u64_ne_via_two_u32(raw_stream_pos);
        w.emit_u64_ne_via_two_u32(file_size);
        w.emit_u64_ne_via_two_u32(file_inode);
        w.into_bytes()
    }

    #[test]
    fn decode_versioned_migrates_a_v1_entry() {
        let bytes = write_legacy_v1(10, 20, 1000, 7);
        let (decoded, migrated) = TailState::decode_versioned(&bytes).unwrap();
        assert!(migrated);
        assert_eq!(decoded.buffer_pos, 10);
        assert_eq!(decoded.raw_stream_pos, 20);
        assert_eq!(decoded.file_size, 1000);
        assert_eq!(decoded.file_inode, 7);
        assert_eq!(decoded.raw_buffer_size, 0);
        assert!(decoded.raw_buffer_leftover.is_empty());
        // v1 had no ack bookmark; it defaults to the live cursor.
        assert_eq!(decoded.pending_buffer_pos, 10);
        assert_eq!(decoded.pending_raw_stream_pos, 20);
    }

    fn write_legacy_v3(buffer_pos: u32, raw_stream_pos: u64, pending_buffer_pos: u32) -> Vec<u8> {
        let mut w = Writer::new();
        w.emit_u8(3);
        w.emit_u8(cfg!(target_endian = "big") as u8);
        w.emit_u32_ne(buffer_pos);
        w.emit_u64_ne_via_two_u32(raw_stream_pos);
        w.emit_u64_ne_via_two_u32(500); // file_size
        w.emit_u64_ne_via_two_u32(9); // file_inode
        w.emit_u32_ne(0); // raw_buffer_size
        w.emit_u32_ne(0); // leftover length
        w.emit_bytes(&[0u8; LEFTOVER_CAPACITY]);
        w.emit_u32_ne(pending_buffer_pos);
        w.emit_u64_ne_via_two_u32(raw_stream_pos); // pending_raw_stream_pos
        w.emit_u32_ne(0); // pending_raw_buffer_size
        w.into_bytes()
    }

    #[test]
    fn decode_versioned_migrates_a_v3_entry_preserving_its_ack_bookmark() {
        let bytes = write_legacy_v3(10, 20, 15);
        let (decoded, migrated) = TailState::decode_versioned(&bytes).unwrap();
        assert!(migrated);
        assert_eq!(decoded.buffer_pos, 10);
        assert_eq!(decoded.pending_buffer_pos, 15);
    }
}
