//! Raw-byte to decoded-text conversion (the "Read & decode" behavior of the
//! buffered tail source), grounded on `encoding_rs`'s streaming decoder —
//! the crate the pack's `vectordotdev-vector` manifest reaches for whenever
//! it needs iconv-style transcoding instead of hand-rolling one.
//!
//! `encoding_rs` reports incomplete trailing sequences and malformed bytes
//! through `CoderResult`/replacement rather than POSIX `iconv`'s
//! `EINVAL`/`E2BIG`/`EILSEQ`, so this module maps its results onto those
//! three outcomes itself.

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::errors::TailError;
use crate::source::state::LEFTOVER_CAPACITY;

pub struct Converter {
    decoder: Option<Decoder>,
}

/// Outcome of one `convert` call.
pub enum ConvertOutcome {
    /// Fully decoded; `leftover` (possibly empty) is an incomplete trailing
    /// sequence to prepend to the next read.
    Done { text: String, leftover: Vec<u8> },
    /// The decoded buffer filled up before the whole input could be
    /// consumed; caller should grow its buffer (up to the configured max)
    /// and retry with the same input.
    BufferFull,
}

impl Converter {
    /// `encoding` of `None` means bytes pass through as UTF-8 (validated,
    /// not transcoded); lossless pass-through for genuinely binary sources
    /// isn't a supported mode here, matching the distilled contract's
    /// "encoding converter" framing.
    pub fn new(encoding: Option<&str>) -> Result<Self, TailError> {
        let decoder = match encoding {
            None => None,
            Some(label) => {
                let enc = Encoding::for_label(label.as_bytes()).ok_or_else(|| TailError::Io {
                    path: Default::default(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("unknown encoding `{label}`")),
                })?;
                Some(enc.new_decoder())
            }
        };
        Ok(Converter { decoder })
    }

    /// Converts `raw` (already prefixed with any previous leftover) into
    /// `out`, a reusable decoded-text buffer capped at `max_len` bytes.
    /// `skipped` is incremented once per byte skipped due to a malformed
    /// sequence (`EILSEQ`), so callers can emit one notice per call rather
    /// than one per byte.
    pub fn convert(&mut self, raw: &[u8], out: &mut String, max_len: usize, skipped: &mut usize) -> Result<ConvertOutcome, TailError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return self.convert_utf8(raw, out, max_len, skipped);
        };

        out.clear();
        out.reserve(max_len.saturating_sub(out.capacity()));
        let mut pos = 0usize;
        loop {
            let (result, consumed) = decoder.decode_to_string_without_replacement(&raw[pos..], out, true);
            pos += consumed;
            match result {
                DecoderResult::InputEmpty => {
                    return Ok(ConvertOutcome::Done { text: std::mem::take(out), leftover: Vec::new() });
                }
                DecoderResult::OutputFull => {
                    return Ok(ConvertOutcome::BufferFull);
                }
                DecoderResult::Malformed(_, _) => {
                    // skip one byte past the malformed sequence and resume;
                    // the caller's notice-and-continue policy covers this.
                    *skipped += 1;
                    if pos >= raw.len() {
                        return Ok(ConvertOutcome::Done { text: std::mem::take(out), leftover: Vec::new() });
                    }
                    pos += 1;
                }
            }
        }
    }

    /// UTF-8 validation with the same EILSEQ/EINVAL split the
    /// `encoding_rs`-backed branch above makes: a genuinely malformed
    /// sequence is skipped one byte at a time and counted in `skipped`,
    /// while an incomplete trailing sequence is held as `leftover` for the
    /// next read to complete.
    fn convert_utf8(&mut self, raw: &[u8], out: &mut String, max_len: usize, skipped: &mut usize) -> Result<ConvertOutcome, TailError> {
        out.clear();
        out.reserve(max_len.saturating_sub(out.capacity()));
        let mut pos = 0usize;
        loop {
            match std::str::from_utf8(&raw[pos..]) {
                Ok(s) => {
                    if out.len() + s.len() > max_len {
                        return Ok(ConvertOutcome::BufferFull);
                    }
                    out.push_str(s);
                    return Ok(ConvertOutcome::Done { text: std::mem::take(out), leftover: Vec::new() });
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    if out.len() + valid_up_to > max_len {
                        return Ok(ConvertOutcome::BufferFull);
                    }
                    out.push_str(std::str::from_utf8(&raw[pos..pos + valid_up_to]).unwrap());

                    match e.error_len() {
                        Some(bad_len) => {
                            // genuinely malformed: skip past it and resume.
                            *skipped += bad_len;
                            pos += valid_up_to + bad_len;
                            if pos >= raw.len() {
                                return Ok(ConvertOutcome::Done { text: std::mem::take(out), leftover: Vec::new() });
                            }
                        }
                        None => {
                            // incomplete trailing sequence: hold for the next read.
                            let leftover = &raw[pos + valid_up_to..];
                            if leftover.len() > LEFTOVER_CAPACITY {
                                return Err(TailError::LeftoverOverflow(leftover.len(), LEFTOVER_CAPACITY));
                            }
                            return Ok(ConvertOutcome::Done { text: std::mem::take(out), leftover: leftover.to_vec() });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_pass_through_round_trips() {
        let mut conv = Converter::new(None).unwrap();
        let mut out = String::new();
        let mut skipped = 0;
        match conv.convert(b"hello world\n", &mut out, 4096, &mut skipped).unwrap() {
            ConvertOutcome::Done { text, leftover } => {
                assert_eq!(text, "hello world\n");
                assert!(leftover.is_empty());
            }
            ConvertOutcome::BufferFull => panic!("unexpected buffer full"),
        }
    }

    #[test]
    fn utf8_incomplete_multibyte_sequence_is_held_as_leftover() {
        let mut conv = Converter::new(None).unwrap();
        let mut out = String::new();
        let mut skipped = 0;
        // "e2 82" is the first two bytes of the 3-byte euro sign; incomplete.
        let raw = [b'h', b'i', 0xE2, 0x82];
        match conv.convert(&raw, &mut out, 4096, &mut skipped).unwrap() {
            ConvertOutcome::Done { text, leftover } => {
                assert_eq!(text, "hi");
                assert_eq!(leftover, vec![0xE2, 0x82]);
            }
            ConvertOutcome::BufferFull => panic!("unexpected buffer full"),
        }
    }

    #[test]
    fn latin1_decodes_via_encoding_rs_decoder() {
        let mut conv = Converter::new(Some("windows-1252")).unwrap();
        let mut out = String::new();
        let mut skipped = 0;
        // 0xE9 in windows-1252 is "é".
        let raw = [b'c', b'a', 0xE9];
        match conv.convert(&raw, &mut out, 4096, &mut skipped).unwrap() {
            ConvertOutcome::Done { text, .. } => assert_eq!(text, "caé"),
            ConvertOutcome::BufferFull => panic!("unexpected buffer full"),
        }
    }

    #[test]
    fn unknown_encoding_label_is_rejected_at_construction() {
        assert!(Converter::new(Some("not-a-real-encoding")).is_err());
    }

    #[test]
    fn utf8_malformed_byte_is_skipped_and_counted_rather_than_stuck_as_leftover() {
        let mut conv = Converter::new(None).unwrap();
        let mut out = String::new();
        let mut skipped = 0;
        // 0xFF is never a valid UTF-8 lead byte.
        let raw = [b'h', b'i', 0xFF, b'!'];
        match conv.convert(&raw, &mut out, 4096, &mut skipped).unwrap() {
            ConvertOutcome::Done { text, leftover } => {
                assert_eq!(text, "hi!");
                assert!(leftover.is_empty());
            }
            ConvertOutcome::BufferFull => panic!("unexpected buffer full"),
        }
        assert_eq!(skipped, 1);
    }
}
