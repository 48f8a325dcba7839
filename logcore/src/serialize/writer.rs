//! A small append-only byte writer, in the same idiom as the bytecode
//! emitter in the retrieval pack's `raya-bytecode` crate: one `emit_*`
//! method per primitive width, all built on top of a single
//! `emit_bytes`. Byte order is the caller's choice per call (`_be`/`_ne`
//! suffixed pairs) since this format mixes a strictly big-endian envelope
//! with a host-order-tagged NVTable block.

pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn emit_u16_be(&mut self, v: u16) {
        self.emit_bytes(&v.to_be_bytes());
    }

    pub fn emit_u32_be(&mut self, v: u32) {
        self.emit_bytes(&v.to_be_bytes());
    }

    pub fn emit_u64_be(&mut self, v: u64) {
        self.emit_bytes(&v.to_be_bytes());
    }

    pub fn emit_i32_be(&mut self, v: i32) {
        self.emit_bytes(&v.to_be_bytes());
    }

    pub fn emit_i64_be(&mut self, v: i64) {
        self.emit_bytes(&v.to_be_bytes());
    }

    pub fn emit_u16_ne(&mut self, v: u16) {
        self.emit_bytes(&v.to_ne_bytes());
    }

    pub fn emit_u32_ne(&mut self, v: u32) {
        self.emit_bytes(&v.to_ne_bytes());
    }

    /// Length-prefixed (u16 BE) UTF-8 string, used for the socket-address
    /// Unix path and nothing else on the wire (NVTable names/values carry
    /// their own NUL-terminated layout, handled separately).
    pub fn emit_string_u16(&mut self, s: &str) {
        self.emit_u16_be(s.len() as u16);
        self.emit_bytes(s.as_bytes());
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}
