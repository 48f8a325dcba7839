//! The `Writer`'s counterpart: a cursor over a borrowed byte slice with one
//! `read_*` method per primitive width, every read bounds-checked against
//! the remaining slice and reported as `SerializeError::Truncated` rather
//! than panicking.

use crate::errors::SerializeError;

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], SerializeError> {
        if self.remaining() < n {
            return Err(SerializeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, SerializeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, SerializeError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, SerializeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, SerializeError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i32_be(&mut self) -> Result<i32, SerializeError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64_be(&mut self) -> Result<i64, SerializeError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_u16_ne(&mut self) -> Result<u16, SerializeError> {
        Ok(u16::from_ne_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32_ne(&mut self) -> Result<u32, SerializeError> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_string_u16(&mut self) -> Result<String, SerializeError> {
        let len = self.read_u16_be()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializeError::Format("socket path is not valid UTF-8".into()))
    }
}
