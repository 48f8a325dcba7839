//! Codec for the three `LogStamp` values carried in the message envelope.

use crate::errors::SerializeError;
use crate::message::LogStamp;

use super::reader::Reader;
use super::writer::Writer;

pub fn write(w: &mut Writer, stamp: &LogStamp) {
    w.emit_i64_be(stamp.sec);
    w.emit_i32_be(stamp.usec);
    w.emit_i32_be(stamp.gmtoff);
}

pub fn read(r: &mut Reader) -> Result<LogStamp, SerializeError> {
    Ok(LogStamp {
        sec: r.read_i64_be()?,
        usec: r.read_i32_be()?,
        gmtoff: r.read_i32_be()?,
    })
}

pub fn write_three(w: &mut Writer, stamps: &[LogStamp; 3]) {
    for s in stamps {
        write(w, s);
    }
}

pub fn read_three(r: &mut Reader) -> Result<[LogStamp; 3], SerializeError> {
    Ok([read(r)?, read(r)?, read(r)?])
}
