//! Codec for the message envelope's source-address field.
//!
//! `family = 0` is "none"; the other three families carry their usual
//! fixed-width address bytes plus a big-endian port, except `AF_UNIX`,
//! which carries a length-prefixed path string (the envelope's only use of
//! `Writer::emit_string_u16` / `Reader::read_string_u16`).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use crate::errors::SerializeError;
use crate::message::SourceAddr;

use super::reader::Reader;
use super::writer::Writer;

const FAMILY_NONE: u16 = 0;
const FAMILY_UNIX: u16 = 1;
const FAMILY_INET: u16 = 2;
const FAMILY_INET6: u16 = 10;

pub fn write(w: &mut Writer, addr: &SourceAddr) {
    match addr {
        SourceAddr::None => w.emit_u16_be(FAMILY_NONE),
        SourceAddr::Inet(a) => {
            w.emit_u16_be(FAMILY_INET);
            w.emit_bytes(&a.ip().octets());
            w.emit_u16_be(a.port());
        }
        SourceAddr::Inet6(a) => {
            w.emit_u16_be(FAMILY_INET6);
            w.emit_bytes(&a.ip().octets());
            w.emit_u16_be(a.port());
        }
        SourceAddr::Unix(path) => {
            w.emit_u16_be(FAMILY_UNIX);
            w.emit_string_u16(path);
        }
    }
}

pub fn read(r: &mut Reader) -> Result<SourceAddr, SerializeError> {
    let family = r.read_u16_be()?;
    match family {
        FAMILY_NONE => Ok(SourceAddr::None),
        FAMILY_INET => {
            let octets: [u8; 4] = r.take(4)?.try_into().unwrap();
            let port = r.read_u16_be()?;
            Ok(SourceAddr::Inet(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
        }
        FAMILY_INET6 => {
            let octets: [u8; 16] = r.take(16)?.try_into().unwrap();
            let port = r.read_u16_be()?;
            Ok(SourceAddr::Inet6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0)))
        }
        FAMILY_UNIX => Ok(SourceAddr::Unix(r.read_string_u16()?)),
        other => Err(SerializeError::UnknownFamily(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(addr: SourceAddr) -> SourceAddr {
        let mut w = Writer::new();
        write(&mut w, &addr);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        read(&mut r).unwrap()
    }

    #[test]
    fn none_roundtrips() {
        assert_eq!(roundtrip(SourceAddr::None), SourceAddr::None);
    }

    #[test]
    fn inet_roundtrips() {
        let addr = SourceAddr::Inet(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5514));
        assert_eq!(roundtrip(addr.clone()), addr);
    }

    #[test]
    fn inet6_roundtrips() {
        let addr = SourceAddr::Inet6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 514, 0, 0));
        assert_eq!(roundtrip(addr.clone()), addr);
    }

    #[test]
    fn unix_roundtrips() {
        let addr = SourceAddr::Unix("/dev/log".to_string());
        assert_eq!(roundtrip(addr.clone()), addr);
    }

    #[test]
    fn unknown_family_is_an_error() {
        let mut w = Writer::new();
        w.emit_u16_be(9999);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(matches!(read(&mut r), Err(SerializeError::UnknownFamily(9999))));
    }
}
