use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::models::Color;

const MAGIC: &[u8] = b"Ada";

/// Adalight framing: `Ada`, LED count minus one (big endian), checksum, then
/// one RGB triple per LED
#[derive(Debug, Default, Clone, Copy)]
pub struct AdalightEncoder;

impl Encoder<&[Color]> for AdalightEncoder {
    type Error = io::Error;

    fn encode(&mut self, leds: &[Color], dst: &mut BytesMut) -> Result<(), Self::Error> {
        let count = leds
            .len()
            .checked_sub(1)
            .filter(|count| *count <= usize::from(u16::MAX))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot frame {} LEDs", leds.len()),
                )
            })?;

        let hi = (count >> 8) as u8;
        let lo = (count & 0xff) as u8;

        dst.reserve(MAGIC.len() + 3 + leds.len() * 3);
        dst.put_slice(MAGIC);
        dst.put_u8(hi);
        dst.put_u8(lo);
        dst.put_u8(hi ^ lo ^ 0x55);

        for led in leds {
            dst.put_u8(led.red);
            dst.put_u8(led.green);
            dst.put_u8(led.blue);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_payload() {
        let mut buf = BytesMut::new();
        AdalightEncoder
            .encode(&[Color::new(1, 2, 3), Color::new(4, 5, 6)][..], &mut buf)
            .unwrap();

        assert_eq!(
            &buf[..],
            &[b'A', b'd', b'a', 0, 1, 0x54, 1, 2, 3, 4, 5, 6][..]
        );
    }

    #[test]
    fn large_strip_header() {
        let mut buf = BytesMut::new();
        AdalightEncoder
            .encode(&vec![Color::default(); 300][..], &mut buf)
            .unwrap();

        // 299 = 0x012B
        assert_eq!(&buf[3..6], &[0x01, 0x2B, 0x01 ^ 0x2B ^ 0x55]);
        assert_eq!(buf.len(), 6 + 900);
    }

    #[test]
    fn empty_strip_is_rejected() {
        let mut buf = BytesMut::new();
        let leds: &[Color] = &[];
        assert!(AdalightEncoder.encode(leds, &mut buf).is_err());
    }
}
