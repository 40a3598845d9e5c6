//! Voxel payload decoding shared by the container formats.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};

/// Scalar element types stored in voxel payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl ElementType {
    pub(crate) fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Byte order of multi-byte elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

/// Payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compression {
    None,
    Zlib,
    Gzip,
}

/// Voxel count and payload size for `dims`, `None` on overflow.
pub(crate) fn payload_len(dims: &[usize], element: ElementType) -> Option<(usize, usize)> {
    let count = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
    Some((count, count.checked_mul(element.size())?))
}

/// Undo payload compression.
pub(crate) fn inflate(raw: Vec<u8>, compression: Compression) -> std::io::Result<Vec<u8>> {
    let mut inflated = Vec::new();
    match compression {
        Compression::None => return Ok(raw),
        Compression::Zlib => ZlibDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?,
        Compression::Gzip => GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?,
    };
    Ok(inflated)
}

/// Decode `count` elements from the start of `raw`.
///
/// The caller checks that `raw` holds at least `count` elements.
pub(crate) fn read_samples(raw: &[u8], element: ElementType, endian: Endian, count: usize) -> std::io::Result<Vec<f64>> {
    match endian {
        Endian::Little => read_ordered::<LittleEndian>(raw, element, count),
        Endian::Big => read_ordered::<BigEndian>(raw, element, count),
    }
}

fn read_ordered<B: ByteOrder>(raw: &[u8], element: ElementType, count: usize) -> std::io::Result<Vec<f64>> {
    let mut cursor = Cursor::new(raw);
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match element {
            ElementType::U8 => f64::from(cursor.read_u8()?),
            ElementType::I8 => f64::from(cursor.read_i8()?),
            ElementType::U16 => f64::from(cursor.read_u16::<B>()?),
            ElementType::I16 => f64::from(cursor.read_i16::<B>()?),
            ElementType::U32 => f64::from(cursor.read_u32::<B>()?),
            ElementType::I32 => f64::from(cursor.read_i32::<B>()?),
            ElementType::F32 => f64::from(cursor.read_f32::<B>()?),
            ElementType::F64 => cursor.read_f64::<B>()?,
        };
        samples.push(value);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_payload_len_overflow() {
        assert_eq!(payload_len(&[4, 3, 2], ElementType::U16), Some((24, 48)));
        assert_eq!(payload_len(&[usize::MAX, 2, 1], ElementType::U8), None);
        assert_eq!(payload_len(&[usize::MAX / 2 + 1, 1, 1], ElementType::U16), None);
    }

    #[test]
    fn test_read_both_byte_orders() {
        let raw = [0x01, 0x02, 0xff, 0xfe];
        assert_eq!(read_samples(&raw, ElementType::U16, Endian::Little, 2).unwrap(), vec![513.0, 65279.0]);
        assert_eq!(read_samples(&raw, ElementType::U16, Endian::Big, 2).unwrap(), vec![258.0, 65534.0]);
        assert_eq!(read_samples(&raw, ElementType::I16, Endian::Big, 2).unwrap(), vec![258.0, -2.0]);
        assert!(read_samples(&raw, ElementType::U32, Endian::Big, 2).is_err());
    }

    #[test]
    fn test_gzip_inflate() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&[7, 8, 9]).unwrap();
        let packed = encoder.finish().unwrap();
        assert_eq!(inflate(packed, Compression::Gzip).unwrap(), vec![7, 8, 9]);
        assert!(inflate(vec![1, 2, 3], Compression::Zlib).is_err());
    }
}
