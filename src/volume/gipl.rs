//! GIPL decoding (`.gipl`, `.gipl.gz`).
//!
//! A fixed 256-byte big-endian header is followed by big-endian voxel data
//! with x fastest. The format carries no direction cosines, so volumes are
//! taken as LPS-aligned.

use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::debug;

use super::orientation::{Direction, DirectionPolicy};
use super::raw::{self, Compression, ElementType, Endian};
use super::{LoadOptions, Volume, VolumeSource, finish_decode};
use crate::error::{Error, Result};

const HEADER_LEN: usize = 256;
const MAGIC_OFFSET: u64 = 252;
const MAGIC: u32 = 0xEFFF_E9B0;
const MAGIC_ALT: u32 = 0x2AE3_89B8;

fn parse_element(code: u16) -> Option<ElementType> {
    Some(match code {
        7 => ElementType::I8,
        8 => ElementType::U8,
        15 => ElementType::I16,
        16 => ElementType::U16,
        31 => ElementType::U32,
        32 => ElementType::I32,
        64 => ElementType::F32,
        65 => ElementType::F64,
        _ => return None,
    })
}

/// Decoder for GIPL volumes.
#[derive(Debug, Clone, Copy)]
pub struct GiplDecoder {
    policy: DirectionPolicy,
}

impl GiplDecoder {
    /// Create a decoder with the given direction policy.
    #[must_use]
    pub fn new(policy: DirectionPolicy) -> Self {
        Self { policy }
    }
}

impl VolumeSource for GiplDecoder {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        let fail = |reason: String| Error::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let gzipped = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.to_lowercase().ends_with(".gz"));
        let compression = if gzipped { Compression::Gzip } else { Compression::None };
        let bytes = raw::inflate(std::fs::read(path)?, compression).map_err(|e| fail(format!("gzip: {}", e)))?;
        debug!(path = %path.display(), policy = ?self.policy, "decoding GIPL volume");

        if bytes.len() < HEADER_LEN {
            return Err(fail(format!("expected a {}-byte header, found {} bytes", HEADER_LEN, bytes.len())));
        }
        let mut header = Cursor::new(&bytes[..HEADER_LEN]);
        let mut dims = [0usize; 4];
        for d in &mut dims {
            *d = usize::from(header.read_u16::<BigEndian>()?);
        }
        let code = header.read_u16::<BigEndian>()?;
        header.set_position(MAGIC_OFFSET);
        let magic = header.read_u32::<BigEndian>()?;
        if magic != MAGIC && magic != MAGIC_ALT {
            return Err(fail(format!("bad magic number {:#010x}", magic)));
        }
        let element = parse_element(code).ok_or_else(|| fail(format!("unsupported image type {}", code)))?;

        let (count, byte_len) =
            raw::payload_len(&dims, element).ok_or_else(|| fail(format!("dimensions {:?} overflow", dims)))?;
        let data = &bytes[HEADER_LEN..];
        if data.len() < byte_len {
            return Err(fail(format!(
                "expected {} bytes of voxel data, found {}",
                byte_len,
                data.len()
            )));
        }
        let samples = raw::read_samples(data, element, Endian::Big, count).map_err(|e| fail(e.to_string()))?;
        let samples = ArrayD::from_shape_vec(IxDyn(&dims).f(), samples).map_err(|e| fail(e.to_string()))?;

        finish_decode(path, samples, &Direction::identity(), self.policy, options)
    }
}
