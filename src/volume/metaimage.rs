//! MetaImage decoding (`.mha` with inline data, `.mhd` with a detached file).
//!
//! The header is a list of `Key = Value` lines terminated by
//! `ElementDataFile`. Only single-channel 3D volumes are accepted.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::debug;

use super::orientation::{Direction, DirectionPolicy};
use super::raw::{self, Compression, ElementType, Endian};
use super::{LoadOptions, Volume, VolumeSource, finish_decode};
use crate::error::{Error, Result};

fn parse_element(s: &str) -> Option<ElementType> {
    Some(match s {
        "MET_UCHAR" => ElementType::U8,
        "MET_CHAR" => ElementType::I8,
        "MET_USHORT" => ElementType::U16,
        "MET_SHORT" => ElementType::I16,
        "MET_UINT" => ElementType::U32,
        "MET_INT" => ElementType::I32,
        "MET_FLOAT" => ElementType::F32,
        "MET_DOUBLE" => ElementType::F64,
        _ => return None,
    })
}

/// Decoder for MetaImage volumes.
#[derive(Debug, Clone, Copy)]
pub struct MetaImageDecoder {
    policy: DirectionPolicy,
}

impl MetaImageDecoder {
    /// Create a decoder with the given direction policy.
    #[must_use]
    pub fn new(policy: DirectionPolicy) -> Self {
        Self { policy }
    }
}

impl VolumeSource for MetaImageDecoder {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        let fail = |reason: String| Error::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path)?;
        let (header, data_offset) = parse_header(&bytes).map_err(fail)?;
        debug!(path = %path.display(), policy = ?self.policy, "decoding MetaImage volume");

        let field = |key: &str| header.get(&key.to_lowercase()).map(String::as_str);

        let ndims: usize = field("NDims")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| fail("missing or invalid NDims".to_string()))?;
        let dims: Vec<usize> = parse_numbers(field("DimSize").unwrap_or_default())
            .ok_or_else(|| fail("invalid DimSize".to_string()))?;
        if dims.len() != ndims || ndims < 3 {
            return Err(fail(format!("expected a 3D volume, found DimSize {:?}", dims)));
        }
        if let Some(channels) = field("ElementNumberOfChannels") {
            if channels != "1" {
                return Err(fail(format!("expected a single channel, found {}", channels)));
            }
        }
        let element = field("ElementType")
            .and_then(parse_element)
            .ok_or_else(|| fail(format!("unsupported ElementType {:?}", field("ElementType"))))?;
        let endian = if field("BinaryDataByteOrderMSB")
            .or_else(|| field("ElementByteOrderMSB"))
            .is_some_and(is_true)
        {
            Endian::Big
        } else {
            Endian::Little
        };
        let compression = if field("CompressedData").is_some_and(is_true) {
            Compression::Zlib
        } else {
            Compression::None
        };

        let raw = match field("ElementDataFile") {
            Some(name) if name.eq_ignore_ascii_case("LOCAL") => bytes[data_offset..].to_vec(),
            Some(name) => {
                let detached = path.parent().unwrap_or_else(|| Path::new(".")).join(name);
                std::fs::read(detached)?
            }
            None => return Err(fail("missing ElementDataFile".to_string())),
        };
        let raw = raw::inflate(raw, compression).map_err(|e| fail(format!("zlib: {}", e)))?;

        let (count, byte_len) =
            raw::payload_len(&dims, element).ok_or_else(|| fail(format!("DimSize {:?} overflows", dims)))?;
        if raw.len() < byte_len {
            return Err(fail(format!(
                "expected {} bytes of voxel data, found {}",
                byte_len,
                raw.len()
            )));
        }
        let samples = raw::read_samples(&raw, element, endian, count).map_err(|e| fail(e.to_string()))?;

        // MetaImage stores x fastest.
        let samples = ArrayD::from_shape_vec(IxDyn(&dims).f(), samples).map_err(|e| fail(e.to_string()))?;

        let direction = match field("TransformMatrix")
            .or_else(|| field("Orientation"))
            .or_else(|| field("Rotation"))
        {
            Some(text) => {
                let m: Vec<f64> = parse_numbers(text).ok_or_else(|| fail("invalid TransformMatrix".to_string()))?;
                if m.len() != 9 {
                    return Err(fail(format!("TransformMatrix needs 9 values, found {}", m.len())));
                }
                Direction::from_columns([[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]])
            }
            None => Direction::identity(),
        };

        finish_decode(path, samples, &direction, self.policy, options)
    }
}

/// Split the header into lower-cased keys and values.
///
/// Returns the byte offset where inline voxel data starts.
fn parse_header(bytes: &[u8]) -> std::result::Result<(HashMap<String, String>, usize), String> {
    let mut header = HashMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |p| offset + p + 1);
        let line = std::str::from_utf8(&bytes[offset..end])
            .map_err(|_| "header is not valid text".to_string())?
            .trim();
        offset = end;

        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("malformed header line: {}", line))?;
        let key = key.trim().to_lowercase();
        let is_last = key == "elementdatafile";
        header.insert(key, value.trim().to_string());
        if is_last {
            return Ok((header, offset));
        }
    }

    Err("header has no ElementDataFile entry".to_string())
}

fn parse_numbers<T: std::str::FromStr>(text: &str) -> Option<Vec<T>> {
    text.split_whitespace().map(|t| t.parse().ok()).collect()
}

fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}


/// Test fixtures: write a `[z, y, x]` label array as an uncompressed `.mha`.
#[cfg(test)]
pub(crate) fn write_mha(path: &Path, zyx: &ndarray::Array3<u16>, transform: Option<[f64; 9]>) {
    use byteorder::WriteBytesExt;
    use std::io::Write;

    let (nz, ny, nx) = zyx.dim();
    let mut out = Vec::new();
    writeln!(out, "ObjectType = Image").unwrap();
    writeln!(out, "NDims = 3").unwrap();
    writeln!(out, "BinaryData = True").unwrap();
    writeln!(out, "BinaryDataByteOrderMSB = False").unwrap();
    if let Some(m) = transform {
        let text: Vec<String> = m.iter().map(|v| v.to_string()).collect();
        writeln!(out, "TransformMatrix = {}", text.join(" ")).unwrap();
    }
    writeln!(out, "DimSize = {} {} {}", nx, ny, nz).unwrap();
    writeln!(out, "ElementType = MET_USHORT").unwrap();
    writeln!(out, "ElementDataFile = LOCAL").unwrap();
    // Standard [z, y, x] layout already has x fastest.
    for &v in zyx.as_standard_layout().iter() {
        out.write_u16::<byteorder::LittleEndian>(v).unwrap();
    }
    std::fs::write(path, out).unwrap();
}
