//! NRRD decoding (`.nrrd` with attached data, `.nhdr` with a detached file).
//!
//! The header starts with an `NRRD000x` magic line followed by `field: value`
//! lines and ends at the first blank line. Raw, gzip and ascii encodings are
//! read. `space directions` give the voxel axes in the world space named by
//! `space`.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::debug;

use super::orientation::{Direction, DirectionPolicy};
use super::raw::{self, Compression, ElementType, Endian};
use super::{LoadOptions, Volume, VolumeSource, finish_decode};
use crate::error::{Error, Result};

const MAGIC: &str = "NRRD000";

fn parse_element(s: &str) -> Option<ElementType> {
    Some(match s {
        "uchar" | "unsigned char" | "uint8" | "uint8_t" => ElementType::U8,
        "signed char" | "int8" | "int8_t" => ElementType::I8,
        "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => ElementType::U16,
        "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => ElementType::I16,
        "uint" | "unsigned int" | "uint32" | "uint32_t" => ElementType::U32,
        "int" | "signed int" | "int32" | "int32_t" => ElementType::I32,
        "float" => ElementType::F32,
        "double" => ElementType::F64,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw,
    Gzip,
    Ascii,
}

impl Encoding {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "raw" => Self::Raw,
            "gzip" | "gz" => Self::Gzip,
            "ascii" | "text" | "txt" => Self::Ascii,
            _ => return None,
        })
    }
}

/// Per-axis sign flips taking vectors in a named world space to LPS.
fn space_to_lps(space: &str) -> Option<[f64; 3]> {
    Some(match space {
        "left-posterior-superior" | "lps" => [1.0, 1.0, 1.0],
        "right-anterior-superior" | "ras" => [-1.0, -1.0, 1.0],
        "left-anterior-superior" | "las" => [1.0, -1.0, 1.0],
        _ => return None,
    })
}

/// Decoder for NRRD volumes.
#[derive(Debug, Clone, Copy)]
pub struct NrrdDecoder {
    policy: DirectionPolicy,
}

impl NrrdDecoder {
    /// Create a decoder with the given direction policy.
    #[must_use]
    pub fn new(policy: DirectionPolicy) -> Self {
        Self { policy }
    }
}

impl VolumeSource for NrrdDecoder {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        let fail = |reason: String| Error::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path)?;
        let (header, data_offset) = parse_header(&bytes).map_err(fail)?;
        debug!(path = %path.display(), policy = ?self.policy, "decoding NRRD volume");

        let field = |key: &str| header.get(key).map(String::as_str);

        let dimension: usize = field("dimension")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| fail("missing or invalid dimension".to_string()))?;
        let dims: Vec<usize> = field("sizes")
            .and_then(parse_numbers)
            .ok_or_else(|| fail("missing or invalid sizes".to_string()))?;
        if dims.len() != dimension || dimension < 3 {
            return Err(fail(format!("expected a 3D volume, found sizes {:?}", dims)));
        }
        let element = field("type")
            .and_then(|t| parse_element(&t.to_lowercase()))
            .ok_or_else(|| fail(format!("unsupported type {:?}", field("type"))))?;
        let encoding = field("encoding")
            .and_then(|e| Encoding::parse(&e.to_lowercase()))
            .ok_or_else(|| fail(format!("unsupported encoding {:?}", field("encoding"))))?;
        let endian = match field("endian") {
            Some(e) if e.eq_ignore_ascii_case("little") => Endian::Little,
            Some(e) if e.eq_ignore_ascii_case("big") => Endian::Big,
            Some(e) => return Err(fail(format!("invalid endian {}", e))),
            None if element.size() == 1 || encoding == Encoding::Ascii => Endian::Little,
            None => return Err(fail("missing endian".to_string())),
        };
        let line_skip = field("lineskip")
            .map_or(Some(0), |v| v.parse::<usize>().ok())
            .ok_or_else(|| fail("invalid line skip".to_string()))?;
        let byte_skip = field("byteskip")
            .map_or(Some(0), |v| v.parse::<i64>().ok())
            .filter(|&n| n >= -1)
            .ok_or_else(|| fail("invalid byte skip".to_string()))?;
        if byte_skip == -1 && encoding != Encoding::Raw {
            return Err(fail("byte skip -1 needs raw encoding".to_string()));
        }

        let stored = match field("datafile") {
            Some(name) if name.contains('%') || name.starts_with("LIST") => {
                return Err(fail(format!("multi-file data {} is not supported", name)));
            }
            Some(name) => {
                let detached = path.parent().unwrap_or_else(|| Path::new(".")).join(name);
                std::fs::read(detached)?
            }
            None => bytes[data_offset..].to_vec(),
        };
        let stored = skip_lines(&stored, line_skip).ok_or_else(|| fail(format!("cannot skip {} lines", line_skip)))?;

        let (count, byte_len) =
            raw::payload_len(&dims, element).ok_or_else(|| fail(format!("sizes {:?} overflow", dims)))?;
        let samples = match encoding {
            Encoding::Ascii => {
                let text = std::str::from_utf8(stored).map_err(|_| fail("ascii data is not valid text".to_string()))?;
                let values = text
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .take(count)
                    .map(str::parse)
                    .collect::<std::result::Result<Vec<f64>, _>>()
                    .map_err(|e| fail(format!("ascii data: {}", e)))?;
                if values.len() < count {
                    return Err(fail(format!("expected {} values, found {}", count, values.len())));
                }
                values
            }
            Encoding::Raw | Encoding::Gzip => {
                let compression = if encoding == Encoding::Gzip { Compression::Gzip } else { Compression::None };
                let payload = raw::inflate(stored.to_vec(), compression).map_err(|e| fail(format!("gzip: {}", e)))?;
                let start = match usize::try_from(byte_skip) {
                    Ok(skip) => Some(skip),
                    Err(_) => payload.len().checked_sub(byte_len),
                };
                let data = start
                    .and_then(|s| payload.get(s..))
                    .filter(|d| d.len() >= byte_len)
                    .ok_or_else(|| {
                        fail(format!(
                            "expected {} bytes of voxel data, found {}",
                            byte_len,
                            payload.len()
                        ))
                    })?;
                raw::read_samples(data, element, endian, count).map_err(|e| fail(e.to_string()))?
            }
        };

        // NRRD lists the fastest axis first.
        let samples = ArrayD::from_shape_vec(IxDyn(&dims).f(), samples).map_err(|e| fail(e.to_string()))?;

        let direction = match field("spacedirections") {
            Some(text) => {
                let flips = match field("space") {
                    Some(space) => space_to_lps(&space.to_lowercase())
                        .ok_or_else(|| fail(format!("unsupported space {}", space)))?,
                    None => [1.0, 1.0, 1.0],
                };
                let columns = parse_vectors(text)
                    .and_then(|vectors| spatial_columns(&vectors))
                    .ok_or_else(|| fail(format!("invalid space directions {}", text)))?;
                Direction::from_columns(columns.map(|c| [c[0] * flips[0], c[1] * flips[1], c[2] * flips[2]]))
            }
            None => Direction::identity(),
        };

        finish_decode(path, samples, &direction, self.policy, options)
    }
}

/// Collect `field: value` lines into a map keyed by the lower-cased field
/// name with spaces removed (`data file` and `datafile` are the same field).
///
/// Returns the byte offset just past the blank line ending the header.
fn parse_header(bytes: &[u8]) -> std::result::Result<(HashMap<String, String>, usize), String> {
    if !bytes.starts_with(MAGIC.as_bytes()) {
        return Err("missing NRRD magic".to_string());
    }
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
        let first = offset == 0;
        offset = end;

        if first || line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            return Ok((header, offset));
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed header line: {}", line))?;
        // `key:=value` pairs are free-form metadata.
        if value.starts_with('=') {
            continue;
        }
        let key: String = key.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
        header.insert(key, value.trim().to_string());
    }

    Ok((header, bytes.len()))
}

fn parse_numbers<T: std::str::FromStr>(text: &str) -> Option<Vec<T>> {
    text.split_whitespace().map(|t| t.parse().ok()).collect()
}

/// Parse `(x,y,z) none (x,y,z)` into one entry per axis.
fn parse_vectors(text: &str) -> Option<Vec<Option<Vec<f64>>>> {
    let mut vectors = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("none") {
            vectors.push(None);
            rest = tail.trim_start();
        } else {
            let (inner, tail) = rest.strip_prefix('(')?.split_once(')')?;
            let vector = inner
                .split(',')
                .map(|t| t.trim().parse().ok())
                .collect::<Option<Vec<f64>>>()?;
            vectors.push(Some(vector));
            rest = tail.trim_start();
        }
    }
    Some(vectors)
}

/// The first three axes must be spatial 3-vectors, any further axis `none`.
fn spatial_columns(vectors: &[Option<Vec<f64>>]) -> Option<[[f64; 3]; 3]> {
    if vectors.len() < 3 || vectors[3..].iter().any(Option::is_some) {
        return None;
    }
    let column = |i: usize| match vectors[i].as_deref() {
        Some(&[a, b, c]) => Some([a, b, c]),
        _ => None,
    };
    Some([column(0)?, column(1)?, column(2)?])
}

fn skip_lines(raw: &[u8], lines: usize) -> Option<&[u8]> {
    let mut rest = raw;
    for _ in 0..lines {
        let end = rest.iter().position(|&b| b == b'\n')?;
        rest = &rest[end + 1..];
    }
    Some(rest)
}
