//! NIfTI-1 decoding (`.nii`, `.nii.gz`).

use std::path::Path;

use ::nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

use super::orientation::{Direction, DirectionPolicy};
use super::{LoadOptions, Volume, VolumeSource, finish_decode};
use crate::error::{Error, Result};

/// Decoder for NIfTI-1 volumes backed by the `nifti` crate.
#[derive(Debug, Clone, Copy)]
pub struct NiftiDecoder {
    policy: DirectionPolicy,
}

impl NiftiDecoder {
    /// Create a decoder with the given direction policy.
    #[must_use]
    pub fn new(policy: DirectionPolicy) -> Self {
        Self { policy }
    }
}

impl VolumeSource for NiftiDecoder {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        let decode_err = |e: ::nifti::NiftiError| Error::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let obj = ReaderOptions::new().read_file(path).map_err(decode_err)?;
        let direction = header_direction(obj.header());
        debug!(path = %path.display(), policy = ?self.policy, "decoding NIfTI volume");

        // Scaled samples, indexed [x, y, z].
        let samples = obj.into_volume().into_ndarray::<f64>().map_err(decode_err)?;
        finish_decode(path, samples, &direction, self.policy, options)
    }
}

/// Voxel-axis directions from the header, preferring the sform over the qform.
fn header_direction(header: &NiftiHeader) -> Direction {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut columns = [[0.0; 3]; 3];
        for (j, column) in columns.iter_mut().enumerate() {
            for (i, row) in rows.iter().enumerate() {
                column[i] = f64::from(row[j]);
            }
        }
        return Direction::from_ras_columns(columns);
    }

    if header.qform_code > 0 {
        return Direction::from_ras_columns(quaternion_columns(header));
    }

    Direction::from_ras_columns([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
}

/// Rotation columns encoded by the qform quaternion, including `qfac`.
fn quaternion_columns(header: &NiftiHeader) -> [[f64; 3]; 3] {
    let b = f64::from(header.quatern_b);
    let c = f64::from(header.quatern_c);
    let d = f64::from(header.quatern_d);
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

    let r = [
        [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
        [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
        [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
    ];

    [
        [r[0][0], r[1][0], r[2][0]],
        [r[0][1], r[1][1], r[2][1]],
        [qfac * r[0][2], qfac * r[1][2], qfac * r[2][2]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::StorageWidth;
    use ::nifti::writer::WriterOptions;
    use ndarray::Array3;

    fn labels_xyz() -> Array3<u8> {
        Array3::from_shape_fn((4, 3, 2), |(x, y, z)| ((x + 2 * y + z) % 4) as u8)
    }

    #[test]
    fn test_identity_quaternion() {
        let header = NiftiHeader {
            qform_code: 1,
            pixdim: [1.0; 8],
            ..NiftiHeader::default()
        };
        let cols = quaternion_columns(&header);
        assert_eq!(cols, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_qfac_flips_third_axis() {
        let mut pixdim = [1.0; 8];
        pixdim[0] = -1.0;
        let header = NiftiHeader {
            qform_code: 1,
            pixdim,
            ..NiftiHeader::default()
        };
        assert_eq!(quaternion_columns(&header)[2], [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_sform_preferred() {
        let header = NiftiHeader {
            sform_code: 1,
            qform_code: 1,
            srow_x: [0.0, 2.0, 0.0, 0.0],
            srow_y: [2.0, 0.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 2.0, 0.0],
            ..NiftiHeader::default()
        };
        let axes = header_direction(&header).axis_map(DirectionPolicy::Strict).unwrap();
        assert_eq!(axes[0].source, 1);
        assert_eq!(axes[1].source, 0);
    }

    #[test]
    fn test_decode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.nii.gz");
        let data = labels_xyz();
        WriterOptions::new(&path).write_nifti(&data).unwrap();

        let decoder = NiftiDecoder::new(DirectionPolicy::Strict);
        let volume = decoder.load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(volume.shape(), [2, 3, 4]);
        assert_eq!(volume.width(), StorageWidth::Narrow);
        for ((z, y, x), &v) in volume.labels().indexed_iter() {
            assert_eq!(v, u16::from(data[[x, y, z]]));
        }
    }

    #[test]
    fn test_reorient_matches_plain_read_for_default_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.nii");
        WriterOptions::new(&path).write_nifti(&labels_xyz()).unwrap();

        let decoder = NiftiDecoder::new(DirectionPolicy::Strict);
        let plain = decoder.load(&path, &LoadOptions::default()).unwrap();
        let reoriented = decoder
            .load(&path, &LoadOptions { reorient: true, ..LoadOptions::default() })
            .unwrap();
        // Without sform/qform the voxel axes are RAS, so x and y get flipped.
        assert_eq!(plain.shape(), reoriented.shape());
        assert_ne!(plain, reoriented);
        let [_, ny, nx] = plain.shape();
        for ((z, y, x), &v) in reoriented.labels().indexed_iter() {
            assert_eq!(v, plain.labels()[[z, ny - 1 - y, nx - 1 - x]]);
        }
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let decoder = NiftiDecoder::new(DirectionPolicy::Nearest);
        let err = decoder.load(Path::new("/nonexistent/case.nii"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(!err.is_recoverable());
    }
}
