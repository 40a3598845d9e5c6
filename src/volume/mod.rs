//! Label volumes and the decoders that produce them.
//!
//! A [`Volume`] is a dense `[z, y, x]` array of integer labels. Volumes are
//! produced by a [`VolumeSource`]; [`FileVolumeSource`] picks a decoder from
//! the file extension and retries with a lenient decoder when the strict one
//! refuses the file's orientation metadata.
//!
//! Supported formats:
//!
//! | Extension | Decoder |
//! |-----------|---------|
//! | `.nii`, `.nii.gz` | [`nii::NiftiDecoder`] |
//! | `.mha`, `.mhd` | [`metaimage::MetaImageDecoder`] |
//! | `.nrrd`, `.nhdr` | [`nrrd::NrrdDecoder`] |
//! | `.gipl`, `.gipl.gz` | [`gipl::GiplDecoder`] |

pub mod gipl;
pub mod metaimage;
pub mod nii;
pub mod nrrd;
pub mod orientation;
mod raw;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::{Array3, ArrayD, Axis, Ix3};
use tracing::warn;

use crate::error::{Error, Result};
use orientation::{Direction, DirectionPolicy};

/// Integer width used to store voxel labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageWidth {
    /// 8-bit labels, enough for fewer than 255 classes.
    #[default]
    Narrow,
    /// 16-bit labels.
    Wide,
}

impl StorageWidth {
    /// Largest storable label value.
    #[must_use]
    pub fn max_value(self) -> u16 {
        match self {
            Self::Narrow => u16::from(u8::MAX),
            Self::Wide => u16::MAX,
        }
    }

    /// Name as accepted by [`FromStr`].
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Narrow => "uint8",
            Self::Wide => "uint16",
        }
    }

    /// Narrowest width that can hold `max_label`.
    #[must_use]
    pub fn for_max_label(max_label: i64) -> Self {
        if max_label <= i64::from(u8::MAX) { Self::Narrow } else { Self::Wide }
    }
}

impl fmt::Display for StorageWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StorageWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint8" => Ok(Self::Narrow),
            "uint16" => Ok(Self::Wide),
            other => Err(Error::InputValidation(format!(
                "dtype must be either uint8 or uint16, is {}",
                other
            ))),
        }
    }
}

/// Options passed to every [`VolumeSource::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Reorient voxel axes to the canonical LPS convention.
    pub reorient: bool,
    /// Integer width of the returned labels.
    pub width: StorageWidth,
}

/// A dense 3D label volume in `[z, y, x]` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    labels: Array3<u16>,
    width: StorageWidth,
}

impl Volume {
    /// Wrap an existing label array.
    ///
    /// Fails if a value exceeds what `width` can store.
    pub fn new(labels: Array3<u16>, width: StorageWidth) -> Result<Self> {
        let max = width.max_value();
        if let Some(&value) = labels.iter().find(|&&v| v > max) {
            return Err(Error::LabelOutOfRange {
                path: PathBuf::new(),
                value: f64::from(value),
                width: width.name(),
            });
        }
        Ok(Self { labels, width })
    }

    /// Convert decoded floating-point samples into a label volume.
    ///
    /// Values are rounded to the nearest integer; negative values and values
    /// wider than `width` are rejected.
    pub(crate) fn from_samples(path: &Path, samples: Array3<f64>, width: StorageWidth) -> Result<Self> {
        let max = f64::from(width.max_value());
        if let Some(&bad) = samples.iter().find(|&&v| !(v.round() >= 0.0 && v.round() <= max)) {
            return Err(Error::LabelOutOfRange {
                path: path.to_path_buf(),
                value: bad,
                width: width.name(),
            });
        }
        Ok(Self {
            labels: samples.mapv(|v| v.round() as u16),
            width,
        })
    }

    /// Shape as `[z, y, x]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        let dim = self.labels.dim();
        [dim.0, dim.1, dim.2]
    }

    /// Total number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the volume has no voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Storage width the volume was loaded with.
    #[must_use]
    pub fn width(&self) -> StorageWidth {
        self.width
    }

    /// Borrow the label array.
    #[must_use]
    pub fn labels(&self) -> &Array3<u16> {
        &self.labels
    }
}

/// Anything that can turn a path into a [`Volume`].
///
/// Sources are shared across worker threads.
pub trait VolumeSource: Sync {
    /// Load the volume stored at `path`.
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume>;
}

impl<F> VolumeSource for F
where
    F: Fn(&Path, &LoadOptions) -> Result<Volume> + Sync,
{
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        self(path, options)
    }
}

/// Try `primary`, and on a recoverable error try `secondary`.
///
/// If both fail, the returned [`Error::VolumeRead`] carries both causes.
#[derive(Debug, Clone)]
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> Fallback<P, S> {
    /// Chain two sources.
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: VolumeSource, S: VolumeSource> VolumeSource for Fallback<P, S> {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        match self.primary.load(path, options) {
            Ok(volume) => Ok(volume),
            Err(primary) if primary.is_recoverable() => {
                warn!(path = %path.display(), error = %primary, "primary decoder failed, trying fallback");
                self.secondary.load(path, options).map_err(|secondary| Error::VolumeRead {
                    path: path.to_path_buf(),
                    primary: Box::new(primary),
                    secondary: Box::new(secondary),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Recognised volume file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// NIfTI-1, optionally gzip-compressed.
    Nifti,
    /// MetaImage with inline (`.mha`) or detached (`.mhd`) data.
    MetaImage,
    /// NRRD with attached (`.nrrd`) or detached (`.nhdr`) data.
    Nrrd,
    /// GIPL, optionally gzip-compressed.
    Gipl,
}

impl VolumeFormat {
    /// Detect the format from a file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(Self::Nifti)
        } else if name.ends_with(".mha") || name.ends_with(".mhd") {
            Ok(Self::MetaImage)
        } else if name.ends_with(".nrrd") || name.ends_with(".nhdr") {
            Ok(Self::Nrrd)
        } else if name.ends_with(".gipl") || name.ends_with(".gipl.gz") {
            Ok(Self::Gipl)
        } else {
            Err(Error::UnsupportedFormat(path.display().to_string()))
        }
    }
}

/// Default on-disk source: strict decoding with a lenient fallback.
#[derive(Debug, Clone, Default)]
pub struct FileVolumeSource;

impl VolumeSource for FileVolumeSource {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Volume> {
        match VolumeFormat::from_path(path)? {
            VolumeFormat::Nifti => Fallback::new(
                nii::NiftiDecoder::new(DirectionPolicy::Strict),
                nii::NiftiDecoder::new(DirectionPolicy::Nearest),
            )
            .load(path, options),
            VolumeFormat::MetaImage => Fallback::new(
                metaimage::MetaImageDecoder::new(DirectionPolicy::Strict),
                metaimage::MetaImageDecoder::new(DirectionPolicy::Nearest),
            )
            .load(path, options),
            VolumeFormat::Nrrd => Fallback::new(
                nrrd::NrrdDecoder::new(DirectionPolicy::Strict),
                nrrd::NrrdDecoder::new(DirectionPolicy::Nearest),
            )
            .load(path, options),
            VolumeFormat::Gipl => Fallback::new(
                gipl::GiplDecoder::new(DirectionPolicy::Strict),
                gipl::GiplDecoder::new(DirectionPolicy::Nearest),
            )
            .load(path, options),
        }
    }
}

/// Finish decoding: reorient if requested and convert to labels.
///
/// `xyz` is indexed `[x, y, z]` as stored on disk.
pub(crate) fn finish_decode(
    path: &Path,
    xyz: ArrayD<f64>,
    direction: &Direction,
    policy: DirectionPolicy,
    options: &LoadOptions,
) -> Result<Volume> {
    let mut xyz = xyz;
    // Trailing singleton axes, e.g. a 4D file with a single time point.
    while xyz.ndim() > 3 && xyz.shape()[xyz.ndim() - 1] == 1 {
        let last = xyz.ndim() - 1;
        xyz = xyz.index_axis_move(Axis(last), 0);
    }
    if xyz.ndim() != 3 {
        return Err(Error::Decode {
            path: path.to_path_buf(),
            reason: format!("expected a 3D volume, found shape {:?}", xyz.shape()),
        });
    }
    let xyz = xyz.into_dimensionality::<Ix3>().map_err(|e| Error::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let axes = direction.axis_map(policy).ok_or_else(|| Error::NonOrthonormalDirection {
        path: path.to_path_buf(),
    })?;
    let xyz = if options.reorient { orientation::reorient(xyz, &axes) } else { xyz };

    // [x, y, z] -> [z, y, x]
    let zyx = xyz.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();
    Volume::from_samples(path, zyx, options.width)
}
