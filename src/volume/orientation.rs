//! Voxel-axis orientation and reorientation to LPS.
//!
//! World coordinates follow the DICOM/LPS convention: +x points Left, +y
//! Posterior, +z Superior. A [`Direction`] stores, for each voxel axis, the
//! world direction it advances along.

use ndarray::{Array3, Axis};

/// Tolerance for the orthonormality check of the strict policy.
const ORTHONORMAL_TOLERANCE: f64 = 1e-4;

/// How strictly direction cosines are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionPolicy {
    /// Require orthonormal direction cosines.
    Strict,
    /// Snap every voxel axis to its closest world axis.
    Nearest,
}

/// World axis and sign matched to one voxel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMap {
    /// Voxel axis (0 = x, 1 = y, 2 = z) feeding this world axis.
    pub source: usize,
    /// Whether the voxel axis runs against the world axis.
    pub flipped: bool,
}

/// Direction cosines of the three voxel axes in LPS world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Direction {
    columns: [[f64; 3]; 3],
}

impl Default for Direction {
    fn default() -> Self {
        Self::identity()
    }
}

impl Direction {
    /// Voxel axes aligned with LPS.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            columns: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Build from per-voxel-axis world vectors (not necessarily normalised).
    #[must_use]
    pub fn from_columns(columns: [[f64; 3]; 3]) -> Self {
        Self { columns }
    }

    /// Build from per-voxel-axis vectors expressed in RAS world space.
    #[must_use]
    pub fn from_ras_columns(columns: [[f64; 3]; 3]) -> Self {
        Self {
            columns: columns.map(|[r, a, s]| [-r, -a, s]),
        }
    }

    /// Columns normalised to unit length, `None` for degenerate ones.
    fn unit_columns(&self) -> [Option<[f64; 3]>; 3] {
        self.columns.map(|c| {
            let norm = (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt();
            if norm > f64::EPSILON && norm.is_finite() {
                Some([c[0] / norm, c[1] / norm, c[2] / norm])
            } else {
                None
            }
        })
    }

    /// Whether the normalised columns are mutually orthogonal.
    #[must_use]
    pub fn is_orthonormal(&self) -> bool {
        let [Some(a), Some(b), Some(c)] = self.unit_columns() else {
            return false;
        };
        let dot = |u: [f64; 3], v: [f64; 3]| u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
        dot(a, b).abs() < ORTHONORMAL_TOLERANCE
            && dot(a, c).abs() < ORTHONORMAL_TOLERANCE
            && dot(b, c).abs() < ORTHONORMAL_TOLERANCE
    }

    /// Match every world axis to a voxel axis.
    ///
    /// Returns `None` under [`DirectionPolicy::Strict`] when the direction
    /// cosines are not orthonormal. The result is indexed by world axis.
    #[must_use]
    pub fn axis_map(&self, policy: DirectionPolicy) -> Option<[AxisMap; 3]> {
        if policy == DirectionPolicy::Strict && !self.is_orthonormal() {
            return None;
        }

        // Degenerate columns keep their native axis.
        let units = self.unit_columns();
        let mut columns = [[0.0; 3]; 3];
        for (j, unit) in units.iter().enumerate() {
            columns[j] = unit.unwrap_or_else(|| {
                let mut c = [0.0; 3];
                c[j] = 1.0;
                c
            });
        }

        // Greedy assignment: strongest remaining cosine first.
        let mut result = [None::<AxisMap>; 3];
        let mut used_voxel = [false; 3];
        for _ in 0..3 {
            let mut best: Option<(usize, usize, f64)> = None;
            for (j, column) in columns.iter().enumerate() {
                if used_voxel[j] {
                    continue;
                }
                for (k, &cosine) in column.iter().enumerate() {
                    if result[k].is_some() {
                        continue;
                    }
                    if best.map_or(true, |(_, _, b)| cosine.abs() > b.abs()) {
                        best = Some((j, k, cosine));
                    }
                }
            }
            let (j, k, cosine) = best?;
            used_voxel[j] = true;
            result[k] = Some(AxisMap { source: j, flipped: cosine < 0.0 });
        }

        Some([result[0]?, result[1]?, result[2]?])
    }
}

/// Permute and flip an `[x, y, z]` array so its axes run along L, P, S.
#[must_use]
pub fn reorient(xyz: Array3<f64>, axes: &[AxisMap; 3]) -> Array3<f64> {
    let mut out = xyz.permuted_axes([axes[0].source, axes[1].source, axes[2].source]);
    for (k, axis) in axes.iter().enumerate() {
        if axis.flipped {
            out.invert_axis(Axis(k));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Array3<f64> {
        Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as f64)
    }

    #[test]
    fn test_identity_is_noop() {
        let axes = Direction::identity().axis_map(DirectionPolicy::Strict).unwrap();
        let data = ramp();
        assert_eq!(reorient(data.clone(), &axes), data);
    }

    #[test]
    fn test_ras_identity_flips_x_and_y() {
        let direction = Direction::from_ras_columns([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let axes = direction.axis_map(DirectionPolicy::Strict).unwrap();
        assert!(axes[0].flipped && axes[1].flipped && !axes[2].flipped);

        let out = reorient(ramp(), &axes);
        assert_eq!(out.dim(), (2, 3, 4));
        assert_eq!(out[[0, 0, 0]], 120.0);
        assert_eq!(out[[1, 2, 3]], 3.0);
    }

    #[test]
    fn test_swapped_axes_are_permuted() {
        // Voxel x runs along P, voxel y along L.
        let direction = Direction::from_columns([[0.0, 2.0, 0.0], [1.5, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        let axes = direction.axis_map(DirectionPolicy::Strict).unwrap();
        assert_eq!(axes[0].source, 1);
        assert_eq!(axes[1].source, 0);

        let data = ramp();
        let out = reorient(data.clone(), &axes);
        assert_eq!(out.dim(), (3, 2, 4));
        assert_eq!(out[[2, 1, 3]], data[[1, 2, 3]]);
    }

    #[test]
    fn test_strict_rejects_skewed_direction() {
        let skewed = Direction::from_columns([[-1.0, 0.3, 0.1], [0.8, 0.7, -0.2], [0.4, -0.9, 0.5]]);
        assert!(!skewed.is_orthonormal());
        assert!(skewed.axis_map(DirectionPolicy::Strict).is_none());

        let axes = skewed.axis_map(DirectionPolicy::Nearest).unwrap();
        let mut sources: Vec<usize> = axes.iter().map(|a| a.source).collect();
        sources.sort_unstable();
        assert_eq!(sources, vec![0, 1, 2]);
    }

    #[test]
    fn test_degenerate_column_keeps_native_axis() {
        let direction = Direction::from_columns([[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(direction.axis_map(DirectionPolicy::Strict).is_none());
        let axes = direction.axis_map(DirectionPolicy::Nearest).unwrap();
        assert_eq!(axes[1], AxisMap { source: 1, flipped: false });
    }
}
