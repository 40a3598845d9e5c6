//! Dice similarity for label volumes.
//!
//! The Dice similarity coefficient of two masks `A` and `B` is
//! `2|A ∩ B| / (|A| + |B|)`. Two empty masks agree perfectly (score 1.0) and
//! an empty mask against a non-empty one scores 0.0.
//!
//! - [`dice`]: score two boolean masks
//! - [`evaluate_pair`]: score every requested label of a ground-truth /
//!   prediction pair in a single pass over the voxels

use ndarray::{ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::volume::Volume;

/// Voxel counts and score for one mask pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiceResult {
    /// Voxels set in both masks (0 when either mask is empty).
    pub common: u64,
    /// Voxels in the ground-truth mask plus voxels in the prediction mask.
    pub both: u64,
    /// Voxels in the ground-truth mask.
    pub gt: u64,
    /// Dice score in `[0, 1]`.
    pub score: f64,
}

impl DiceResult {
    /// Apply the Dice formula and the empty-mask policy to raw counts.
    #[must_use]
    pub fn from_counts(common: u64, gt: u64, pred: u64) -> Self {
        let both = gt + pred;
        let (common, score) = if gt == 0 && pred == 0 {
            (0, 1.0)
        } else if gt == 0 || pred == 0 {
            (0, 0.0)
        } else {
            (common, 2.0 * common as f64 / both as f64)
        };
        Self { common, both, gt, score }
    }
}

/// Dice score of pooled counts. No voxels on either side scores 1.0.
#[must_use]
pub fn pooled_dice(common: u64, both: u64) -> f64 {
    if both == 0 { 1.0 } else { 2.0 * common as f64 / both as f64 }
}

/// Dice of two boolean masks.
///
/// Fails with [`Error::ShapeMismatch`] if the shapes differ.
pub fn dice(gt: &ArrayView3<'_, bool>, pred: &ArrayView3<'_, bool>) -> Result<DiceResult> {
    check_shapes(gt.dim(), pred.dim())?;
    let (mut common, mut gt_sum, mut pred_sum) = (0u64, 0u64, 0u64);
    Zip::from(gt).and(pred).for_each(|&g, &p| {
        gt_sum += u64::from(g);
        pred_sum += u64::from(p);
        common += u64::from(g && p);
    });
    Ok(DiceResult::from_counts(common, gt_sum, pred_sum))
}

fn check_shapes(gt: (usize, usize, usize), pred: (usize, usize, usize)) -> Result<()> {
    if gt == pred {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: [gt.0, gt.1, gt.2],
            actual: [pred.0, pred.1, pred.2],
        })
    }
}

/// Per-label statistics for one ground-truth / prediction pair.
///
/// All vectors are parallel to the label list passed to [`evaluate_pair`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStats {
    /// Voxels where both volumes carry the label.
    pub common_voxels: Vec<u64>,
    /// Ground-truth voxel count plus prediction voxel count.
    pub union_voxels: Vec<u64>,
    /// Ground-truth voxel count.
    pub gt_voxels: Vec<u64>,
    /// Dice score per label.
    pub dice_scores: Vec<f64>,
}

impl PairStats {
    /// Collect per-label results in label order.
    #[must_use]
    pub fn from_results(results: &[DiceResult]) -> Self {
        Self {
            common_voxels: results.iter().map(|r| r.common).collect(),
            union_voxels: results.iter().map(|r| r.both).collect(),
            gt_voxels: results.iter().map(|r| r.gt).collect(),
            dice_scores: results.iter().map(|r| r.score).collect(),
        }
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dice_scores.len()
    }

    /// Whether no labels were evaluated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dice_scores.is_empty()
    }

    /// Ground-truth voxels summed over all labels.
    #[must_use]
    pub fn total_gt_voxels(&self) -> u64 {
        self.gt_voxels.iter().sum()
    }
}

/// Score every value of `labels` between `gt` and `pred`.
///
/// Labels that cannot occur in a volume (negative, or wider than 16 bits)
/// are absent from both sides and therefore score 1.0.
pub fn evaluate_pair(gt: &Volume, pred: &Volume, labels: &[i64]) -> Result<PairStats> {
    check_shapes(gt.labels().dim(), pred.labels().dim())?;

    // Voxel value -> counter slot, shared by labels with equal values.
    let mut distinct: Vec<u16> = labels.iter().filter_map(|&v| u16::try_from(v).ok()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let table_len = distinct.last().map_or(0, |&v| usize::from(v) + 1);
    let mut slots: Vec<Option<usize>> = vec![None; table_len];
    for (slot, &value) in distinct.iter().enumerate() {
        slots[usize::from(value)] = Some(slot);
    }
    let slot_of = |v: u16| slots.get(usize::from(v)).copied().flatten();

    let mut gt_counts = vec![0u64; distinct.len()];
    let mut pred_counts = vec![0u64; distinct.len()];
    let mut common_counts = vec![0u64; distinct.len()];
    Zip::from(gt.labels()).and(pred.labels()).for_each(|&g, &p| {
        if let Some(s) = slot_of(g) {
            gt_counts[s] += 1;
            if g == p {
                common_counts[s] += 1;
            }
        }
        if let Some(s) = slot_of(p) {
            pred_counts[s] += 1;
        }
    });

    let results: Vec<DiceResult> = labels
        .iter()
        .map(|&value| {
            match u16::try_from(value).ok().and_then(|v| distinct.binary_search(&v).ok()) {
                Some(s) => DiceResult::from_counts(common_counts[s], gt_counts[s], pred_counts[s]),
                None => DiceResult::from_counts(0, 0, 0),
            }
        })
        .collect();

    Ok(PairStats::from_results(&results))
}
