// Relative Value: where a report's FRA sits within its cohort, on an 80..=100 scale
use serde::{Deserialize, Serialize};

use super::fra::{div_round_half_even, div_round_half_up, Fra};

/// Cohorts smaller than this get no RV.
pub const MIN_COHORT_SIZE: usize = 3;

pub const RV_FLOOR: u8 = 80;
pub const RV_MEAN: u8 = 90;
pub const RV_MAX: u8 = 100;

/// Per-cohort reference points. `floor_fra` mirrors the max around the mean
/// and can fall below the FRA domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RvAnchors {
    pub max_fra: Fra,
    pub mean_fra: Fra,
    pub floor_fra: Fra,
    pub cohort_size: usize,
}

impl RvAnchors {
    pub fn from_cohort(fras: &[Fra]) -> Option<Self> {
        if fras.len() < MIN_COHORT_SIZE {
            return None;
        }
        let max = fras.iter().map(|f| f.hundredths()).max()?;
        let sum: i64 = fras.iter().map(|f| f.hundredths()).sum();
        let mean = div_round_half_up(sum, fras.len() as i64);
        let floor = mean - (max - mean);

        Some(Self {
            max_fra: Fra::from_hundredths(max),
            mean_fra: Fra::from_hundredths(mean),
            floor_fra: Fra::from_hundredths(floor),
            cohort_size: fras.len(),
        })
    }

    /// Piecewise-linear RV, rounded half to even and clamped to 80..=100.
    pub fn rv_for(&self, target: Fra) -> u8 {
        let t = target.hundredths();
        let max = self.max_fra.hundredths();
        let mean = self.mean_fra.hundredths();
        let floor = self.floor_fra.hundredths();

        let rv = if max == mean {
            match t.cmp(&mean) {
                std::cmp::Ordering::Greater => i64::from(RV_MAX),
                std::cmp::Ordering::Equal => i64::from(RV_MEAN),
                std::cmp::Ordering::Less => i64::from(RV_FLOOR),
            }
        } else if t >= max {
            i64::from(RV_MAX)
        } else if t > mean {
            let span = max - mean;
            div_round_half_even(i64::from(RV_MEAN) * span + 10 * (t - mean), span)
        } else if t > floor {
            let span = mean - floor;
            div_round_half_even(i64::from(RV_FLOOR) * span + 10 * (t - floor), span)
        } else {
            i64::from(RV_FLOOR)
        };

        rv.clamp(i64::from(RV_FLOOR), i64::from(RV_MAX)) as u8
    }
}

/// RV of `target` within `cohort`, which must include the target itself.
pub fn compute_rv(target: Fra, cohort: &[Fra]) -> Option<u8> {
    RvAnchors::from_cohort(cohort).map(|anchors| anchors.rv_for(target))
}

/// Anchors plus one RV per member, in member order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortRv {
    pub anchors: Option<RvAnchors>,
    pub values: Vec<Option<u8>>,
}

/// Score a whole cohort with anchors computed once.
pub fn assign_relative_values(fras: &[Fra]) -> CohortRv {
    let anchors = RvAnchors::from_cohort(fras);
    let values = fras.iter().map(|&f| anchors.map(|a| a.rv_for(f))).collect();
    CohortRv { anchors, values }
}
