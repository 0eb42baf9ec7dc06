use serde::{Deserialize, Serialize};
use crate::data::peak::Peak;

/// Isotope/charge envelope of one ion species within one sample.
///
/// `peak_ids` reference `Peak::id` values of the same sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u64,
    pub average_mz: f64,
    pub average_rt: f64,
    pub average_rt_delta: f64,
    pub average_mz_sigma: f64,
    pub average_rt_sigma: f64,
    pub charge_state: u8,
    pub peak_ids: Vec<u64>,
    pub total_height: f64,
    pub monoisotopic_height: f64,
    pub max_height: f64,
    pub total_volume: f64,
    pub monoisotopic_volume: f64,
    pub max_volume: f64,
}

impl Feature {
    /// Retention time of the feature after the alignment correction.
    #[inline]
    pub fn corrected_rt(&self) -> f64 {
        self.average_rt + self.average_rt_delta
    }
}

/// Features and peaks of a single sample.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputSetFeatures {
    pub group_id: u64,
    pub features: Vec<Feature>,
    pub peaks: Vec<Peak>,
}

impl InputSetFeatures {
    pub fn new(group_id: u64, features: Vec<Feature>, peaks: Vec<Peak>) -> Self {
        InputSetFeatures { group_id, features, peaks }
    }

    /// Stable sort of `peaks` by id, required before resolving feature peak ids.
    pub fn sort_peaks_by_id(&mut self) {
        self.peaks.sort_by_key(|p| p.id);
    }

    pub fn peaks_sorted_by_id(&self) -> bool {
        self.peaks.windows(2).all(|w| w[0].id <= w[1].id)
    }
}
