use std::fmt;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

/// Cluster assignment of a peak, `UNASSIGNED` while the peak belongs to no confirmed cluster.
pub type ClusterId = i64;

/// Sentinel for peaks that are not part of any cluster.
pub const UNASSIGNED: ClusterId = -1;

/// A fitted peak of one sample, as produced by upstream peak detection and alignment.
///
/// # Description
///
/// `fitted_*` values come from a 2D Gaussian fit of the intensity surface, `rt_delta` is the
/// retention time correction computed by the alignment step. The `cluster_*` fields are owned by
/// the matching engine and are overwritten during clustering.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub file_id: usize,
    pub id: u64,               // unique within a file
    pub fitted_mz: f64,
    pub fitted_rt: f64,
    pub rt_delta: f64,         // external rt correction
    pub fitted_height: f64,
    pub fitted_volume: f64,
    pub fitted_sigma_mz: f64,
    pub fitted_sigma_rt: f64,
    pub class_id: u32,
    pub cluster_id: ClusterId,
    pub cluster_mz: f64,       // stamped once the cluster is confirmed
    pub cluster_rt: f64,
}

impl Peak {
    /// Creates an unassigned peak with unit sigmas and no rt correction.
    ///
    /// # Arguments
    ///
    /// * `file_id` - index of the file (sample) the peak was detected in
    /// * `id` - peak id, unique within `file_id`
    /// * `fitted_mz` - fitted m/z apex
    /// * `fitted_rt` - fitted retention time apex
    /// * `fitted_height` - fitted apex intensity
    ///
    /// # Returns
    ///
    /// * `Peak` - a peak with `cluster_id == UNASSIGNED`
    ///
    pub fn new(file_id: usize, id: u64, fitted_mz: f64, fitted_rt: f64, fitted_height: f64) -> Self {
        Peak {
            file_id,
            id,
            fitted_mz,
            fitted_rt,
            fitted_height,
            ..Default::default()
        }
    }

    /// Retention time after applying the alignment correction.
    #[inline]
    pub fn corrected_rt(&self) -> f64 {
        self.fitted_rt + self.rt_delta
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.cluster_id != UNASSIGNED
    }

    /// Drops any cluster assignment, e.g. before re-running clustering on the same batch.
    pub fn reset_cluster(&mut self) {
        self.cluster_id = UNASSIGNED;
        self.cluster_mz = 0.0;
        self.cluster_rt = 0.0;
    }
}

impl Default for Peak {
    fn default() -> Self {
        Peak {
            file_id: 0,
            id: 0,
            fitted_mz: 0.0,
            fitted_rt: 0.0,
            rt_delta: 0.0,
            fitted_height: 0.0,
            fitted_volume: 0.0,
            fitted_sigma_mz: 1.0,
            fitted_sigma_rt: 1.0,
            class_id: 0,
            cluster_id: UNASSIGNED,
            cluster_mz: 0.0,
            cluster_rt: 0.0,
        }
    }
}

impl Display for Peak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Peak(file: {}, id: {}, mz: {:.4}, rt: {:.2}, height: {:.1}, cluster: {})",
            self.file_id,
            self.id,
            self.fitted_mz,
            self.corrected_rt(),
            self.fitted_height,
            self.cluster_id
        )
    }
}

/// Resets the cluster assignment of every peak in `peaks`.
pub fn reset_clusters(peaks: &mut [Peak]) {
    for peak in peaks.iter_mut() {
        peak.reset_cluster();
    }
}
