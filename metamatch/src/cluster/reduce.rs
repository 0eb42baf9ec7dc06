use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use mzcore::data::peak::{Peak, UNASSIGNED};
use crate::error::{MetaMatchError, Result};

/// A peak referenced by file and peak id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeakId {
    pub file_id: usize,
    pub peak_id: u64,
}

/// Peak-level consensus record of one analyte across files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,                 // rank by avg_height, not a stable identity
    pub mz: f64,
    pub rt: f64,
    pub avg_height: f64,
    pub file_heights: Vec<f64>,    // indexed by file_id, 0 where absent
    pub file_volumes: Vec<f64>,
    pub peak_ids: Vec<PeakId>,     // in file order
}

impl Cluster {
    pub fn n_members(&self) -> usize {
        self.peak_ids.len()
    }
}

/// Removes every unassigned peak from `peaks` and returns them.
///
/// `peaks` is left sorted by cluster id.
pub fn extract_orphans(peaks: &mut Vec<Peak>) -> Vec<Peak> {
    peaks.sort_by_key(|p| p.cluster_id);
    let split = peaks.partition_point(|p| p.cluster_id == UNASSIGNED);
    let orphans: Vec<Peak> = peaks.drain(..split).collect();
    log::debug!("extract_orphans: {} orphans, {} clustered peaks", orphans.len(), peaks.len());
    orphans
}

fn check_file_ids(peaks: &[Peak], n_files: usize) -> Result<()> {
    match peaks.iter().find(|p| p.file_id >= n_files) {
        Some(p) => Err(MetaMatchError::FileIdOutOfRange { peak_id: p.id, file_id: p.file_id, n_files }),
        None => Ok(()),
    }
}

/// Folds clustered peaks into one `Cluster` per cluster id.
///
/// # Arguments
///
/// * `peaks` - clustered peaks, e.g. what `extract_orphans` left behind; sorted in place
/// * `n_files` - number of files, sizes the per-file height and volume arrays
///
/// # Returns
///
/// * `Vec<Cluster>` - sorted by descending `avg_height`, ids are the ranks `0..k`
///
pub fn reduce_cluster(peaks: &mut [Peak], n_files: usize) -> Result<Vec<Cluster>> {
    check_file_ids(peaks, n_files)?;

    peaks.sort_by_key(|p| (p.cluster_id, p.file_id));

    let unassigned = peaks.partition_point(|p| p.cluster_id == UNASSIGNED);
    if unassigned > 0 {
        log::warn!("reduce_cluster: ignoring {} unassigned peaks", unassigned);
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    for (_, run) in &peaks[unassigned..].iter().chunk_by(|p| p.cluster_id) {
        let run: Vec<&Peak> = run.collect();
        let first = run[0];

        let mut file_heights = vec![0.0; n_files];
        let mut file_volumes = vec![0.0; n_files];
        let mut peak_ids = Vec::with_capacity(run.len());
        let mut sum_height = 0.0;

        for p in &run {
            file_heights[p.file_id] = p.fitted_height;
            file_volumes[p.file_id] = p.fitted_volume;
            sum_height += p.fitted_height;
            peak_ids.push(PeakId { file_id: p.file_id, peak_id: p.id });
        }

        clusters.push(Cluster {
            id: 0,
            mz: first.cluster_mz,
            rt: first.cluster_rt,
            avg_height: sum_height / run.len() as f64,
            file_heights,
            file_volumes,
            peak_ids,
        });
    }

    clusters.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.avg_height)));
    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = i;
    }

    log::debug!("reduce_cluster: {} clusters over {} files", clusters.len(), n_files);

    Ok(clusters)
}
