use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use mzcore::algorithm::overlap::OverlapScorer;
use mzcore::data::feature::InputSetFeatures;
use mzcore::data::peak::{reset_clusters, Peak};
use crate::cluster::feature_match::{find_feature_clusters, FeatureCluster};
use crate::cluster::peak_cluster::find_clusters;
use crate::cluster::reduce::{extract_orphans, reduce_cluster, Cluster};
use crate::error::{MetaMatchError, Result};
use crate::params::MetaMatchParams;

/// Outcome of peak-level matching: ranked clusters and the peaks that joined none.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetaMatchResults {
    pub clusters: Vec<Cluster>,
    pub orphans: Vec<Peak>,
}

/// Runs the matching stages with one validated parameter set.
#[derive(Clone, Debug)]
pub struct MetaMatch {
    params: MetaMatchParams,
}

impl MetaMatch {
    pub fn new(params: MetaMatchParams) -> Result<Self> {
        params.validate()?;
        Ok(MetaMatch { params })
    }

    pub fn params(&self) -> &MetaMatchParams {
        &self.params
    }

    /// Clusters the peaks of all files, then splits orphans from clustered peaks and reduces the
    /// clusters.
    ///
    /// # Arguments
    ///
    /// * `peaks` - peaks of all files; assignments left over from a previous run are dropped
    /// * `n_files` - number of files, every `file_id` must be below it
    ///
    pub fn match_peaks(&self, mut peaks: Vec<Peak>, n_files: usize) -> Result<MetaMatchResults> {
        if let Some(p) = peaks.iter().find(|p| p.file_id >= n_files) {
            return Err(MetaMatchError::FileIdOutOfRange { peak_id: p.id, file_id: p.file_id, n_files });
        }

        reset_clusters(&mut peaks);
        find_clusters(&mut peaks, &self.params.peak_params())?;
        let orphans = extract_orphans(&mut peaks);
        let clusters = reduce_cluster(&mut peaks, n_files)?;

        log::info!(
            "metamatch: {} clusters, {} orphans from {} files",
            clusters.len(),
            orphans.len(),
            n_files
        );

        Ok(MetaMatchResults { clusters, orphans })
    }

    /// Matches features across input sets on a pool of `num_threads` workers.
    pub fn match_features<S: OverlapScorer>(
        &self,
        input_sets: &mut [InputSetFeatures],
        scorer: &S,
    ) -> Result<Vec<FeatureCluster>> {
        let num_threads = self.params.num_threads;

        if num_threads == 0 {
            Ok(find_feature_clusters(input_sets, scorer))
        } else {
            let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
            Ok(pool.install(|| find_feature_clusters(input_sets, scorer)))
        }
    }
}

/// Peak-level matching in one call.
///
/// # Arguments
///
/// * `peaks` - peaks of all files
/// * `n_files` - number of files
/// * `params` - engine parameters
///
/// # Returns
///
/// * `MetaMatchResults` - clusters ranked by average height and orphan peaks
///
pub fn perform_metamatch(peaks: Vec<Peak>, n_files: usize, params: MetaMatchParams) -> Result<MetaMatchResults> {
    MetaMatch::new(params)?.match_peaks(peaks, n_files)
}
