use std::cmp::Reverse;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use mzcore::algorithm::overlap::OverlapScorer;
use mzcore::data::feature::{Feature, InputSetFeatures};
use mzcore::data::peak::Peak;
use crate::cluster::lookup::{peaks_from_feature, resolve};

/// A feature referenced by input set index and feature id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureId {
    pub file_id: usize,
    pub feature_id: u64,
}

/// Feature-level consensus record of one analyte across samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCluster {
    pub id: usize,                     // discovery order
    pub mz: f64,
    pub rt: f64,
    pub charge_state: u8,
    pub avg_height: f64,               // mean total_height
    pub file_heights: Vec<f64>,        // total_height per input set, 0 where absent
    pub file_volumes: Vec<f64>,        // total_volume per input set
    pub avg_total_volume: f64,
    pub avg_monoisotopic_height: f64,
    pub avg_max_height: f64,
    pub avg_monoisotopic_volume: f64,
    pub avg_max_volume: f64,
    pub feature_ids: Vec<FeatureId>,
}

/// Region of interest around a reference feature, closed intervals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub mz: (f64, f64),
    pub rt: (f64, f64),
}

/// Computes the search window of a reference feature from its resolved peaks.
///
/// The m/z bounds are widened by 3 sigma of the lowest m/z peak on both ends, the rt bounds by
/// 3 `average_rt_sigma` around the corrected feature rt. Returns `None` without peaks.
pub fn feature_roi(reference: &Feature, ref_peaks: &[&Peak]) -> Option<Roi> {
    let lowest = ref_peaks
        .iter()
        .min_by_key(|p| OrderedFloat(p.fitted_mz))?;
    let highest_mz = ref_peaks
        .iter()
        .map(|p| p.fitted_mz)
        .fold(f64::NEG_INFINITY, f64::max);

    let sigma_mz = lowest.fitted_sigma_mz;
    let rt = reference.corrected_rt();
    let sigma_rt = reference.average_rt_sigma;

    Some(Roi {
        mz: (lowest.fitted_mz - 3.0 * sigma_mz, highest_mz + 3.0 * sigma_mz),
        rt: (rt - 3.0 * sigma_rt, rt + 3.0 * sigma_rt),
    })
}

#[derive(Clone, Copy, Debug)]
struct RtKey {
    feature_index: usize,
    rt: f64,                           // average_rt + average_rt_delta
}

#[derive(Clone, Copy, Debug)]
struct Priority {
    file_id: usize,
    feature_index: usize,
    total_height: f64,
}

/// Search indices and availability flags shared by all reference steps of one matching run.
#[derive(Clone, Debug)]
pub struct MatchContext {
    rt_index: Vec<Vec<RtKey>>,
    used: Vec<Vec<bool>>,
    priority: Vec<Priority>,
}

impl MatchContext {
    /// Sorts the peaks of every input set by id and builds the rt and intensity indices.
    pub fn new(input_sets: &mut [InputSetFeatures]) -> Self {
        let mut rt_index = Vec::with_capacity(input_sets.len());
        let mut used = Vec::with_capacity(input_sets.len());
        let mut priority = Vec::new();

        for (file_id, input_set) in input_sets.iter_mut().enumerate() {
            input_set.sort_peaks_by_id();

            let mut keys: Vec<RtKey> = input_set
                .features
                .iter()
                .enumerate()
                .map(|(feature_index, f)| RtKey { feature_index, rt: f.corrected_rt() })
                .collect();
            keys.sort_by_key(|k| OrderedFloat(k.rt));
            rt_index.push(keys);

            used.push(vec![false; input_set.features.len()]);

            priority.extend(input_set.features.iter().enumerate().map(|(feature_index, f)| Priority {
                file_id,
                feature_index,
                total_height: f.total_height,
            }));
        }

        priority.sort_by_key(|p| Reverse(OrderedFloat(p.total_height)));

        MatchContext { rt_index, used, priority }
    }

    #[inline]
    pub fn is_available(&self, file_id: usize, feature_index: usize) -> bool {
        !self.used[file_id][feature_index]
    }

    #[inline]
    fn mark_used(&mut self, file_id: usize, feature_index: usize) {
        self.used[file_id][feature_index] = true;
    }

    /// Features of `file_id` whose corrected rt lies in `[lo, hi]`, ascending.
    fn rt_window(&self, file_id: usize, (lo, hi): (f64, f64)) -> &[RtKey] {
        let keys = &self.rt_index[file_id];
        let start = keys.partition_point(|k| k.rt < lo);
        let end = start + keys[start..].partition_point(|k| k.rt <= hi);
        &keys[start..end]
    }
}

/// Best scoring available candidate of one sample for the given reference, as a feature index.
fn best_candidate<S: OverlapScorer>(
    ctx: &MatchContext,
    input_set: &InputSetFeatures,
    file_id: usize,
    reference: &Feature,
    ref_peaks: &[&Peak],
    roi: &Roi,
    scorer: &S,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for key in ctx.rt_window(file_id, roi.rt) {
        let feature_index = key.feature_index;
        if !ctx.is_available(file_id, feature_index) {
            continue;
        }

        let feature = &input_set.features[feature_index];
        if feature.charge_state != reference.charge_state {
            continue;
        }
        let reach = 3.0 * feature.average_mz_sigma;
        if feature.average_mz + reach < roi.mz.0 || feature.average_mz - reach > roi.mz.1 {
            continue;
        }

        let indices = peaks_from_feature(feature, &input_set.peaks);
        if indices.is_empty() {
            continue;
        }
        let peaks = resolve(&input_set.peaks, &indices);

        let overlap = scorer.cumulative_overlap(ref_peaks, &peaks);
        if overlap > best.map_or(0.0, |(_, score)| score) {
            best = Some((feature_index, overlap));
        }
    }

    best.map(|(feature_index, _)| feature_index)
}

/// Averages the contributing features into a cluster, `None` for a degenerate zero position.
///
/// # Panics
///
/// If `members` is empty.
fn build_cluster(input_sets: &[InputSetFeatures], members: &[(usize, usize)], charge_state: u8) -> Option<FeatureCluster> {
    assert!(!members.is_empty(), "feature cluster without members");

    let mut cluster = FeatureCluster {
        charge_state,
        file_heights: vec![0.0; input_sets.len()],
        file_volumes: vec![0.0; input_sets.len()],
        feature_ids: Vec::with_capacity(members.len()),
        ..Default::default()
    };

    for &(file_id, feature_index) in members {
        let feature = &input_sets[file_id].features[feature_index];
        cluster.mz += feature.average_mz;
        cluster.rt += feature.average_rt;
        cluster.avg_height += feature.total_height;
        cluster.avg_total_volume += feature.total_volume;
        cluster.avg_monoisotopic_height += feature.monoisotopic_height;
        cluster.avg_max_height += feature.max_height;
        cluster.avg_monoisotopic_volume += feature.monoisotopic_volume;
        cluster.avg_max_volume += feature.max_volume;
        cluster.file_heights[file_id] = feature.total_height;
        cluster.file_volumes[file_id] = feature.total_volume;
        cluster.feature_ids.push(FeatureId { file_id, feature_id: feature.id });
    }

    let n = members.len() as f64;
    cluster.mz /= n;
    cluster.rt /= n;
    cluster.avg_height /= n;
    cluster.avg_total_volume /= n;
    cluster.avg_monoisotopic_height /= n;
    cluster.avg_max_height /= n;
    cluster.avg_monoisotopic_volume /= n;
    cluster.avg_max_volume /= n;

    if cluster.mz != 0.0 && cluster.rt != 0.0 {
        Some(cluster)
    } else {
        None
    }
}

/// Greedily matches features of many samples into consensus clusters.
///
/// # Description
///
/// Features are visited by descending `total_height`. Every still available feature with
/// resolvable peaks becomes a reference: in each other sample the available feature of the same
/// charge inside the reference region of interest with the highest overlap score is selected.
/// Every selected feature, the reference included, is marked used; groups of at least two samples
/// are kept. Candidate scans of the samples run in parallel on the current rayon pool.
///
/// # Arguments
///
/// * `input_sets` - one entry per sample, the index is the `file_id` of the result; peaks are
///   sorted by id in place
/// * `scorer` - pairwise peak set similarity
///
/// # Returns
///
/// * `Vec<FeatureCluster>` - in discovery order, ids `0..n`
///
pub fn find_feature_clusters<S: OverlapScorer>(input_sets: &mut [InputSetFeatures], scorer: &S) -> Vec<FeatureCluster> {
    let mut ctx = MatchContext::new(input_sets);
    let input_sets: &[InputSetFeatures] = input_sets;

    let mut clusters: Vec<FeatureCluster> = Vec::new();
    let mut unresolved = 0usize;

    for k in 0..ctx.priority.len() {
        let Priority { file_id: ref_file, feature_index: ref_index, .. } = ctx.priority[k];
        if !ctx.is_available(ref_file, ref_index) {
            continue;
        }

        let ref_set = &input_sets[ref_file];
        let reference = &ref_set.features[ref_index];
        let ref_indices = peaks_from_feature(reference, &ref_set.peaks);
        let ref_peaks = resolve(&ref_set.peaks, &ref_indices);
        let Some(roi) = feature_roi(reference, &ref_peaks) else {
            log::trace!("feature {} of set {} has no resolvable peaks, not used as reference", reference.id, ref_file);
            unresolved += 1;
            continue;
        };

        // availability is read-only until every sample reported its candidate
        let selected: Vec<Option<usize>> = (0..input_sets.len())
            .into_par_iter()
            .map(|file_id| {
                if file_id == ref_file {
                    Some(ref_index)
                } else {
                    best_candidate(&ctx, &input_sets[file_id], file_id, reference, &ref_peaks, &roi, scorer)
                }
            })
            .collect();

        let members: Vec<(usize, usize)> = selected
            .into_iter()
            .enumerate()
            .filter_map(|(file_id, feature_index)| feature_index.map(|i| (file_id, i)))
            .collect();

        for &(file_id, feature_index) in &members {
            ctx.mark_used(file_id, feature_index);
        }

        if members.len() < 2 {
            continue;
        }

        if let Some(cluster) = build_cluster(input_sets, &members, reference.charge_state) {
            clusters.push(cluster);
        }
    }

    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = i;
    }

    log::debug!(
        "find_feature_clusters: {} input sets, {} features, {} clusters, {} unresolved references",
        input_sets.len(),
        ctx.priority.len(),
        clusters.len(),
        unresolved
    );

    clusters
}
