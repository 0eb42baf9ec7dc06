use std::cmp::Ordering;
use ordered_float::OrderedFloat;
use mzcore::data::peak::{ClusterId, Peak, UNASSIGNED};
use crate::error::Result;
use crate::params::{ClassMap, PeakClusterParams};

/// Height-weighted centroid `(mz, corrected rt)` of the peaks at `indices`.
///
/// Falls back to the unweighted mean when all heights are zero.
///
/// # Panics
///
/// If `indices` is empty: a cluster is never left without members.
pub fn weighted_centroid(peaks: &[Peak], indices: &[usize]) -> (f64, f64) {
    assert!(!indices.is_empty(), "centroid of a cluster without members");

    let mut mz_sum = 0.0;
    let mut rt_sum = 0.0;
    let mut height_sum = 0.0;
    for &k in indices {
        let p = &peaks[k];
        mz_sum += p.fitted_mz * p.fitted_height;
        rt_sum += p.corrected_rt() * p.fitted_height;
        height_sum += p.fitted_height;
    }

    if height_sum > 0.0 {
        (mz_sum / height_sum, rt_sum / height_sum)
    } else {
        let n = indices.len() as f64;
        let mz = indices.iter().map(|&k| peaks[k].fitted_mz).sum::<f64>() / n;
        let rt = indices.iter().map(|&k| peaks[k].corrected_rt()).sum::<f64>() / n;
        (mz, rt)
    }
}

/// Orders peaks by m/z, then corrected rt, then file.
fn cmp_mz_rt_file(a: &Peak, b: &Peak) -> Ordering {
    OrderedFloat(a.fitted_mz)
        .cmp(&OrderedFloat(b.fitted_mz))
        .then_with(|| OrderedFloat(a.corrected_rt()).cmp(&OrderedFloat(b.corrected_rt())))
        .then_with(|| a.file_id.cmp(&b.file_id))
}

/// The cluster currently being grown: member indices into the sorted peak slice and the centroid.
#[derive(Clone, Debug)]
struct ClusterMembers {
    id: ClusterId,
    indices: Vec<usize>,
    mz: f64,
    rt: f64,
}

impl ClusterMembers {
    fn seed(peaks: &mut [Peak], i: usize, id: ClusterId) -> Self {
        peaks[i].cluster_id = id;
        let mut members = ClusterMembers { id, indices: vec![i], mz: 0.0, rt: 0.0 };
        members.recenter(peaks);
        members
    }

    #[inline]
    fn recenter(&mut self, peaks: &[Peak]) {
        let (mz, rt) = weighted_centroid(peaks, &self.indices);
        self.mz = mz;
        self.rt = rt;
    }

    #[inline]
    fn contains(&self, peak: &Peak, radius_mz: f64, radius_rt: f64) -> bool {
        (peak.fitted_mz - self.mz).abs() < radius_mz && (peak.corrected_rt() - self.rt).abs() < radius_rt
    }

    /// Adds peak `j`, or swaps it in for the member of the same file if `j` is higher.
    /// Returns false when the membership did not change.
    fn insert(&mut self, peaks: &mut [Peak], j: usize) -> bool {
        let file_id = peaks[j].file_id;
        let same_file = self.indices.iter().position(|&k| peaks[k].file_id == file_id);
        match same_file {
            Some(pos) => {
                let k = self.indices[pos];
                if peaks[k].fitted_height >= peaks[j].fitted_height {
                    return false;
                }
                peaks[k].cluster_id = UNASSIGNED;
                self.indices[pos] = j;
            }
            None => self.indices.push(j),
        }
        peaks[j].cluster_id = self.id;
        self.recenter(peaks);
        true
    }

    /// Drops members outside the rectangle around the centroid, one at a time, until none is left
    /// outside. Returns the number of culled peaks.
    fn cull(&mut self, peaks: &mut [Peak], radius_mz: f64, radius_rt: f64) -> usize {
        let mut culled = 0;
        loop {
            let outside = self
                .indices
                .iter()
                .rposition(|&k| !self.contains(&peaks[k], radius_mz, radius_rt));
            let Some(pos) = outside else { break };
            let k = self.indices.remove(pos);
            peaks[k].cluster_id = UNASSIGNED;
            log::trace!("cluster {}: culled {}", self.id, peaks[k]);
            self.recenter(peaks);
            culled += 1;
        }
        culled
    }

    fn is_confirmed(&self, peaks: &[Peak], class_maps: &[ClassMap]) -> bool {
        let mut class_hits = vec![0usize; class_maps.len()];
        for &k in &self.indices {
            if let Some(c) = class_maps.iter().position(|m| m.class_id == peaks[k].class_id) {
                class_hits[c] += 1;
            }
        }
        class_hits
            .iter()
            .zip(class_maps)
            .any(|(&hits, map)| hits != 0 && hits >= map.required_hits)
    }

    fn confirm(&self, peaks: &mut [Peak]) {
        for &k in &self.indices {
            peaks[k].cluster_mz = self.mz;
            peaks[k].cluster_rt = self.rt;
        }
    }

    fn dissolve(&self, peaks: &mut [Peak]) {
        for &k in &self.indices {
            peaks[k].cluster_id = UNASSIGNED;
        }
    }
}

/// Groups peaks of many files into clusters of the same analyte.
///
/// # Description
///
/// Peaks are sorted by (m/z, corrected rt, file) and visited once. Every unassigned peak seeds a
/// cluster that greedily absorbs the following unassigned peaks inside the rectangle
/// `mz < cluster_mz + radius_mz`, `rt < cluster_rt + radius_rt`, keeping at most one peak per file
/// (the higher one). After every change the centroid is recomputed and members that fell outside
/// `cluster ± radius` are culled. Clusters that reach the hit threshold of any class map keep
/// their id and get the centroid stamped on every member, the others dissolve.
///
/// # Arguments
///
/// * `peaks` - peaks of all files, sorted and assigned in place
/// * `params` - cluster radii and class maps
///
/// # Returns
///
/// * `usize` - number of confirmed clusters, their ids are `0..n`
///
pub fn find_clusters(peaks: &mut [Peak], params: &PeakClusterParams) -> Result<usize> {
    params.validate()?;
    let (radius_mz, radius_rt) = (params.radius_mz, params.radius_rt);

    peaks.sort_by(cmp_mz_rt_file);

    let mut cluster_id: ClusterId = 0;
    let mut dissolved = 0usize;

    for i in 0..peaks.len() {
        if peaks[i].is_assigned() {
            continue;
        }

        let mut members = ClusterMembers::seed(peaks, i, cluster_id);

        for j in (i + 1)..peaks.len() {
            // sorted by mz: nothing further right can enter the cluster
            if peaks[j].fitted_mz >= members.mz + radius_mz {
                break;
            }
            if peaks[j].is_assigned() || peaks[j].corrected_rt() >= members.rt + radius_rt {
                continue;
            }
            if members.insert(peaks, j) {
                members.cull(peaks, radius_mz, radius_rt);
            }
        }

        if members.is_confirmed(peaks, &params.class_maps) {
            members.confirm(peaks);
            cluster_id += 1;
        } else {
            members.dissolve(peaks);
            dissolved += 1;
        }
    }

    log::debug!(
        "find_clusters: {} peaks, {} clusters confirmed, {} dissolved",
        peaks.len(),
        cluster_id,
        dissolved
    );

    Ok(cluster_id as usize)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use mzcore::data::peak::reset_clusters;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn peak(file_id: usize, id: u64, mz: f64, rt: f64, height: f64) -> Peak {
        Peak::new(file_id, id, mz, rt, height)
    }

    fn find<'a>(peaks: &'a [Peak], file_id: usize, id: u64) -> &'a Peak {
        peaks.iter().find(|p| p.file_id == file_id && p.id == id).unwrap()
    }

    pub(crate) fn random_peaks(seed: u64, n_files: usize, per_file: usize) -> Vec<Peak> {
        let mut rng = StdRng::seed_from_u64(seed);
        let analytes: Vec<(f64, f64)> = (0..per_file)
            .map(|_| (rng.gen_range(200.0..210.0), rng.gen_range(0.0..600.0)))
            .collect();
        let mut peaks = Vec::new();
        for file_id in 0..n_files {
            for (id, &(mz, rt)) in analytes.iter().enumerate() {
                let mut p = peak(
                    file_id,
                    id as u64,
                    mz + rng.gen_range(-0.004..0.004),
                    rt + rng.gen_range(-3.0..3.0),
                    rng.gen_range(1.0..1000.0),
                );
                p.rt_delta = rng.gen_range(-1.0..1.0);
                p.fitted_volume = p.fitted_height * 2.0;
                p.class_id = (file_id % 2) as u32;
                peaks.push(p);
            }
        }
        peaks
    }

    #[test]
    fn test_weighted_centroid() {
        let peaks = vec![peak(0, 0, 100.0, 10.0, 1.0), peak(1, 0, 102.0, 20.0, 3.0)];
        let (mz, rt) = weighted_centroid(&peaks, &[0, 1]);
        assert!((mz - 101.5).abs() < 1e-12);
        assert!((rt - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_centroid_zero_heights() {
        let peaks = vec![peak(0, 0, 100.0, 10.0, 0.0), peak(1, 0, 102.0, 20.0, 0.0)];
        let (mz, rt) = weighted_centroid(&peaks, &[0, 1]);
        assert!((mz - 101.0).abs() < 1e-12);
        assert!((rt - 15.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_weighted_centroid_without_members_panics() {
        let peaks = vec![peak(0, 0, 100.0, 10.0, 1.0)];
        weighted_centroid(&peaks, &[]);
    }

    #[test]
    fn test_three_files_form_one_cluster() {
        init();
        let mut peaks = vec![
            peak(0, 0, 100.0, 300.0, 10.0),
            peak(1, 0, 100.0, 301.0, 20.0),
            peak(2, 0, 100.0, 299.0, 30.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 2)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        assert_eq!(n, 1);
        assert!(peaks.iter().all(|p| p.cluster_id == 0));
        let expected_rt = (300.0 * 10.0 + 301.0 * 20.0 + 299.0 * 30.0) / 60.0;
        for p in &peaks {
            assert!((p.cluster_mz - 100.0).abs() < 1e-9);
            assert!((p.cluster_rt - expected_rt).abs() < 1e-9);
        }
    }

    #[test]
    fn test_peaks_are_sorted_by_mz_then_rt() {
        let mut peaks = vec![
            peak(1, 0, 100.5, 10.0, 1.0),
            peak(0, 1, 100.0, 20.0, 1.0),
            peak(0, 2, 100.0, 10.0, 1.0),
        ];
        let params = PeakClusterParams::new(0.01, 1.0, Vec::new());
        find_clusters(&mut peaks, &params).unwrap();
        let ids: Vec<u64> = peaks.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[test]
    fn test_same_file_keeps_higher_peak() {
        let mut peaks = vec![
            peak(0, 0, 200.0, 100.0, 10.0),
            peak(0, 1, 200.0, 101.0, 50.0),
            peak(1, 0, 200.0, 100.5, 20.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 2)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        assert_eq!(n, 1);
        // the displaced seed is not retried
        assert_eq!(find(&peaks, 0, 0).cluster_id, UNASSIGNED);
        assert_eq!(find(&peaks, 0, 1).cluster_id, 0);
        assert_eq!(find(&peaks, 1, 0).cluster_id, 0);
    }

    #[test]
    fn test_same_file_lower_candidate_seeds_later() {
        let mut peaks = vec![
            peak(0, 0, 200.0, 100.0, 50.0),
            peak(0, 1, 200.0, 101.0, 10.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 1)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        assert_eq!(n, 2);
        assert_eq!(find(&peaks, 0, 0).cluster_id, 0);
        assert_eq!(find(&peaks, 0, 1).cluster_id, 1);
    }

    #[test]
    fn test_unconfirmed_cluster_dissolves() {
        let mut peaks = vec![
            peak(0, 0, 300.0, 50.0, 10.0),
            peak(1, 0, 300.0, 51.0, 10.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 3)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        assert_eq!(n, 0);
        assert!(peaks.iter().all(|p| p.cluster_id == UNASSIGNED));
    }

    #[test]
    fn test_unmapped_class_does_not_confirm() {
        let mut peaks = vec![
            peak(0, 0, 300.0, 50.0, 10.0),
            peak(1, 0, 300.0, 51.0, 10.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(1, 0)]);

        assert_eq!(find_clusters(&mut peaks, &params).unwrap(), 0);
        assert!(peaks.iter().all(|p| !p.is_assigned()));
    }

    #[test]
    fn test_culled_peak_seeds_its_own_cluster() {
        let mut peaks = vec![
            peak(0, 0, 100.000, 300.0, 10.0),
            peak(1, 0, 100.001, 200.0, 10.0),
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 1)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        assert_eq!(n, 2);
        let a = find(&peaks, 0, 0);
        let b = find(&peaks, 1, 0);
        assert_eq!(a.cluster_id, 0);
        assert_eq!(b.cluster_id, 1);
        assert!((a.cluster_rt - 300.0).abs() < 1e-9);
        assert!((b.cluster_rt - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_cull_removes_members_until_stable() {
        let mut peaks = vec![
            peak(0, 0, 100.0, 100.0, 1.0),
            peak(1, 0, 100.1, 108.0, 1.0),
            peak(2, 0, 100.2, 60.0, 100.0),
        ];
        let params = PeakClusterParams::new(1.0, 10.0, vec![ClassMap::new(0, 1)]);

        let n = find_clusters(&mut peaks, &params).unwrap();

        // the heavy low-rt peak drags the centroid away from both earlier members
        assert_eq!(n, 2);
        let heavy = find(&peaks, 2, 0);
        assert_eq!(heavy.cluster_id, 0);
        assert!((heavy.cluster_rt - 60.0).abs() < 1e-9);
        assert!((heavy.cluster_mz - 100.2).abs() < 1e-9);
        // the seed is behind the scan and stays unassigned, the second member seeds cluster 1
        assert_eq!(find(&peaks, 0, 0).cluster_id, UNASSIGNED);
        let second = find(&peaks, 1, 0);
        assert_eq!(second.cluster_id, 1);
        assert!((second.cluster_rt - 108.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_matching_class_map_wins() {
        let mut peaks = vec![
            Peak { class_id: 1, ..peak(0, 0, 300.0, 50.0, 10.0) },
            Peak { class_id: 1, ..peak(1, 0, 300.0, 51.0, 10.0) },
        ];
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(1, 3), ClassMap::new(1, 1)]);

        assert_eq!(find_clusters(&mut peaks, &params).unwrap(), 0);
        assert!(peaks.iter().all(|p| !p.is_assigned()));

        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(1, 2), ClassMap::new(1, 3)]);
        assert_eq!(find_clusters(&mut peaks, &params).unwrap(), 1);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let mut peaks = vec![peak(0, 0, 100.0, 10.0, 1.0)];
        let params = PeakClusterParams::new(-1.0, 5.0, Vec::new());
        assert!(find_clusters(&mut peaks, &params).is_err());
        assert_eq!(peaks[0].cluster_id, UNASSIGNED);
    }

    #[test]
    fn test_find_clusters_is_deterministic() {
        init();
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 2), ClassMap::new(1, 2)]);
        let mut peaks = random_peaks(7, 6, 200);

        let n_first = find_clusters(&mut peaks, &params).unwrap();
        let first: Vec<(usize, u64, i64)> = peaks.iter().map(|p| (p.file_id, p.id, p.cluster_id)).collect();

        reset_clusters(&mut peaks);
        let n_second = find_clusters(&mut peaks, &params).unwrap();
        let second: Vec<(usize, u64, i64)> = peaks.iter().map(|p| (p.file_id, p.id, p.cluster_id)).collect();

        assert!(n_first > 0);
        assert_eq!(n_first, n_second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_confirmed_clusters_respect_file_and_radius() {
        let params = PeakClusterParams::new(0.01, 5.0, vec![ClassMap::new(0, 2), ClassMap::new(1, 2)]);
        let mut peaks = random_peaks(11, 8, 300);

        let n = find_clusters(&mut peaks, &params).unwrap();

        let mut files_per_cluster: BTreeMap<i64, HashSet<usize>> = BTreeMap::new();
        for p in peaks.iter().filter(|p| p.is_assigned()) {
            assert!(files_per_cluster.entry(p.cluster_id).or_default().insert(p.file_id));
            assert!((p.fitted_mz - p.cluster_mz).abs() < params.radius_mz);
            assert!((p.corrected_rt() - p.cluster_rt).abs() < params.radius_rt);
        }
        let ids: Vec<i64> = files_per_cluster.keys().copied().collect();
        assert_eq!(ids, (0..n as i64).collect::<Vec<_>>());
    }
}
