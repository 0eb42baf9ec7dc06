use mzcore::data::feature::Feature;
use mzcore::data::peak::Peak;

/// Resolves the peak ids of `feature` against `sorted_peaks`.
///
/// # Arguments
///
/// * `feature` - feature whose `peak_ids` are looked up
/// * `sorted_peaks` - peaks of the same sample, sorted ascending by `id`
///
/// # Returns
///
/// * `Vec<usize>` - indices into `sorted_peaks`, in `peak_ids` order; ids without a match are
///   left out, so a shorter result means the feature data is incomplete
///
pub fn peaks_from_feature(feature: &Feature, sorted_peaks: &[Peak]) -> Vec<usize> {
    debug_assert!(sorted_peaks.windows(2).all(|w| w[0].id <= w[1].id), "peaks must be sorted by id");

    feature
        .peak_ids
        .iter()
        .filter_map(|peak_id| sorted_peaks.binary_search_by_key(peak_id, |p| p.id).ok())
        .collect()
}

/// Borrows the peaks at `indices`, for handing them to an overlap scorer.
#[inline]
pub fn resolve<'a>(sorted_peaks: &'a [Peak], indices: &[usize]) -> Vec<&'a Peak> {
    indices.iter().map(|&i| &sorted_peaks[i]).collect()
}
