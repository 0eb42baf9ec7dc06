use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::{MetaMatchError, Result};

/// Minimum number of distinct-file hits of a class needed to confirm a peak cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    pub class_id: u32,
    pub required_hits: usize,
}

impl ClassMap {
    pub fn new(class_id: u32, required_hits: usize) -> Self {
        ClassMap { class_id, required_hits }
    }
}

/// Parameters of the peak clustering stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakClusterParams {
    /// Half width of the cluster rectangle along m/z.
    pub radius_mz: f64,
    /// Half width of the cluster rectangle along corrected retention time.
    pub radius_rt: f64,
    /// Confirmation thresholds, first matching class wins.
    pub class_maps: Vec<ClassMap>,
}

impl PeakClusterParams {
    pub fn new(radius_mz: f64, radius_rt: f64, class_maps: Vec<ClassMap>) -> Self {
        PeakClusterParams { radius_mz, radius_rt, class_maps }
    }

    pub fn validate(&self) -> Result<()> {
        validate_radius("radius_mz", self.radius_mz)?;
        validate_radius("radius_rt", self.radius_rt)?;
        Ok(())
    }
}

impl Default for PeakClusterParams {
    fn default() -> Self {
        Self {
            radius_mz: 0.005,
            radius_rt: 10.0,
            class_maps: Vec::new(),
        }
    }
}

fn validate_radius(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MetaMatchError::invalid(name, format!("must be finite and > 0, got {}", value)));
    }
    Ok(())
}

/// Full engine configuration, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaMatchParams {
    pub radius_mz: f64,
    pub radius_rt: f64,
    pub class_maps: Vec<ClassMap>,
    /// Worker threads for the candidate scans of feature matching, 0 = rayon default.
    pub num_threads: usize,
}

impl Default for MetaMatchParams {
    fn default() -> Self {
        let peaks = PeakClusterParams::default();
        Self {
            radius_mz: peaks.radius_mz,
            radius_rt: peaks.radius_rt,
            class_maps: peaks.class_maps,
            num_threads: 0,
        }
    }
}

impl MetaMatchParams {
    /// Parses a JSON document, missing keys take their default value.
    ///
    /// # Arguments
    ///
    /// * `json` - e.g. `{"radius_mz": 0.01, "radius_rt": 5.0, "class_maps": [{"class_id": 0, "required_hits": 2}]}`
    ///
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: MetaMatchParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn peak_params(&self) -> PeakClusterParams {
        PeakClusterParams::new(self.radius_mz, self.radius_rt, self.class_maps.clone())
    }

    pub fn validate(&self) -> Result<()> {
        self.peak_params().validate()
    }
}

/// Number of hits needed for `fraction` of `n` files, never below 1.
fn required_hits(n: usize, fraction: f64) -> usize {
    let exact = fraction * n as f64;
    let rounded = exact.round();
    // 0.7 * 10 must give 7, not 8
    let hits = if (exact - rounded).abs() < 1e-9 { rounded } else { exact.ceil() };
    (hits as usize).max(1)
}

/// Derives one `ClassMap` per distinct class from the class of every input file.
///
/// # Arguments
///
/// * `class_ids_per_file` - class of each file, indexed by `file_id`
/// * `fraction` - share of the files of a class that must contribute a peak, in (0, 1]
///
/// # Returns
///
/// * `Vec<ClassMap>` - sorted by class id
///
pub fn class_maps_from_fraction(class_ids_per_file: &[u32], fraction: f64) -> Result<Vec<ClassMap>> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(MetaMatchError::invalid("fraction", format!("must be in (0, 1], got {}", fraction)));
    }

    let mut files_per_class: BTreeMap<u32, usize> = BTreeMap::new();
    for &class_id in class_ids_per_file {
        *files_per_class.entry(class_id).or_default() += 1;
    }

    Ok(files_per_class
        .into_iter()
        .map(|(class_id, n)| ClassMap::new(class_id, required_hits(n, fraction)))
        .collect())
}
