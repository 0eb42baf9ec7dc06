// src/lib.rs
pub mod error;
pub mod params;

pub mod cluster {
    pub mod peak_cluster;
    pub mod reduce;
    pub mod lookup;
    pub mod feature_match;
    pub mod pipeline;
}

// Re-export commonly used types
pub use error::{MetaMatchError, Result};
pub use params::{ClassMap, MetaMatchParams, PeakClusterParams};
pub use cluster::pipeline::{perform_metamatch, MetaMatch, MetaMatchResults};
pub use mzcore::data::peak::{Peak, UNASSIGNED};
pub use mzcore::data::feature::{Feature, InputSetFeatures};
