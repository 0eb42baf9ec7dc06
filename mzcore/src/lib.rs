// data module
pub mod data {
    pub mod peak;
    pub mod feature;
}

// algorithm module
pub mod algorithm {
    pub mod overlap;
}
