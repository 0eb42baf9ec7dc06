/// Errors raised at the boundaries of the matching engine.
///
/// The clustering algorithms themselves never fail on malformed peaks or features, they skip or
/// dissolve them. Errors are reserved for invalid parameters and caller contract violations.
#[derive(Debug, thiserror::Error)]
pub enum MetaMatchError {
    /// Parameter outside its valid range
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A peak references a file outside the declared file universe
    #[error("Peak {peak_id} has file_id {file_id}, but only {n_files} files were declared")]
    FileIdOutOfRange { peak_id: u64, file_id: usize, n_files: usize },

    /// Malformed configuration
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, MetaMatchError>;

impl MetaMatchError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        MetaMatchError::InvalidParameter { name, reason: reason.into() }
    }
}
