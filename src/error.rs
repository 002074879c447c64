/// Convenience result type used across Vireo.
pub type VireoResult<T> = Result<T, VireoError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// The variants mirror the failure classes of the render pipeline:
/// configuration errors are fatal to a job and never retried, probe errors
/// are recoverable (callers substitute a default duration), graph errors are
/// programming/validation errors caught before ffmpeg is spawned, and encode
/// errors carry the diagnostic snippet extracted from the encoder's output.
#[derive(thiserror::Error, Debug)]
pub enum VireoError {
    /// Missing executable, missing required input file, unusable settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// ffprobe could not be located, timed out, or produced unparseable output.
    #[error("probe error: {0}")]
    Probe(String),

    /// Filter-graph construction referenced an unknown pad or reused a label.
    #[error("filter graph error: {0}")]
    Graph(String),

    /// The external encoder failed, stalled, or exhausted all codec attempts.
    #[error("encode error: {0}")]
    Encode(String),

    /// The job was cancelled through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VireoError {
    /// Build a [`VireoError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`VireoError::Probe`] value.
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Build a [`VireoError::Graph`] value.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`VireoError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_match_variant() {
        assert_eq!(
            VireoError::config("ffmpeg missing").to_string(),
            "configuration error: ffmpeg missing"
        );
        assert_eq!(
            VireoError::graph("duplicate label").to_string(),
            "filter graph error: duplicate label"
        );
        assert_eq!(VireoError::Cancelled.to_string(), "cancelled");
    }
}
