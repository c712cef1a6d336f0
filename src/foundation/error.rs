/// Convenience result type used across MoSculp.
pub type MosculpResult<T> = Result<T, MosculpError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum MosculpError {
    /// The request was rejected before any network or compute work started.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Structural invariant of an index map (or the layers it names) was violated.
    #[error("invalid index map: {0}")]
    InvalidIndexMap(String),

    /// A remote resource is missing or could not be fetched.
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Invalid engine settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MosculpError {
    /// Build a [`MosculpError::InvalidRequest`] value.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Build a [`MosculpError::InvalidIndexMap`] value.
    pub fn invalid_index_map(msg: impl Into<String>) -> Self {
        Self::InvalidIndexMap(msg.into())
    }

    /// Build a [`MosculpError::AssetUnavailable`] value.
    pub fn asset_unavailable(msg: impl Into<String>) -> Self {
        Self::AssetUnavailable(msg.into())
    }

    /// Build a [`MosculpError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`MosculpError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Whether this error means a remote asset could not be obtained.
    pub fn is_asset_unavailable(&self) -> bool {
        matches!(self, Self::AssetUnavailable(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
