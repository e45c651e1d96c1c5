use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error taxonomy of the registry core.
///
/// Every durable-storage failure is surfaced to the immediate caller; the
/// core performs no retries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("module already exists: {0}")]
    ModuleExists(String),

    /// Metadata file unreadable, corrupt, or unwritable.
    #[error("metadata persistence failed: {0}")]
    Persistence(String),

    /// Blob content could not be durably stored. When returned from
    /// `add_version` the metadata has already advanced, so the version
    /// number stays reserved until the upload is retried.
    #[error("blob write failed for {id} version {version}: {source}")]
    BlobWrite {
        id: String,
        version: u32,
        #[source]
        source: std::io::Error,
    },

    /// Blob content missing or unreadable for a recorded version.
    #[error("blob read failed for {id} version {version}: {source}")]
    BlobRead {
        id: String,
        version: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),
}
