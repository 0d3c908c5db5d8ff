//! Error taxonomy for capture, acquisition and persistence.
//!
//! None of these abort a batch: the orchestrator folds them into the
//! per-parent outcome.

/// The interception controller failed to capture a matching response.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no matching response captured within {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

/// The direct HTTP detail call failed.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("envelope code {code}: {msg}")]
    Envelope { code: i64, msg: String },

    #[error("undecodable body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Either acquisition mode's failure.
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// The persistence collaborator failed.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("undecodable store response: {0}")]
    Decode(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("no store configured")]
    NotConfigured,
}

/// Why a persist call was aborted before writing any child row.
#[derive(thiserror::Error, Debug)]
pub enum ParentError {
    #[error("parent qaq_id={0} not found")]
    NotFound(i64),

    #[error("parent qaq_id={external_id} is not a case or collection: {name}")]
    Mismatch { external_id: i64, name: String },

    #[error("parent qaq_id={external_id} has no store identity")]
    MissingIdentity { external_id: i64 },

    #[error("parent lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

/// Invalid configuration value.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid proxy URL {url}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("save_to_db is enabled but no store is configured")]
    MissingStore,

    #[error(transparent)]
    Catalog(#[from] case_catalog::CatalogError),
}
