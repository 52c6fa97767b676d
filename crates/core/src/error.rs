use thiserror::Error;

/// Shared error type for every process in the ingestion fleet.
///
/// Mirrors the closed `thiserror` enum style used throughout this codebase:
/// library errors are wrapped with `#[from]`, domain errors get their own
/// variant so call sites can match on them (e.g. to decide retry vs. abort).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),

    #[error("invalid env var {name}: {value:?} ({reason})")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Pool(#[from] bb8::RunError<tokio_postgres::Error>),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("catalog unavailable for {currency}/{kind:?}: {reason}")]
    CatalogUnavailable {
        currency: String,
        kind: String,
        reason: String,
    },

    #[error("partition out of range: connection_id={connection_id} partitions={partitions}")]
    PartitionOutOfRange {
        connection_id: usize,
        partitions: usize,
    },

    #[error("buffer full: {queue} at {utilization_pct:.1}%")]
    BufferFull {
        queue: &'static str,
        utilization_pct: f64,
    },

    #[error("batch write failed after {attempts} attempts: {source}")]
    BatchWriteFailed {
        attempts: u32,
        #[source]
        source: Box<CoreError>,
    },

    #[error("exchange API error: {0}")]
    ExchangeApi(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
