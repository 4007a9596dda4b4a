use thiserror::Error;
use tuner_proto::protocol::StationId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("unknown station {0} (have {1} stations)")]
    UnknownStation(StationId, usize),
}

/// Why one metadata cycle produced no title.  Never surfaced past the poller.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed metadata feed: {0}")]
    Parse(String),

    #[error("metadata feed has no title")]
    MissingTitle,

    #[error("metadata request timed out")]
    Timeout,
}
