use std::fmt;

/// Reasons a forecast payload could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed forecast payload: {0}")]
    Malformed(String),

    #[error("Forecast payload has no `list` array")]
    MissingList,
}

/// Tag carried by a `Failed` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "Network"),
            FailureKind::Decode => write!(f, "Decode"),
        }
    }
}

/// Everything that can end a fetch cycle without a replace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network(_) => FailureKind::Network,
            FetchError::Decode(_) => FailureKind::Decode,
        }
    }
}
