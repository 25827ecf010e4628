use thiserror::Error;

/// Errors surfaced across the broker capability boundary.
///
/// A risk rejection is not an error and never appears here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The venue has been shut down and accepts no further orders.
    #[error("broker is closed")]
    Closed,

    /// The request failed validation before reaching the venue.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Venue-side failure reported by a live adapter.
    #[error("venue error: {0}")]
    Venue(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
