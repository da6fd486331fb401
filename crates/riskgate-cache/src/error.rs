use riskgate_core::RiskError;

/// Errors surfaced by cache mutations.
///
/// Read paths never error: a corrupt or expired entry is discarded and the
/// read reports a miss.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The requested TTL was zero (or would truncate to zero).
    #[error("cache ttl must be greater than zero")]
    InvalidTtl,

    /// The value cannot fit even into an empty cache.
    #[error("value of {size} bytes exceeds the cache memory ceiling of {ceiling} bytes")]
    ValueTooLarge {
        /// Stored size of the offending payload.
        size: usize,
        /// Configured memory ceiling.
        ceiling: usize,
    },

    /// The value could not be serialized for storage.
    #[error("failed to serialize cache payload: {0}")]
    Serialization(String),
}

impl From<CacheError> for RiskError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidTtl | CacheError::ValueTooLarge { .. } => {
                RiskError::validation(err.to_string())
            }
            CacheError::Serialization(_) => RiskError::internal(err.to_string()),
        }
    }
}
