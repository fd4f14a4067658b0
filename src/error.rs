/// Error type for this crate.
///
/// The `Redis`, `NotFound` and `Store` variants are store errors: they come out of a
/// [`BucketStore`](crate::BucketStore) adapter and are handed to the caller unchanged.
/// The `Invalid*` variants are raised while building a counter, limiter or store.
#[derive(Debug, thiserror::Error)]
pub enum RingrateError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store answered with a nil reply where a value was required.
    ///
    /// The bundled adapters never need it: absent fields read as `None` and deleting a
    /// missing key succeeds. It is there for third-party
    /// [`BucketStore`](crate::BucketStore) implementations whose backend signals a missing
    /// value as an error.
    #[error("store returned a nil reply")]
    NotFound,

    /// Any other failure reported by a store adapter.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid `period` / `interval` combination.
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    /// Invalid key prefix.
    #[error("invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    /// Invalid connection count for a pooled store client.
    #[error("invalid connection count: {0}")]
    InvalidConnectionCount(String),
}

impl RingrateError {
    /// Whether this error was produced by the store rather than by configuration.
    pub fn is_store_error(&self) -> bool {
        match self {
            #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
            Self::Redis(_) => true,
            Self::NotFound | Self::Store(_) => true,
            Self::InvalidWindow(_) | Self::InvalidKeyPrefix(_) | Self::InvalidConnectionCount(_) => {
                false
            }
        }
    }
}
