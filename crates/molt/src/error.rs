use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A document key or body that does not follow the typed-identifier
    /// grammar. Always fatal: no statements are synthesized from a
    /// partially understood document.
    #[error("bad object entry '{key}': {reason}")]
    Format { key: String, reason: String },

    #[error("duplicate {kind} key: {key}")]
    DuplicateKey { kind: &'static str, key: String },

    /// The primary catalog fetch for a kind failed. Auxiliary fetches are
    /// absorbed with a rollback and never produce this.
    #[error("catalog read failed for {kind}: {reason}")]
    CatalogRead { kind: &'static str, reason: String },

    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
