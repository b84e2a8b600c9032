#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("resolution error at {lookup}: {reason}")]
    Resolution { lookup: String, reason: String },

    #[error("codec error: {reason}")]
    Codec { reason: String },

    #[error("write assembly error: {0}")]
    WriteAssembly(#[from] WriteAssemblyError),

    #[error("read error in {operation}: {reason}")]
    Read { operation: String, reason: String },

    #[error("chain client error: {reason}")]
    Client { reason: String },

    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteAssemblyError {
    #[error("required account {name} could not be resolved")]
    RequiredAccountUnresolved { name: String },

    #[error("instruction data is {len} bytes (limit {limit}) and no buffer method is configured")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("unknown method {program}.{method}")]
    UnknownMethod { program: String, method: String },

    #[error("token pool lookup table {table} is missing from the account list")]
    MissingTokenPool { table: String },

    #[error("account index {index} does not fit in u8")]
    IndexOutOfRange { index: usize },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution(lookup: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            lookup: lookup.into(),
            reason: reason.into(),
        }
    }

    /// Attach the lookup path to an error raised while resolving it. A failed fetch
    /// becomes a resolution error; codec errors keep their kind but gain the path.
    /// Errors that already carry a location pass through unchanged.
    pub(crate) fn at_lookup(self, lookup: &str) -> Self {
        match self {
            Self::Client { reason } => Self::Resolution {
                lookup: lookup.to_string(),
                reason,
            },
            Self::Codec { reason } if !reason.starts_with('[') => Self::Codec {
                reason: format!("[{lookup}] {reason}"),
            },
            other => other,
        }
    }
}
