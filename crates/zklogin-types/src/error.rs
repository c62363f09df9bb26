/// Protocol-level zkLogin error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidInput(String),
    /// Identity token could not be decoded into the required claims.
    MalformedToken(String),
    NonceMismatch {
        expected: String,
        found: String,
    },
    /// No live ephemeral session in this context.
    SessionExpired,
    Storage(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::MalformedToken(msg) => write!(f, "malformed identity token: {msg}"),
            Self::NonceMismatch { expected, found } => {
                write!(f, "nonce mismatch: session={expected} token={found}")
            }
            Self::SessionExpired => write!(f, "no ephemeral session, restart login"),
            Self::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}
