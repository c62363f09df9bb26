//! Client-side zkLogin auth: ephemeral session lifecycle, durable salts,
//! identity-provider redirect and nonce validation, all over an injected
//! compare-and-set blob store.

mod callback;
mod redirect;
pub mod salt;
pub mod session;
mod store;

pub use callback::{check_nonce, validate_callback, ValidatedLogin};
pub use redirect::{authorization_url, token_from_redirect};
pub use salt::SaltManager;
pub use session::{EphemeralSession, SessionManager, DEFAULT_EPOCH_LOOKAHEAD, SESSION_KEY};
pub use store::{BlobStore, CasOutcome, MemoryStore};
