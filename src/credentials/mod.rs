//! Encrypted storage of per-user access credentials.
//!
//! A credential is keyed by the *external* service user ID rather than the
//! maze ID: one external account may be linked to any number of mazes. The
//! maze carries only a weak reference (the external user ID) in its service
//! settings. Tokens are AES-256-GCM encrypted at rest in SQLite.

mod encryption;
mod storage;

pub use encryption::{decrypt, encrypt, generate_key_base64, validate_key};
pub use storage::CredentialStore;

use crate::services::{ServiceCredential, ServiceKind};

/// A stored credential row for one `(service, external user)` pair.
///
/// Invariant: at most one row per pair; `upsert` overwrites token fields.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccess {
    pub service: ServiceKind,
    pub user_id: String,
    pub credential: ServiceCredential,
}
