//! Versioned credential storage and the token refresher built on it.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  SecretRefresher            │  read latest → refresh at vendor → update
//! └─────────────────────────────┘
//!          ↓            ↑
//! ┌─────────────────────────────┐
//! │  SecretStore                │  versions, add-then-destroy updates
//! └─────────────────────────────┘
//!          ↓            ↑
//! ┌─────────────────────────────┐
//! │  AES-256-GCM + SQLite       │
//! └─────────────────────────────┘
//! ```
//!
//! Payloads are arbitrary JSON objects (a Meta app token bundle, a Google
//! authorized-user file, vendor API keys). They are encrypted at rest with a
//! unique nonce per version.

mod encryption;
mod refresh;
mod store;

pub use encryption::{Cipher, Sealed};
pub use refresh::{
    Platform, RefreshError, RefreshOutcome, RefreshRequest, RefreshState, SecretRefresher,
    META_GRAPH_URL,
};
pub use store::{SecretStore, SecretVersion, VersionInfo, VersionState};
