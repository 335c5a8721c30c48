//! adsync - shared pieces of the ad-platform extract-and-load connectors.
//!
//! ```text
//! vendor pages ──► Normalizer ──► IdempotentLoader ──► Warehouse
//!                                  (delete window, append; one transaction)
//!
//! SecretStore ◄──► SecretRefresher ◄── POST /refresh
//! ```
//!
//! The vendor adapters and the run trigger live in the `connector-manager`
//! crate and build on the types exported here.

// Window, account scope, request and row types
pub mod model;

// Fetch error taxonomy and retry policy
pub mod error;
pub mod retry;

// Row shaping and loading
pub mod loader;
pub mod normalize;
pub mod warehouse;

// Credentials
pub mod oauth;
pub mod secrets;

// Configuration and the refresher HTTP API
pub mod api;
pub mod config;

pub use error::{ErrorKind, FetchError};
pub use loader::IdempotentLoader;
pub use model::{AccountScope, FetchWindow, LoadBatch, ReportRequest, Row, ValidationError, WriteMode};
pub use normalize::Normalizer;
pub use retry::RetryPolicy;
