//! Connector Manager - ad-platform extract-and-load connectors.
//!
//! Each vendor adapter implements the [`Connector`] trait. The pipeline that
//! drives them is written once: paginate, normalize, export idempotently.
//!
//! # Architecture
//!
//! ```text
//! POST /run/:connector
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       ConnectorManager                   │
//! │  - Validate job parameters               │
//! │  - Resolve credentials (inline/secret)   │
//! │  - One account at a time                 │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Connector (implements trait)       │
//! │  - Authenticate                          │
//! │  - Build the vendor request              │
//! │  - Fetch pages or run a report job       │
//! └─────────────────────────────────────────┘
//!          ↓
//!   Paginator → Normalizer → IdempotentLoader
//! ```
//!
//! # Core Types
//!
//! - [`Connector`] - Trait every vendor adapter implements
//! - [`ConnectorManager`] - Runs a job across accounts and report types
//! - [`Paginator`] - Drives a connector until its result set is exhausted
//! - [`RunParams`] - Typed view of the job payload

pub mod api;
pub mod connector;
pub mod connectors;
pub mod manager;
pub mod paginator;
pub mod registry;
pub mod request;
pub mod types;

// Re-export public types
pub use connector::Connector;
pub use manager::{ConnectorManager, RunError, RunResponse};
pub use paginator::{Paginator, ReportWait};
pub use request::RunParams;
pub use types::{Credentials, FetchStyle, Page, ReportJob, ReportStatus, Session};
