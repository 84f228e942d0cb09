//! # LedgerKey Testkit
//!
//! Test utilities for LedgerKey.
//!
//! This crate provides:
//! - Fixture entity families (Cluster, Tenant, HostNode, IsoCtry)
//! - Store and journal helpers with automatic cleanup
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust
//! use ledgerkey_testkit::prelude::*;
//!
//! let clusters = cluster_store();
//! let hosts = host_store(&clusters);
//! clusters.create(Cluster::new("clusterA")).unwrap();
//! let host = hosts.create(HostNode::new("clusterA", "nodeX")).unwrap();
//! assert!(host.revision().is_initial());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
