//! # hubkv
//!
//! An in-memory replicated coordination hub:
//! - Single canonical key-value namespace, mirrored to registered nodes
//! - Asynchronous write propagation via a FIFO queue and a single reconciler
//! - Live change feed over WebSocket/SSE for observers
//! - Eventually consistent, last-writer-wins, best-effort by design
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Hub                         │
//! │  ┌───────────┐  ┌──────────────────┐        │
//! │  │ Canonical │→ │ Propagation queue │        │
//! │  │  store    │  └────────┬─────────┘        │
//! │  └───────────┘           │ drain (timer or   │
//! │  ┌───────────┐           ▼  trigger_sync)    │
//! │  │ Node      │  ┌──────────────────┐        │
//! │  │ registry  │← │   Reconciler     │        │
//! │  └───────────┘  └──────────────────┘        │
//! │  ┌──────────────────────────────────┐       │
//! │  │ Event bus → ws/sse subscribers   │       │
//! │  └──────────────────────────────────┘       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the hub
//! ```bash
//! hubkv-server serve --bind 0.0.0.0:7400 --sync-interval 5s
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Register a node
//! hubkv register-node cache-1 --category cache
//!
//! # Write a key (propagated to all other nodes on the next sync)
//! hubkv put greeting '"hi"' --origin cache-1
//!
//! # Read it back
//! hubkv get greeting
//!
//! # Force a reconciliation pass
//! hubkv sync
//!
//! # Inspect the hub
//! hubkv stats
//! ```

pub mod common;
pub mod hub;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use hub::{Hub, HubServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
