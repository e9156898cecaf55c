//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages, proxy, oauth client, tunnels:
//!     → tracing events (logging.rs installs the subscriber)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! Request ids are set and propagated by tower-http in the server layers,
//! so they appear on the TraceLayer span of every request.

pub mod logging;
pub mod metrics;
