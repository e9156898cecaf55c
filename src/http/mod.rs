//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing)
//!     → callback route ─────────────────────→ auth::Callback
//!     → everything else under the mount path
//!         → pipeline.rs: redirect.rs → auth::Authorize → proxy.rs
//!                                                         ├─ forward (hyper client)
//!                                                         └─ websocket.rs (raw tunnel)
//! ```

pub mod headers;
pub mod pipeline;
pub mod proxy;
pub mod redirect;
pub mod server;
pub mod websocket;

pub use pipeline::{Flow, Pipeline, Stage};
pub use server::HttpServer;
