//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (spawn worker, admission control)
//!     → request.rs (read header block, parse, rewrite)
//!     → handler.rs (cache lookup → origin forward → cache insert)
//!     → response.rs (canned error pages)
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{HandlerOutcome, RequestHandler};
pub use request::{ParsedRequest, ReadOutcome};
pub use response::ErrorPage;
pub use server::ProxyServer;
