//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, address reuse, backlog)
//!     → connection.rs (connection id, worker tracking)
//!     → admission.rs (worker waits for a processing slot)
//!     → Hand off to HTTP layer
//!
//! Cache miss:
//!     → upstream.rs (resolve + connect to origin)
//! ```
//!
//! # Design Decisions
//! - Each worker owns its accepted socket outright
//! - Backpressure lives in admission control, not in the accept loop

pub mod admission;
pub mod connection;
pub mod listener;
pub mod upstream;

pub use admission::{AdmissionControl, AdmissionPermit};
pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use upstream::{ConnectError, RemoteConnector};
