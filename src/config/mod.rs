//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! compiled-in defaults
//!     → optional TOML file (loader.rs, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI port override
//!     → ProxyConfig (validated, immutable)
//!     → shared with the server at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CacheConfig, ForwardingConfig, ListenerConfig, ObservabilityConfig, ProxyConfig};
