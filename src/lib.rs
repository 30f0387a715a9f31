//! Pub/Sub Client - Main Library
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config path, logging)
//! - **pubsockets**: Pub/sub protocol engine (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use pubsub_client::bin_common::{init_tracing_with_level, load_config_from_env, ConfigType};
//! use pubsub_client::pubsockets::ClientSettings;
//! ```

// Re-export workspace libraries for convenience
pub use pubsockets;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, take_config_arg, ConfigType};
    pub use logging::init_tracing_with_level;
}
