// Main library module for the yuca server: the leader-aware request router
// and the pieces the binary composes at startup

pub mod api; // HTTP handlers
pub mod config; // Configuration loading
pub mod error; // Error handling and response mapping
pub mod model; // Shared application state
pub mod startup; // Logging, HTTP server, graceful shutdown

pub use error::ApiError;
pub use model::AppState;
