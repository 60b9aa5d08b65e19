// Submodules
pub mod auth;
pub mod handlers;
pub mod routes;
pub mod runtime;
pub mod state;

// Public API (what main.rs imports)
pub use routes::create_router;
pub use runtime::{build_runtime, serve, Runtime};
pub use state::AppState;
