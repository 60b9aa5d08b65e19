//! Sessions, their transfer state, and the store that owns them.

pub mod context;
pub mod entry;
pub mod registry;
pub mod state;
pub mod sweeper;

pub use context::{Operation, TransferContext};
pub use entry::{now_millis, Session};
pub use registry::{RemovalReason, SessionRegistry};
pub use state::UploadState;
pub use sweeper::ExpirationSweeper;
