//! Session-scoped chunked file transfer server.

pub mod collab;
pub mod common;
pub mod server;
pub mod session;
pub mod transfer;
