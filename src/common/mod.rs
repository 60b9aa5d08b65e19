pub mod config;
pub mod config_commands;
pub mod errors;

pub use config::AppConfig;
pub use errors::AppError;
