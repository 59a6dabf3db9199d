pub mod args;
pub mod client;
pub mod config;
pub mod sessions;

pub use args::*;
pub use config::handle_config_command;
pub use sessions::{handle_sessions_command, handle_stop_command};
