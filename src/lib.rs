pub mod api;
pub mod app;
pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod global;
pub mod reasoning;
pub mod session;
pub mod transcript;
