//! API route modules.

pub mod references;
pub mod sessions;
