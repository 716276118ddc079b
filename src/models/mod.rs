//! Domain model modules.

pub mod port;
pub mod session;
