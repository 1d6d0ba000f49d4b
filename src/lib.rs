use std::sync::OnceLock;

pub mod chunks;
pub mod cipher;
pub mod codec;
pub mod commands;
pub mod error;
pub mod exe;
pub mod game;
pub mod stream;

/// Application-level verbosity
pub static VERBOSE: OnceLock<bool> = OnceLock::new();
