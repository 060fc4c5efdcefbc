//! Configuration module for xpuprobe
//!
//! Provides CLI arguments and the device selection knobs read from the
//! environment.

mod settings;

pub use settings::*;
