//! Encodeforge - transcoding job orchestration with progress fan-out
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod fanout;
pub mod server;
pub mod state;
pub mod transcode;
