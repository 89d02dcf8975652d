//! Job submission and process supervision.

mod manager;
mod supervisor;

pub use manager::TranscodeManager;
pub use supervisor::{ProcessSupervisor, TranscodeSpec};
