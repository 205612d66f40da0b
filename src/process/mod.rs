//! External process supervision
//!
//! Spawns agent CLI processes, exposes their merged stdout/stderr as a
//! line stream, and supports polite-then-forceful termination.

pub mod supervisor;

pub use supervisor::{AgentCommand, AgentProcess, OutputLines};
