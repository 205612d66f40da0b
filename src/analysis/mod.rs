//! Analysis module — agent session orchestration and realtime streaming
//!
//! Coordinates long-running CLI analysis agents per session and streams
//! their output to WebSocket clients:
//!
//! ```text
//! Browser ←→ WS (JSON) ←→ analysis module ←→ pipes ←→ agent CLI process
//!            /api/analyze/   ├ manager              (per phase)
//!            ws/:id          ├ outputs
//!                            ├ questions
//!                            └ handler
//! ```

pub mod handler;
pub mod manager;
pub mod outputs;
pub mod questions;
pub mod types;

pub use handler::{analysis_router, AnalysisState};
pub use manager::AnalysisManager;
pub use outputs::OutputRouter;
pub use types::{AnalysisStatus, Answer, Question};
