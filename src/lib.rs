//! Workbench — agent-assisted feature analysis server
//!
//! Workbench supervises long-running CLI analysis agents on behalf of web
//! clients. A client starts an analysis session over REST, attaches a
//! WebSocket for live output, answers the clarifying questions the agent
//! produces, and receives the refined specification artifacts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Workbench Server                        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  axum API (api)                        │  │
//! │  │   REST /api/analyze/*     WS /api/analyze/ws/:id       │  │
//! │  └─────────────┬──────────────────────┬───────────────────┘  │
//! │                │                      │                      │
//! │  ┌─────────────▼──────────┐  ┌────────▼───────────────────┐  │
//! │  │  AnalysisManager       │  │  OutputRouter              │  │
//! │  │  - session registry    │──▶  - per-session subscriber  │  │
//! │  │  - state machine       │  │  - resolved at dispatch    │  │
//! │  │  - question parsing    │  └────────────────────────────┘  │
//! │  └─────────────┬──────────┘                                  │
//! │                │ spawn / terminate                           │
//! │  ┌─────────────▼──────────┐                                  │
//! │  │  Process supervisor    │                                  │
//! │  │  - merged output lines │                                  │
//! │  │  - graceful shutdown   │                                  │
//! │  └─────────────┬──────────┘                                  │
//! └────────────────┼─────────────────────────────────────────────┘
//!                  │ pipes
//!          agent CLI process (one per phase)
//! ```
//!
//! ## Modules
//!
//! - [`analysis`]: session state machine, output routing, question parsing
//! - [`process`]: agent process supervision
//! - [`tickets`]: feature-markdown to issue tracker glue
//! - [`api`]: unified HTTP router
//! - [`config`]: configuration management

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod process;
pub mod tickets;

pub use config::WorkbenchConfig;
pub use error::{Error, Result};
