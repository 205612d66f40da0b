//! Tickets module — feature-markdown to issue tracker glue
//!
//! Parses a feature specification document (title, overview, success
//! criteria, functional requirement checkboxes) and creates a tracker
//! story plus optional subtasks by shelling out to the tracker CLI.
//! Pure call-and-parse: the CLI's output is scanned for an issue key.

pub mod creator;
pub mod handler;

pub use creator::TicketCreator;
pub use handler::{tickets_router, TicketsState};

use serde::{Deserialize, Serialize};

/// Request body for creating a ticket from feature content
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    /// Raw markdown content of the feature document
    pub feature_content: String,
    /// Relative path of the feature document, echoed for the caller
    pub feature_path: String,
    /// Tracker project key (e.g. "AWB")
    pub project_key: String,
    /// Whether to create subtasks from functional requirements
    #[serde(default = "default_create_subtasks")]
    pub create_subtasks: bool,
    /// Issue type for subtasks
    #[serde(default = "default_subtask_type")]
    pub subtask_type: String,
}

fn default_create_subtasks() -> bool {
    true
}

fn default_subtask_type() -> String {
    "Sub-task".to_string()
}

/// Result of creating the parent story
#[derive(Debug, Clone, Serialize)]
pub struct StoryResult {
    pub key: String,
    pub summary: String,
    pub url: String,
}

/// Result of creating a single subtask
#[derive(Debug, Clone, Serialize)]
pub struct SubtaskResult {
    pub key: Option<String>,
    pub summary: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Response from creating a ticket
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateTicketResponse {
    pub success: bool,
    pub story: Option<StoryResult>,
    pub subtasks: Vec<SubtaskResult>,
    pub jira_link_markdown: Option<String>,
    pub error: Option<String>,
    pub error_type: Option<String>,
}
