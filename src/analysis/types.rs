//! Analysis session types and wire models
//!
//! Defines the session state machine, the parsed question/answer types,
//! the tagged output events routed to realtime subscribers, and the JSON
//! message types exchanged with HTTP and WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Session state
// =============================================================================

/// Status of an analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Session created, agent not running yet
    Starting,
    /// First analysis phase in progress
    Running,
    /// Analysis produced clarifying questions; waiting for answers
    AwaitingAnswers,
    /// Second phase in progress after answers were submitted
    ProcessingAnswers,
    /// Workflow finished successfully
    Complete,
    /// Agent failed or its output could not be read
    Error,
    /// Session cancelled by a client
    Cancelled,
}

impl AnalysisStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Wire representation (snake_case)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::AwaitingAnswers => "awaiting_answers",
            Self::ProcessingAnswers => "processing_answers",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clarifying question parsed from agent output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Numeric id as printed by the agent (not guaranteed contiguous)
    pub id: u32,
    /// Short question title
    pub title: String,
    /// Optional free-text context, length-capped at parse time
    pub context: Option<String>,
}

/// An answer to a clarifying question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Id of the question this answers
    pub question_id: u32,
    /// Answer text
    pub answer: String,
}

/// In-memory session record.
///
/// Owned by the session manager; mutated only by the manager and the
/// reader task acting on its behalf. Not persisted.
#[derive(Debug)]
pub struct AnalysisSession {
    /// Opaque unique session id
    pub id: String,
    /// Workspace root the agent runs in
    pub workspace_path: PathBuf,
    /// Feature folder, relative to the workspace root
    pub feature_path: String,
    /// Current status
    pub status: AnalysisStatus,
    /// Questions parsed from the first analysis phase
    pub questions: Vec<Question>,
    /// Answers submitted by the client
    pub answers: Vec<Answer>,
    /// Accumulated agent output, in emission order
    pub output_buffer: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AnalysisSession {
    /// Create a new session in `Starting` state
    pub fn new(id: String, workspace_path: PathBuf, feature_path: String) -> Self {
        Self {
            id,
            workspace_path,
            feature_path,
            status: AnalysisStatus::Starting,
            questions: Vec::new(),
            answers: Vec::new(),
            output_buffer: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Read-only snapshot of a session, safe to hand to callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: AnalysisStatus,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub output_buffer: String,
}

// =============================================================================
// Output events
// =============================================================================

/// Tagged event routed from the session manager to the realtime subscriber.
///
/// Control events travel as typed variants, never as marker strings mixed
/// into the output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// One line of raw agent output (trailing newline preserved)
    Chunk(String),
    /// First phase finished and produced this many questions
    QuestionsReady(usize),
    /// Workflow finished successfully
    Completed,
    /// Agent failed; carries a human-readable message
    Failed(String),
}

// =============================================================================
// REST wire types
// =============================================================================

/// Request body for starting a feature analysis
#[derive(Debug, Clone, Deserialize)]
pub struct StartAnalysisRequest {
    /// Full path to the workspace root
    pub workspace_path: String,
    /// Relative path to the feature folder
    pub feature_path: String,
}

/// Response from starting an analysis session
#[derive(Debug, Clone, Serialize)]
pub struct StartAnalysisResponse {
    pub session_id: String,
    pub status: AnalysisStatus,
    pub websocket_url: String,
}

/// Request body for submitting answers to questions
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswersRequest {
    pub answers: Vec<Answer>,
}

// =============================================================================
// Realtime wire types
// =============================================================================

/// Message sent to realtime clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Raw agent output
    Output { content: String },
    /// Clarifying questions are ready
    Questions { items: Vec<Question> },
    /// Workflow finished; lists the artifact filenames the agent writes
    Complete { files: Vec<String> },
    /// Agent failure
    Error { message: String },
    /// Cancellation confirmed
    Cancelled,
}

/// Message received from realtime clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Cancel the session this connection is attached to
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AnalysisStatus::AwaitingAnswers).unwrap();
        assert_eq!(json, "\"awaiting_answers\"");
        let parsed: AnalysisStatus = serde_json::from_str("\"processing_answers\"").unwrap();
        assert_eq!(parsed, AnalysisStatus::ProcessingAnswers);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AnalysisStatus::Complete.is_terminal());
        assert!(AnalysisStatus::Error.is_terminal());
        assert!(AnalysisStatus::Cancelled.is_terminal());
        assert!(!AnalysisStatus::Starting.is_terminal());
        assert!(!AnalysisStatus::Running.is_terminal());
        assert!(!AnalysisStatus::AwaitingAnswers.is_terminal());
        assert!(!AnalysisStatus::ProcessingAnswers.is_terminal());
    }

    #[test]
    fn test_server_message_shapes() {
        let msg = ServerMessage::Output {
            content: "hello\n".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["content"], "hello\n");

        let msg = ServerMessage::Questions {
            items: vec![Question {
                id: 1,
                title: "Which database?".to_string(),
                context: None,
            }],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "questions");
        assert_eq!(json["items"][0]["id"], 1);
        assert!(json["items"][0]["context"].is_null());

        let msg = ServerMessage::Cancelled;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cancelled");
    }

    #[test]
    fn test_client_message_cancel() {
        let msg: ClientMessage = serde_json::from_str(r#"{"action":"cancel"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Cancel));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"unknown"}"#).is_err());
    }

    #[test]
    fn test_new_session_defaults() {
        let session = AnalysisSession::new(
            "abc12345".to_string(),
            PathBuf::from("/work"),
            "features/login".to_string(),
        );
        assert_eq!(session.status, AnalysisStatus::Starting);
        assert!(session.questions.is_empty());
        assert!(session.answers.is_empty());
        assert!(session.output_buffer.is_empty());
    }
}
