//! Analysis session lifecycle management
//!
//! `AnalysisManager` owns the session registry and drives the two-phase
//! workflow: spawn the agent for the initial analysis, parse clarifying
//! questions out of its output, then re-spawn it with the submitted
//! answers for the continuation phase. One reader task per live process
//! streams output into the session buffer and the output router; request
//! handlers never wait on process completion.

use crate::analysis::outputs::OutputRouter;
use crate::analysis::questions::{format_answers, parse_questions};
use crate::analysis::types::{
    AnalysisSession, AnalysisStatus, Answer, OutputEvent, SessionSnapshot,
};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::process::supervisor::{analysis_command, AgentProcess, OutputLines};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

/// Which phase of the workflow a reader task is finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderPhase {
    /// First run: parse questions from the buffered output on success
    Initial,
    /// Second run after answers: success means the workflow is complete
    Continuation,
}

struct SessionEntry {
    session: Arc<RwLock<AnalysisSession>>,
    status_tx: watch::Sender<AnalysisStatus>,
}

/// Owns session records, live process handles, and the output router
pub struct AnalysisManager {
    config: AgentConfig,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    processes: RwLock<HashMap<String, AgentProcess>>,
    outputs: Arc<OutputRouter>,
}

impl AnalysisManager {
    /// Create a new manager
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            processes: RwLock::new(HashMap::new()),
            outputs: Arc::new(OutputRouter::new()),
        }
    }

    /// The output router realtime transports register their subscribers on
    pub fn outputs(&self) -> &Arc<OutputRouter> {
        &self.outputs
    }

    /// Start a new analysis session.
    ///
    /// Creates the session record, spawns the agent for the first phase,
    /// and begins streaming its output in a background task. A spawn
    /// failure marks the session `Error` and returns the error without
    /// starting a reader.
    pub async fn start_analysis(
        self: &Arc<Self>,
        workspace_path: &str,
        feature_path: &str,
    ) -> Result<String> {
        let session_id = short_id();
        let workspace = PathBuf::from(workspace_path);

        let session = AnalysisSession::new(
            session_id.clone(),
            workspace.clone(),
            feature_path.to_string(),
        );
        let (status_tx, _) = watch::channel(AnalysisStatus::Starting);
        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                session: Arc::new(RwLock::new(session)),
                status_tx,
            },
        );

        tracing::info!(
            session_id = %session_id,
            workspace = %workspace.display(),
            feature = feature_path,
            "Starting analysis session"
        );

        let prompt = self.build_initial_prompt(&workspace, feature_path).await;
        let feature_file = workspace.join(feature_path).join("feature.md");
        let cmd = analysis_command(&self.config.binary, &workspace, &feature_file, &prompt);

        let (process, lines) = match cmd.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(session_id = %session_id, "Agent spawn failed: {}", e);
                self.set_status(&session_id, AnalysisStatus::Error).await;
                return Err(e);
            }
        };

        self.processes
            .write()
            .await
            .insert(session_id.clone(), process);
        self.set_status(&session_id, AnalysisStatus::Running).await;
        self.spawn_reader(session_id.clone(), lines, ReaderPhase::Initial);

        Ok(session_id)
    }

    /// Submit answers and start the continuation phase.
    ///
    /// Rejected with `SessionNotFound` for unknown ids and `InvalidState`
    /// unless the session is awaiting answers; neither rejection mutates
    /// the session.
    pub async fn submit_answers(
        self: &Arc<Self>,
        session_id: &str,
        answers: Vec<Answer>,
    ) -> Result<()> {
        let (workspace, feature_path, prompt) = {
            let sessions = self.sessions.read().await;
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

            let mut session = entry.session.write().await;
            if session.status != AnalysisStatus::AwaitingAnswers {
                return Err(Error::InvalidState {
                    expected: AnalysisStatus::AwaitingAnswers.as_str(),
                    actual: session.status.as_str(),
                });
            }

            session.answers = answers;
            session.status = AnalysisStatus::ProcessingAnswers;
            entry.status_tx.send_replace(AnalysisStatus::ProcessingAnswers);

            let answers_text = format_answers(&session.questions, &session.answers);
            (
                session.workspace_path.clone(),
                session.feature_path.clone(),
                continuation_prompt(&session.feature_path, &answers_text),
            )
        };

        tracing::info!(session_id = %session_id, "Answers submitted, starting continuation");

        let feature_file = workspace.join(&feature_path).join("feature.md");
        let cmd = analysis_command(&self.config.binary, &workspace, &feature_file, &prompt);

        match cmd.spawn() {
            Ok((process, lines)) => {
                self.processes
                    .write()
                    .await
                    .insert(session_id.to_string(), process);
                self.spawn_reader(session_id.to_string(), lines, ReaderPhase::Continuation);
                Ok(())
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, "Continuation spawn failed: {}", e);
                self.set_status(session_id, AnalysisStatus::Error).await;
                self.outputs
                    .dispatch(session_id, OutputEvent::Failed(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Cancel a session.
    ///
    /// Terminates the live process (polite signal, grace period, force
    /// kill), marks the session cancelled, and releases the process handle
    /// and subscriber association. Idempotent for an existing session.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        if !self.sessions.read().await.contains_key(session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let process = self.processes.write().await.remove(session_id);
        if let Some(process) = process {
            tracing::info!(session_id = %session_id, "Cancelling analysis, terminating agent");
            process
                .terminate(Duration::from_secs(self.config.grace_secs))
                .await;
        }

        self.set_status(session_id, AnalysisStatus::Cancelled).await;
        self.outputs.remove_subscriber(session_id).await;

        Ok(())
    }

    /// Snapshot of a session's current state
    pub async fn get_session(&self, session_id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(session_id)?;
        let session = entry.session.read().await;
        Some(SessionSnapshot {
            session_id: session.id.clone(),
            status: session.status,
            questions: session.questions.clone(),
            answers: session.answers.clone(),
            output_buffer: session.output_buffer.clone(),
        })
    }

    /// Watch a session's status; fires on every transition. The realtime
    /// transport awaits this alongside inbound messages to notice terminal
    /// states set by background work.
    pub async fn watch_status(&self, session_id: &str) -> Option<watch::Receiver<AnalysisStatus>> {
        let sessions = self.sessions.read().await;
        Some(sessions.get(session_id)?.status_tx.subscribe())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Build the first-phase prompt, embedding the command template file
    /// content when present. A missing template is tolerated.
    async fn build_initial_prompt(&self, workspace: &Path, feature_path: &str) -> String {
        let template_path = workspace.join(&self.config.command_template);
        let command_content = match tokio::fs::read_to_string(&template_path).await {
            Ok(content) => content,
            Err(_) => {
                tracing::debug!(
                    path = %template_path.display(),
                    "No command template found, using bare prompt"
                );
                String::new()
            }
        };

        format!(
            "Analyze the feature specification in @{}/feature.md using the \
             analyze-feature-spec workflow.\n\n{}\n",
            feature_path, command_content
        )
    }

    fn spawn_reader(self: &Arc<Self>, session_id: String, lines: OutputLines, phase: ReaderPhase) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.read_to_completion(&session_id, lines, phase).await;
        });
    }

    /// Stream process output to the buffer and the current subscriber,
    /// then settle the session according to the exit code. Never panics
    /// the server; all failures become a status change plus a `Failed`
    /// event.
    async fn read_to_completion(&self, session_id: &str, mut lines: OutputLines, phase: ReaderPhase) {
        while let Some(line) = lines.next_line().await {
            {
                let sessions = self.sessions.read().await;
                if let Some(entry) = sessions.get(session_id) {
                    entry.session.write().await.output_buffer.push_str(&line);
                }
            }
            self.outputs
                .dispatch(session_id, OutputEvent::Chunk(line))
                .await;
        }

        // Pipes closed; reap the child unless cancellation already took it
        let process = self.processes.write().await.remove(session_id);
        let Some(mut process) = process else {
            tracing::debug!(session_id, "Process handle already released, reader exiting");
            return;
        };

        match process.wait().await {
            Ok(code) => self.finish_phase(session_id, phase, code).await,
            Err(e) => {
                let message = Error::Stream(e.to_string()).to_string();
                tracing::error!(session_id, "Failed to reap agent process: {}", e);
                if self.transition(session_id, AnalysisStatus::Error).await {
                    self.outputs
                        .dispatch(session_id, OutputEvent::Failed(message))
                        .await;
                    self.notify_status(session_id, AnalysisStatus::Error).await;
                }
            }
        }
    }

    async fn finish_phase(&self, session_id: &str, phase: ReaderPhase, code: i32) {
        if code != 0 {
            let message = Error::AgentProcess(code).to_string();
            tracing::warn!(session_id, code, "Agent process failed");
            if self.transition(session_id, AnalysisStatus::Error).await {
                self.outputs
                    .dispatch(session_id, OutputEvent::Failed(message))
                    .await;
                self.notify_status(session_id, AnalysisStatus::Error).await;
            }
            return;
        }

        match phase {
            ReaderPhase::Initial => {
                let questions = {
                    let sessions = self.sessions.read().await;
                    match sessions.get(session_id) {
                        Some(entry) => {
                            let buffer = entry.session.read().await.output_buffer.clone();
                            parse_questions(&buffer)
                        }
                        None => return,
                    }
                };

                if questions.is_empty() {
                    tracing::info!(session_id, "Analysis complete, no questions");
                    if self.transition(session_id, AnalysisStatus::Complete).await {
                        self.outputs.dispatch(session_id, OutputEvent::Completed).await;
                        self.notify_status(session_id, AnalysisStatus::Complete).await;
                    }
                } else {
                    let count = questions.len();
                    tracing::info!(session_id, count, "Analysis produced questions");
                    {
                        let sessions = self.sessions.read().await;
                        if let Some(entry) = sessions.get(session_id) {
                            entry.session.write().await.questions = questions;
                        }
                    }
                    if self
                        .transition(session_id, AnalysisStatus::AwaitingAnswers)
                        .await
                    {
                        self.outputs
                            .dispatch(session_id, OutputEvent::QuestionsReady(count))
                            .await;
                        self.notify_status(session_id, AnalysisStatus::AwaitingAnswers)
                            .await;
                    }
                }
            }
            ReaderPhase::Continuation => {
                tracing::info!(session_id, "Continuation complete");
                if self.transition(session_id, AnalysisStatus::Complete).await {
                    self.outputs.dispatch(session_id, OutputEvent::Completed).await;
                    self.notify_status(session_id, AnalysisStatus::Complete).await;
                }
            }
        }
    }

    /// Update the stored status unless the session is already terminal.
    /// Returns whether the transition happened. The status watch is
    /// notified separately so completion events reach the subscriber
    /// before the transport sees the terminal status.
    async fn transition(&self, session_id: &str, status: AnalysisStatus) -> bool {
        let sessions = self.sessions.read().await;
        let Some(entry) = sessions.get(session_id) else {
            return false;
        };
        let mut session = entry.session.write().await;
        if session.status.is_terminal() {
            tracing::debug!(
                session_id,
                current = %session.status,
                requested = %status,
                "Ignoring transition on terminal session"
            );
            return false;
        }
        session.status = status;
        true
    }

    async fn notify_status(&self, session_id: &str, status: AnalysisStatus) {
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(session_id) {
            entry.status_tx.send_replace(status);
        }
    }

    /// Transition and notify in one step, for changes with no companion
    /// output event
    async fn set_status(&self, session_id: &str, status: AnalysisStatus) {
        if self.transition(session_id, status).await {
            self.notify_status(session_id, status).await;
        }
    }
}

/// Prompt for the continuation phase, embedding the formatted answers
fn continuation_prompt(feature_path: &str, answers_text: &str) -> String {
    format!(
        "Continue analyzing the feature specification. The user has provided \
         the following answers to the clarifying questions:\n\n{}\n\nNow:\n\
         1. Update the feature.md with a refined specification based on these answers\n\
         2. Create an implementation-plan.md with a detailed implementation blueprint\n\n\
         Save both files to the feature folder at {}/\n",
        answers_text, feature_path
    )
}

/// Short opaque session id (first 8 hex chars of a UUIDv4)
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Write an executable fake agent script into the workspace.
    ///
    /// The script ignores the real CLI arguments and waits for a `go` flag
    /// file before producing output, so tests can attach subscribers
    /// without racing the process.
    fn fake_agent(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-agent");
        let script = format!(
            "#!/bin/sh\nwhile [ ! -f \"{}/go\" ]; do sleep 0.05; done\n{}\n",
            dir.display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn release_agent(dir: &Path) {
        std::fs::write(dir.join("go"), b"").unwrap();
    }

    fn manager_for(binary: String) -> Arc<AnalysisManager> {
        Arc::new(AnalysisManager::new(AgentConfig {
            binary,
            ..AgentConfig::default()
        }))
    }

    async fn wait_for_status(
        manager: &Arc<AnalysisManager>,
        session_id: &str,
        wanted: AnalysisStatus,
    ) {
        let mut rx = manager.watch_status(session_id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if *rx.borrow_and_update() == wanted {
                    return;
                }
                if rx.changed().await.is_err() {
                    panic!("status watch closed before reaching {:?}", wanted);
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", wanted));
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutputEvent>) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_analysis_with_questions() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(
            dir.path(),
            "echo '1. **Which database?**'\necho '   We could use sqlite or postgres.'",
        );
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/db")
            .await
            .unwrap();
        assert_eq!(
            manager.get_session(&session_id).await.unwrap().status,
            AnalysisStatus::Running
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.outputs().set_subscriber(&session_id, tx).await;
        release_agent(dir.path());

        wait_for_status(&manager, &session_id, AnalysisStatus::AwaitingAnswers).await;

        let snapshot = manager.get_session(&session_id).await.unwrap();
        assert_eq!(snapshot.questions.len(), 1);
        assert_eq!(snapshot.questions[0].id, 1);
        assert_eq!(snapshot.questions[0].title, "Which database?");
        assert_eq!(
            snapshot.questions[0].context.as_deref(),
            Some("We could use sqlite or postgres.")
        );
        assert!(snapshot.output_buffer.contains("1. **Which database?**"));

        let events = drain(&mut rx);
        assert!(events.contains(&OutputEvent::QuestionsReady(1)));
        assert!(events
            .iter()
            .any(|e| matches!(e, OutputEvent::Chunk(text) if text.contains("Which database?"))));
    }

    #[tokio::test]
    async fn test_analysis_without_questions_completes() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(dir.path(), "echo 'All clear, nothing to ask.'");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/simple")
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.outputs().set_subscriber(&session_id, tx).await;
        release_agent(dir.path());

        wait_for_status(&manager, &session_id, AnalysisStatus::Complete).await;

        let snapshot = manager.get_session(&session_id).await.unwrap();
        assert!(snapshot.questions.is_empty());
        assert!(drain(&mut rx).contains(&OutputEvent::Completed));
    }

    #[tokio::test]
    async fn test_nonzero_exit_sets_error() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(dir.path(), "exit 137");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/broken")
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.outputs().set_subscriber(&session_id, tx).await;
        release_agent(dir.path());

        wait_for_status(&manager, &session_id, AnalysisStatus::Error).await;

        let events = drain(&mut rx);
        assert!(events.contains(&OutputEvent::Failed(
            "Process exited with code 137".to_string()
        )));
    }

    #[tokio::test]
    async fn test_missing_executable_fails_synchronously() {
        let dir = TempDir::new().unwrap();
        let manager = manager_for("no-such-agent-binary-xyz".to_string());

        let result = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/x")
            .await;
        let session_id = match result {
            Err(Error::AgentNotFound) => {
                // The session record exists and is marked errored
                let sessions = manager.sessions.read().await;
                sessions.keys().next().unwrap().clone()
            }
            other => panic!("expected AgentNotFound, got {:?}", other),
        };

        let snapshot = manager.get_session(&session_id).await.unwrap();
        assert_eq!(snapshot.status, AnalysisStatus::Error);
        assert!(snapshot.output_buffer.is_empty());
        assert!(manager.processes.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_answers_requires_awaiting_state() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(dir.path(), "echo done");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/x")
            .await
            .unwrap();

        // Still running: the fake agent is blocked on the go file
        let result = manager.submit_answers(&session_id, Vec::new()).await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
        assert_eq!(
            manager.get_session(&session_id).await.unwrap().status,
            AnalysisStatus::Running
        );

        manager.cancel(&session_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_answers_unknown_session() {
        let manager = manager_for("true".to_string());
        let result = manager.submit_answers("nope", Vec::new()).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_full_two_phase_workflow() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(dir.path(), "echo '1. **Proceed?**'");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/x")
            .await
            .unwrap();
        release_agent(dir.path());
        wait_for_status(&manager, &session_id, AnalysisStatus::AwaitingAnswers).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.outputs().set_subscriber(&session_id, tx).await;

        manager
            .submit_answers(
                &session_id,
                vec![Answer {
                    question_id: 1,
                    answer: "yes".to_string(),
                }],
            )
            .await
            .unwrap();

        wait_for_status(&manager, &session_id, AnalysisStatus::Complete).await;

        let snapshot = manager.get_session(&session_id).await.unwrap();
        assert_eq!(snapshot.answers.len(), 1);
        assert!(drain(&mut rx).contains(&OutputEvent::Completed));
        // Continuation does not re-parse questions
        assert_eq!(snapshot.questions.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_session() {
        let manager = manager_for("true".to_string());
        assert!(matches!(
            manager.cancel("missing").await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let dir = TempDir::new().unwrap();
        // Blocks forever on the go file; cancel must terminate it
        let binary = fake_agent(dir.path(), "echo never");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/x")
            .await
            .unwrap();

        manager.cancel(&session_id).await.unwrap();
        assert_eq!(
            manager.get_session(&session_id).await.unwrap().status,
            AnalysisStatus::Cancelled
        );

        manager.cancel(&session_id).await.unwrap();
        assert_eq!(
            manager.get_session(&session_id).await.unwrap().status,
            AnalysisStatus::Cancelled
        );

        assert!(manager.processes.read().await.is_empty());
        assert!(!manager.outputs().has_subscriber(&session_id).await);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_keeps_terminal_status() {
        let dir = TempDir::new().unwrap();
        let binary = fake_agent(dir.path(), "echo fine");
        let manager = manager_for(binary);

        let session_id = manager
            .start_analysis(&dir.path().to_string_lossy(), "features/x")
            .await
            .unwrap();
        release_agent(dir.path());
        wait_for_status(&manager, &session_id, AnalysisStatus::Complete).await;

        manager.cancel(&session_id).await.unwrap();
        assert_eq!(
            manager.get_session(&session_id).await.unwrap().status,
            AnalysisStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_initial_prompt_embeds_template() {
        let dir = TempDir::new().unwrap();
        let template_dir = dir.path().join(".cursor/commands");
        std::fs::create_dir_all(&template_dir).unwrap();
        std::fs::write(
            template_dir.join("analyze-feature-spec.md"),
            "TEMPLATE BODY",
        )
        .unwrap();

        let manager = manager_for("true".to_string());
        let prompt = manager
            .build_initial_prompt(dir.path(), "features/login")
            .await;
        assert!(prompt.contains("@features/login/feature.md"));
        assert!(prompt.contains("TEMPLATE BODY"));
    }

    #[tokio::test]
    async fn test_initial_prompt_tolerates_missing_template() {
        let dir = TempDir::new().unwrap();
        let manager = manager_for("true".to_string());
        let prompt = manager.build_initial_prompt(dir.path(), "features/x").await;
        assert!(prompt.contains("@features/x/feature.md"));
    }

    #[test]
    fn test_continuation_prompt_mentions_artifacts() {
        let prompt = continuation_prompt("features/x", "### 1. Q?\n\nyes\n");
        assert!(prompt.contains("### 1. Q?"));
        assert!(prompt.contains("feature.md"));
        assert!(prompt.contains("implementation-plan.md"));
        assert!(prompt.contains("features/x/"));
    }

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(short_id(), short_id());
    }
}
