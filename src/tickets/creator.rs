//! Ticket creation via the tracker CLI
//!
//! Runs `<binary> jira workitem create ... --json` per issue and extracts
//! the created issue key from its output. Subtask failures are collected
//! per requirement rather than aborting the batch.

use crate::config::TicketsConfig;
use crate::error::{Error, Result};
use crate::tickets::{CreateTicketRequest, CreateTicketResponse, StoryResult, SubtaskResult};
use regex::Regex;
use std::sync::OnceLock;
use tokio::process::Command;

/// Issue keys look like `AWB-123`
fn issue_key_re() -> &'static Regex {
    static ISSUE_KEY_RE: OnceLock<Regex> = OnceLock::new();
    ISSUE_KEY_RE.get_or_init(|| Regex::new(r"([A-Z]+-\d+)").unwrap())
}

/// Matches `- [ ] FR-n: ...` functional requirement lines
fn requirement_re() -> &'static Regex {
    static REQUIREMENT_RE: OnceLock<Regex> = OnceLock::new();
    REQUIREMENT_RE.get_or_init(|| Regex::new(r"(?m)-\s*\[\s*\]\s*(FR-\d+:\s*.+)$").unwrap())
}

/// Creates tracker issues from feature markdown
pub struct TicketCreator {
    config: TicketsConfig,
}

impl TicketCreator {
    /// Create a new ticket creator
    pub fn new(config: TicketsConfig) -> Self {
        Self { config }
    }

    /// Create a story (and optionally subtasks) from feature content.
    ///
    /// Never returns an error: failures are reported in the response so
    /// the client always receives a structured payload.
    pub async fn create_ticket(&self, request: CreateTicketRequest) -> CreateTicketResponse {
        let title = extract_title(&request.feature_content);
        let overview = extract_section(&request.feature_content, "Overview");
        let success_criteria = extract_section(&request.feature_content, "Success Criteria");
        let requirements = extract_functional_requirements(&request.feature_content);
        let description = build_description(&overview, &success_criteria);

        let story_key = match self
            .create_issue(&request.project_key, "Story", &title, &description, None)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Story creation failed: {}", e);
                return CreateTicketResponse {
                    success: false,
                    error: Some(e.to_string()),
                    error_type: Some("jira_error".to_string()),
                    ..Default::default()
                };
            }
        };

        tracing::info!(key = %story_key, "Created story");

        let story = StoryResult {
            key: story_key.clone(),
            summary: title,
            url: format!("{}/{}", self.config.browse_base_url, story_key),
        };

        let mut subtasks = Vec::new();
        if request.create_subtasks {
            for requirement in requirements {
                match self
                    .create_issue(
                        &request.project_key,
                        &request.subtask_type,
                        &requirement,
                        "",
                        Some(&story_key),
                    )
                    .await
                {
                    Ok(key) => subtasks.push(SubtaskResult {
                        key: Some(key),
                        summary: requirement,
                        success: true,
                        error: None,
                    }),
                    Err(e) => {
                        tracing::warn!(requirement = %requirement, "Subtask creation failed: {}", e);
                        subtasks.push(SubtaskResult {
                            key: None,
                            summary: requirement,
                            success: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        let jira_link_markdown = format!(
            "**Jira**: [{}]({}/{})",
            story_key, self.config.browse_base_url, story_key
        );

        CreateTicketResponse {
            success: true,
            story: Some(story),
            subtasks,
            jira_link_markdown: Some(jira_link_markdown),
            error: None,
            error_type: None,
        }
    }

    /// Run the tracker CLI to create one issue and return its key
    async fn create_issue(
        &self,
        project_key: &str,
        issue_type: &str,
        summary: &str,
        description: &str,
        parent_key: Option<&str>,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(["jira", "workitem", "create"])
            .args(["--project", project_key])
            .args(["--type", issue_type]);
        if let Some(parent) = parent_key {
            cmd.args(["--parent", parent]);
        }
        cmd.args(["--summary", summary]);
        if !description.is_empty() {
            cmd.args(["--description", description]);
        }
        cmd.arg("--json");

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Ticket(format!("Failed to run {}: {}", self.config.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::Ticket(format!("Failed to create issue: {}", message)));
        }

        extract_issue_key(&stdout).ok_or_else(|| {
            Error::Ticket(format!(
                "Could not parse issue key from output: {}",
                stdout.trim()
            ))
        })
    }
}

/// First issue key found in CLI output, if any
pub fn extract_issue_key(output: &str) -> Option<String> {
    issue_key_re()
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// The document's main title (first `#` heading)
pub fn extract_title(content: &str) -> String {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("# ") {
            let title = rest.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }
    "Untitled Feature".to_string()
}

/// Content under a `## <name>` heading, up to the next `##` heading
pub fn extract_section(content: &str, section_name: &str) -> String {
    let mut lines = content.lines();

    let mut found = false;
    for line in lines.by_ref() {
        if let Some(rest) = line.strip_prefix("## ") {
            if rest.trim() == section_name {
                found = true;
                break;
            }
        }
    }
    if !found {
        return String::new();
    }

    let mut collected = Vec::new();
    for line in lines {
        if line.starts_with("##") {
            break;
        }
        collected.push(line);
    }
    collected.join("\n").trim().to_string()
}

/// Unchecked functional requirement lines (`- [ ] FR-n: ...`)
pub fn extract_functional_requirements(content: &str) -> Vec<String> {
    requirement_re()
        .captures_iter(content)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Issue description from the overview and success criteria sections
pub fn build_description(overview: &str, success_criteria: &str) -> String {
    let mut parts = Vec::new();
    if !overview.is_empty() {
        parts.push(overview.to_string());
    }
    if !success_criteria.is_empty() {
        parts.push(format!("\n\n*Acceptance Criteria:*\n{}", success_criteria));
    }
    if parts.is_empty() {
        "See linked feature specification.".to_string()
    } else {
        parts.join("\n")
    }
}
