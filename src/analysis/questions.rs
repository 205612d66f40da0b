//! Clarifying question extraction from agent output
//!
//! The analysis agent asks its questions as numbered markdown items:
//!
//! ```text
//! 1. **Question Title?**
//!    Context or description...
//!
//! 2. **Another Question?**
//!    More context...
//! ```
//!
//! Parsing is pure: identical input gives identical output.

use crate::analysis::types::{Answer, Question};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Context longer than this is truncated with a trailing ellipsis
const MAX_CONTEXT_LEN: usize = 500;

/// Matches `<int>. **<title>**` at the head of a question block. The title
/// must close on its own line; context runs until the next match.
fn question_re() -> &'static Regex {
    static QUESTION_RE: OnceLock<Regex> = OnceLock::new();
    QUESTION_RE.get_or_init(|| {
        Regex::new(r"(?s)(\d+)\.\s+\*\*(.+?)\*\*[ \t]*(?:\r?\n|$)").unwrap()
    })
}

/// Parse numbered questions out of agent markdown output.
///
/// Returns an empty vec when no blocks match, which callers treat as
/// "analysis finished with nothing to clarify", not as an error.
pub fn parse_questions(text: &str) -> Vec<Question> {
    let blocks: Vec<(usize, usize, u32, String)> = question_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str().parse::<u32>().ok()?;
            let title = caps.get(2)?.as_str().trim().to_string();
            Some((whole.start(), whole.end(), id, title))
        })
        .collect();

    let mut questions = Vec::with_capacity(blocks.len());
    for (i, (_, end, id, title)) in blocks.iter().enumerate() {
        let context_end = blocks
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or_else(|| text.len());
        let context = clean_context(&text[*end..context_end]);
        questions.push(Question {
            id: *id,
            title: title.clone(),
            context,
        });
    }
    questions
}

/// Normalize a raw context block: strip leading bullet/dash markers,
/// collapse all internal whitespace to single spaces, and cap the length.
/// Empty context becomes `None`.
fn clean_context(raw: &str) -> Option<String> {
    let stripped = raw.trim_start_matches(|c: char| c.is_whitespace() || c == '-');
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() > MAX_CONTEXT_LEN {
        let truncated: String = collapsed.chars().take(MAX_CONTEXT_LEN).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(collapsed)
    }
}

/// Render stored questions with their submitted answers for the
/// continuation prompt. Questions without a matching answer render the
/// `(No answer provided)` placeholder.
pub fn format_answers(questions: &[Question], answers: &[Answer]) -> String {
    let answer_map: HashMap<u32, &str> = answers
        .iter()
        .map(|a| (a.question_id, a.answer.as_str()))
        .collect();

    let mut lines = Vec::new();
    for q in questions {
        lines.push(format!("### {}. {}", q.id, q.title));
        lines.push(String::new());
        lines.push(
            answer_map
                .get(&q.id)
                .copied()
                .unwrap_or("(No answer provided)")
                .to_string(),
        );
        lines.push(String::new());
    }
    lines.join("\n")
}
