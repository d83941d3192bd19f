//! Engine transcript parsing and plain-response rendering.
//!
//! A transcript is the engine's human-oriented stdout: a banner, a block of
//! `key: value` settings between two `--------` rules, then timestamped
//! sections (`User instructions:`, `thinking`, `codex`) and a final
//! `tokens used: N` line. Anything that does not fit is ignored; a transcript
//! without a recognizable response section falls back to the raw text.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Banner,
    Metadata,
    Content,
    UserInstructions,
    Thinking,
    Response,
}

/// A parsed engine transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Settings from the header block; keys are lowercased with `_` for spaces.
    pub metadata: BTreeMap<String, String>,
    pub user_instructions: String,
    pub thinking: Option<String>,
    pub response: String,
    pub tokens_used: Option<u64>,
    pub timestamps: Vec<String>,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]\s*").expect("timestamp pattern is valid"))
}

fn tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)tokens used:\s*([\d,]+)").expect("tokens pattern is valid")
    })
}

fn is_rule(line: &str) -> bool {
    line.trim_start().starts_with("--------")
}

fn section_marker(rest: &str) -> Option<Section> {
    let marker = rest.trim().to_ascii_lowercase();
    match marker.as_str() {
        "thinking" => Some(Section::Thinking),
        "codex" | "assistant" => Some(Section::Response),
        _ if marker.starts_with("user instructions:") => Some(Section::UserInstructions),
        _ => None,
    }
}

fn metadata_entry(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let key = key
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    Some((key, value.trim().to_string()))
}

/// Split raw engine stdout into its sections.
pub fn parse_transcript(raw: &str) -> Transcript {
    let mut transcript = Transcript::default();
    let mut section = Section::Banner;
    let mut instructions = Vec::new();
    let mut thinking = Vec::new();
    let mut response = Vec::new();

    for line in raw.lines() {
        let rest = match timestamp_re().captures(line) {
            Some(caps) => {
                transcript.timestamps.push(caps[1].to_string());
                &line[caps[0].len()..]
            }
            None => line,
        };

        if let Some(caps) = tokens_re().captures(rest) {
            transcript.tokens_used = caps[1].replace(',', "").parse().ok();
            continue;
        }
        if rest.contains("OpenAI Codex") || rest.contains("Codex CLI") {
            section = Section::Banner;
            continue;
        }
        if is_rule(rest) {
            section = match section {
                Section::Banner => Section::Metadata,
                Section::Metadata => Section::Content,
                other => other,
            };
            continue;
        }
        if let Some(next) = section_marker(rest) {
            section = next;
            continue;
        }

        if rest.trim().is_empty() {
            continue;
        }
        match section {
            Section::Banner => {}
            Section::Metadata => {
                if let Some((key, value)) = metadata_entry(rest) {
                    transcript.metadata.insert(key, value);
                }
            }
            Section::UserInstructions => instructions.push(rest),
            Section::Thinking => thinking.push(rest),
            Section::Content | Section::Response => response.push(rest),
        }
    }

    transcript.user_instructions = instructions.join("\n").trim().to_string();
    let thinking = thinking.join("\n").trim().to_string();
    transcript.thinking = (!thinking.is_empty()).then_some(thinking);
    let response = response.join("\n").trim().to_string();
    transcript.response = if response.is_empty() {
        raw.to_string()
    } else {
        response
    };
    transcript
}

/// Render a transcript as Markdown: configuration, reasoning, response and
/// token usage, each only when present and requested.
pub fn format_transcript(
    transcript: &Transcript,
    include_thinking: bool,
    include_metadata: bool,
) -> String {
    let mut out = String::new();
    let meta = &transcript.metadata;

    if include_metadata && (meta.contains_key("model") || meta.contains_key("sandbox")) {
        out.push_str("**Engine Configuration:**\n");
        for (key, label) in [("model", "Model"), ("sandbox", "Sandbox"), ("approval", "Approval")] {
            if let Some(value) = meta.get(key) {
                let _ = writeln!(out, "- {label}: {value}");
            }
        }
        out.push('\n');
    }

    if let Some(thinking) = transcript.thinking.as_deref().filter(|_| include_thinking) {
        let _ = write!(out, "**Reasoning:**\n{thinking}\n\n");
    }

    if include_metadata || include_thinking {
        out.push_str("**Response:**\n");
    }
    out.push_str(&transcript.response);

    if let Some(tokens) = transcript.tokens_used.filter(|tokens| *tokens > 0) {
        let _ = write!(out, "\n\n*Tokens used: {tokens}*");
    }
    out
}
