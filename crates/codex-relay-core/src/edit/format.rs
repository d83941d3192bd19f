//! Rendering of edits back into the canonical OLD/NEW text protocol.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::model::Edit;

const SUMMARY_FILE_LIMIT: usize = 10;

/// Position of a rendered chunk within a multi-chunk response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub current: usize,
    pub total: usize,
    /// Key for fetching the other chunks; `None` when caching failed or no
    /// prompt was available.
    pub cache_key: Option<String>,
}

/// Render one edit as a canonical block.
pub fn format_edit(edit: &Edit) -> String {
    let mut out = String::new();
    if let Some(file) = &edit.file {
        let _ = writeln!(out, "**FILE: {file}**");
    }
    let _ = writeln!(out, "OLD (lines {}):", edit.old_range);
    let _ = writeln!(out, "```\n{}\n```", edit.old_code);
    let _ = writeln!(out, "NEW (lines {}):", edit.new_range);
    let _ = write!(out, "```\n{}\n```", edit.new_code);
    out
}

fn format_footer(page: &Pagination) -> String {
    let mut out = format!("---\nChunk {} of {}.", page.current, page.total);
    match (&page.cache_key, page.current < page.total) {
        (Some(key), true) => {
            let _ = write!(
                out,
                " Cache key: {key}\nTo fetch the next chunk, request chunk_index={} with chunk_cache_key={key}.",
                page.current + 1
            );
        }
        (Some(key), false) => {
            let _ = write!(out, " Cache key: {key}\nThis is the final chunk.");
        }
        (None, _) => {
            out.push_str(
                "\nNo cache key is available; re-run the request with its original prompt to page through the remaining chunks.",
            );
        }
    }
    out
}

/// Render a chunk's edits, followed by a pagination footer when the
/// response spans more than one chunk.
pub fn format_chunk(edits: &[Edit], pagination: Option<&Pagination>) -> String {
    let mut out = edits
        .iter()
        .map(format_edit)
        .collect::<Vec<_>>()
        .join("\n\n");
    if let Some(page) = pagination.filter(|page| page.total > 1) {
        out.push_str("\n\n");
        out.push_str(&format_footer(page));
    }
    out
}

/// Human-readable overview of a whole edit set.
pub fn summarize_edits(edits: &[Edit], total_chunks: usize) -> String {
    let mut per_file: BTreeMap<&str, usize> = BTreeMap::new();
    for edit in edits {
        let file = edit.file.as_deref().unwrap_or("(unspecified file)");
        *per_file.entry(file).or_default() += 1;
    }

    let mut out = String::from("## Change Summary\n");
    let _ = writeln!(out, "- Total edits: {}", edits.len());
    let _ = writeln!(out, "- Total chunks: {total_chunks}");
    let _ = write!(out, "- Files affected: {}", per_file.len());
    for (file, count) in per_file.iter().take(SUMMARY_FILE_LIMIT) {
        let noun = if *count == 1 { "edit" } else { "edits" };
        let _ = write!(out, "\n  - {file}: {count} {noun}");
    }
    if per_file.len() > SUMMARY_FILE_LIMIT {
        let _ = write!(
            out,
            "\n  - ... and {} more",
            per_file.len() - SUMMARY_FILE_LIMIT
        );
    }
    out
}
