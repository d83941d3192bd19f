//! OLD/NEW edit block parser.
//!
//! A response is scanned line by line by an explicit state machine. Text
//! outside blocks is ignored; only a block that starts and then breaks off
//! is an error.
//!
//! | state          | input                         | next                       |
//! |----------------|-------------------------------|----------------------------|
//! | `SeekingBlock` | `FILE:` line                  | `SeekingBlock` (subject)   |
//! | `SeekingBlock` | OLD marker                    | `InOldRange`               |
//! | `SeekingBlock` | anything else                 | `SeekingBlock`             |
//! | `InOldRange`   | blank                         | `InOldRange`               |
//! | `InOldRange`   | opening fence                 | `InOldBody`                |
//! | `InOldRange`   | other text after a bare OLD   | `SeekingBlock` (re-read)   |
//! | `InOldBody`    | closing fence                 | `InNewRange`               |
//! | `InOldBody`    | any line                      | `InOldBody` (body line)    |
//! | `InNewRange`   | blank                         | `InNewRange`               |
//! | `InNewRange`   | NEW marker (first)            | `InNewRange` (range known) |
//! | `InNewRange`   | opening fence (range known)   | `InNewBody`                |
//! | `InNewBody`    | closing fence                 | `SeekingBlock` (emit edit) |
//! | `InNewBody`    | any line                      | `InNewBody` (body line)    |
//!
//! A bare OLD marker (no line numbers, e.g. `Old:` in prose) only opens a
//! block when a fence follows it. Any other input in a non-seeking state, or
//! end of input outside `SeekingBlock`, is a [`ParseError`].

use std::sync::OnceLock;

use regex::Regex;

use super::error::ParseError;
use super::model::{Edit, LineRange, UNSPECIFIED_LINE};

/// Parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    SeekingBlock,
    InOldRange,
    InOldBody,
    InNewRange,
    InNewBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Old,
    New,
}

/// Classification of a line outside code bodies.
#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Blank,
    Subject(&'a str),
    /// The flag is set when the marker carries line numbers.
    Marker(Section, LineRange, bool),
    Fence,
    Text,
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*\**\s*(old|new)\s*(?:\(([^)]*)\)|(lines?\s+\d[\d\s\-–]*))?\s*\**\s*:?\s*\**\s*$",
        )
        .expect("marker pattern is valid")
    })
}

fn subject_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*\**\s*file\s*:\s*(.*?)\s*\**\s*$").expect("subject pattern is valid")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("number pattern is valid"))
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_closing_fence(line: &str) -> bool {
    line.trim() == "```"
}

/// First two integers in the marker's range text; anything missing or out
/// of range becomes [`UNSPECIFIED_LINE`].
fn parse_range(text: &str) -> LineRange {
    let mut numbers = number_re()
        .find_iter(text)
        .map(|m| m.as_str().parse::<u32>().unwrap_or(UNSPECIFIED_LINE));
    let start = numbers.next().unwrap_or(UNSPECIFIED_LINE);
    let end = numbers.next().unwrap_or(UNSPECIFIED_LINE);
    LineRange::new(start, end)
}

fn classify(line: &str) -> Token<'_> {
    if line.trim().is_empty() {
        return Token::Blank;
    }
    if is_fence(line) {
        return Token::Fence;
    }
    if let Some(caps) = marker_re().captures(line) {
        let section = if caps[1].eq_ignore_ascii_case("old") {
            Section::Old
        } else {
            Section::New
        };
        let range_text = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
        return Token::Marker(
            section,
            parse_range(range_text.unwrap_or("")),
            range_text.is_some(),
        );
    }
    if let Some(caps) = subject_re().captures(line) {
        if let Some(path) = caps.get(1) {
            return Token::Subject(path.as_str().trim_matches('`'));
        }
    }
    Token::Text
}

struct BlockParser<'a> {
    state: ParseState,
    subject: Option<&'a str>,
    block_start: usize,
    /// The open block started from a bare OLD marker.
    tentative: bool,
    old_range: LineRange,
    old_lines: Vec<&'a str>,
    new_range: LineRange,
    new_marker_seen: bool,
    new_lines: Vec<&'a str>,
    edits: Vec<Edit>,
}

impl<'a> BlockParser<'a> {
    fn new() -> Self {
        Self {
            state: ParseState::SeekingBlock,
            subject: None,
            block_start: 0,
            tentative: false,
            old_range: LineRange::default(),
            old_lines: Vec::new(),
            new_range: LineRange::default(),
            new_marker_seen: false,
            new_lines: Vec::new(),
            edits: Vec::new(),
        }
    }

    fn step(&mut self, line_no: usize, line: &'a str) -> Result<(), ParseError> {
        match self.state {
            ParseState::InOldBody => {
                if is_closing_fence(line) {
                    self.state = ParseState::InNewRange;
                } else {
                    self.old_lines.push(line);
                }
                Ok(())
            }
            ParseState::InNewBody => {
                if is_closing_fence(line) {
                    self.emit();
                } else {
                    self.new_lines.push(line);
                }
                Ok(())
            }
            ParseState::SeekingBlock => {
                match classify(line) {
                    Token::Subject(path) => {
                        self.subject = (!path.is_empty()).then_some(path);
                    }
                    Token::Marker(Section::Old, range, explicit) => {
                        self.block_start = line_no;
                        self.tentative = !explicit;
                        self.old_range = range;
                        self.state = ParseState::InOldRange;
                    }
                    _ => {}
                }
                Ok(())
            }
            ParseState::InOldRange => match classify(line) {
                Token::Blank => Ok(()),
                Token::Fence => {
                    self.tentative = false;
                    self.state = ParseState::InOldBody;
                    Ok(())
                }
                _ if self.tentative => {
                    self.abandon();
                    self.step(line_no, line)
                }
                _ => Err(ParseError::new(
                    line_no,
                    format!(
                        "OLD section at line {} is missing its fenced code body",
                        self.block_start
                    ),
                )),
            },
            ParseState::InNewRange => match (classify(line), self.new_marker_seen) {
                (Token::Blank, _) => Ok(()),
                (Token::Marker(Section::New, range, _), false) => {
                    self.new_range = range;
                    self.new_marker_seen = true;
                    Ok(())
                }
                (Token::Fence, true) => {
                    self.state = ParseState::InNewBody;
                    Ok(())
                }
                (_, false) => Err(ParseError::new(
                    line_no,
                    format!(
                        "OLD section at line {} has no matching NEW section",
                        self.block_start
                    ),
                )),
                (_, true) => Err(ParseError::new(
                    line_no,
                    format!(
                        "NEW section of the block at line {} is missing its fenced code body",
                        self.block_start
                    ),
                )),
            },
        }
    }

    fn emit(&mut self) {
        self.edits.push(Edit {
            file: self.subject.take().map(str::to_string),
            old_range: self.old_range,
            old_code: self.old_lines.join("\n"),
            new_range: self.new_range,
            new_code: self.new_lines.join("\n"),
        });
        self.old_lines.clear();
        self.new_lines.clear();
        self.old_range = LineRange::default();
        self.new_range = LineRange::default();
        self.new_marker_seen = false;
        self.state = ParseState::SeekingBlock;
    }

    /// Drop a bare OLD marker that turned out to be prose.
    fn abandon(&mut self) {
        self.tentative = false;
        self.old_range = LineRange::default();
        self.state = ParseState::SeekingBlock;
    }

    fn finish(self, last_line: usize) -> Result<Vec<Edit>, ParseError> {
        let reason = match self.state {
            ParseState::SeekingBlock => return Ok(self.edits),
            ParseState::InOldRange if self.tentative => return Ok(self.edits),
            ParseState::InOldRange => "is missing its fenced code body",
            ParseState::InOldBody => "has an unterminated OLD code fence",
            ParseState::InNewRange if !self.new_marker_seen => "has no matching NEW section",
            ParseState::InNewRange => "is missing its NEW code body",
            ParseState::InNewBody => "has an unterminated NEW code fence",
        };
        Err(ParseError::new(
            last_line,
            format!("block starting at line {} {reason}", self.block_start),
        ))
    }
}

/// Parse every OLD/NEW block in `text`, in order of appearance.
///
/// Returns an empty list when the text contains no block.
pub fn parse_edits(text: &str) -> Result<Vec<Edit>, ParseError> {
    let mut parser = BlockParser::new();
    let mut last_line = 0;
    for (idx, line) in text.lines().enumerate() {
        last_line = idx + 1;
        parser.step(last_line, line)?;
    }
    parser.finish(last_line)
}
