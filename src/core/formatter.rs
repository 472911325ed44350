//! Payload formatting: redaction, truncation, grouping and chunking
//!
//! Critical records become one payload each, with an attention prefix and an
//! optional stack-trace embed. Everything else in a drain cycle is joined into
//! one timestamped batch per severity class and split into chunks that fit the
//! endpoint's message limit. The first chunk carries the batch header, the
//! following ones a `CONTINUED (N/M)` header, and message order is preserved
//! across chunk boundaries.

use super::log_item::LogItem;
use super::log_level::SeverityClass;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Largest chunk body handed to the transport
pub const MAX_CHUNK_LENGTH: usize = 1900;

/// Stack traces are cut to this many characters
pub const MAX_TRACE_LENGTH: usize = 200;

/// Replacement for redacted values
pub const MASK: &str = "***";

/// Marker for a record without a stack trace
pub const NO_TRACE: &str = "N/A";

const CODE_FENCE_CLOSE: &str = "\n```";

// The key starts at a word boundary, optionally behind `api_`-style
// segments; quoted JSON keys and quoted values are matched whole.
static SENSITIVE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?P<key>(?:[a-z0-9]+[_.-])*(?:login|user|token|password|key|secret))(?P<sep>"?\s*[=:]\s*)(?:(?P<quoted>"[^"]*")|[^\s&"]+)"#,
    )
    .expect("sensitive value pattern is valid")
});

static ABSOLUTE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:/[^/\s"',:()]+){3,}"#).expect("absolute path pattern is valid")
});

/// One outbound webhook body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_embed(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.embeds.push(Embed {
            title: title.into(),
            description: description.into(),
        });
        self
    }

    /// Every visible string of the payload, embeds included
    pub fn full_text(&self) -> String {
        let mut text = self.content.clone();
        for embed in &self.embeds {
            text.push('\n');
            text.push_str(&embed.title);
            text.push('\n');
            text.push_str(&embed.description);
        }
        text
    }
}

/// Mask values that follow a sensitive key (`password=...`, `token: ...`)
///
/// Plain pairs are normalised to `key=***`. Quoted forms such as
/// `"password": "abc"` keep their punctuation so JSON stays valid.
pub fn redact(text: &str) -> String {
    SENSITIVE_VALUE
        .replace_all(text, |caps: &Captures<'_>| {
            let key = &caps["key"];
            let sep = &caps["sep"];
            if sep.starts_with('"') || caps.name("quoted").is_some() {
                format!("{}{}\"{}\"", key, sep, MASK)
            } else {
                format!("{}={}", key, MASK)
            }
        })
        .into_owned()
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Redact sensitive values, then truncate to `max_chars`
pub fn sanitize(message: &str, max_chars: usize) -> String {
    let redacted = redact(message);
    truncate_chars(&redacted, max_chars).to_owned()
}

/// Shorten a stack trace for display
///
/// Sensitive values are redacted, absolute paths collapse to
/// `/.../<parent>/<file>`, and the result is cut to [`MAX_TRACE_LENGTH`].
pub fn format_stack_trace(trace: Option<&str>) -> String {
    let trace = match trace {
        Some(trace) if !trace.trim().is_empty() => trace,
        _ => return NO_TRACE.to_owned(),
    };

    let redacted = redact(trace);
    let collapsed = ABSOLUTE_PATH.replace_all(&redacted, |caps: &Captures<'_>| {
        let segments: Vec<&str> = caps[0].split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [.., parent, file] => format!("/.../{}/{}", parent, file),
            _ => caps[0].to_owned(),
        }
    });
    truncate_chars(&collapsed, MAX_TRACE_LENGTH).to_owned()
}

/// Split `content` into line-packed chunks of at most `max_len` characters
///
/// Lines are packed greedily while `len(current) + len(line) + 1 <= max_len`.
/// A line longer than `max_len` on its own is hard-split on character
/// boundaries. Joining the chunks with `\n` restores the input, except at
/// hard-split points where the pieces join without a separator.
pub fn split_into_chunks(content: &str, max_len: usize) -> Chunks<'_> {
    Chunks {
        lines: content.split('\n'),
        carry: None,
        max_len: max_len.max(1),
        exhausted: content.is_empty(),
    }
}

/// Iterator returned by [`split_into_chunks`]
#[derive(Debug)]
pub struct Chunks<'a> {
    lines: std::str::Split<'a, char>,
    carry: Option<&'a str>,
    max_len: usize,
    exhausted: bool,
}

impl<'a> Chunks<'a> {
    fn next_line(&mut self) -> Option<&'a str> {
        if let Some(line) = self.carry.take() {
            return Some(line);
        }
        if self.exhausted {
            return None;
        }
        let line = self.lines.next();
        if line.is_none() {
            self.exhausted = true;
        }
        line
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut current: Option<(String, usize)> = None;

        while let Some(line) = self.next_line() {
            let line_len = line.chars().count();

            match current.as_mut() {
                Some((chunk, len)) => {
                    if *len + line_len + 1 <= self.max_len {
                        chunk.push('\n');
                        chunk.push_str(line);
                        *len += line_len + 1;
                    } else {
                        self.carry = Some(line);
                        break;
                    }
                }
                None if line_len <= self.max_len => {
                    current = Some((line.to_owned(), line_len));
                }
                None => {
                    let head = truncate_chars(line, self.max_len);
                    self.carry = Some(&line[head.len()..]);
                    return Some(head.to_owned());
                }
            }
        }

        current.map(|(chunk, _)| chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Turns drained records into webhook payloads
#[derive(Debug, Clone)]
pub struct BatchFormatter {
    max_message_length: usize,
    max_chunk_length: usize,
}

impl Default for BatchFormatter {
    fn default() -> Self {
        Self::new(500)
    }
}

impl BatchFormatter {
    pub fn new(max_message_length: usize) -> Self {
        Self {
            max_message_length: max_message_length.max(1),
            max_chunk_length: MAX_CHUNK_LENGTH,
        }
    }

    /// Override the chunk size (clamped to [`MAX_CHUNK_LENGTH`])
    #[must_use]
    pub fn with_chunk_length(mut self, max_chunk_length: usize) -> Self {
        self.max_chunk_length = max_chunk_length.clamp(1, MAX_CHUNK_LENGTH);
        self
    }

    pub fn sanitize(&self, message: &str) -> String {
        sanitize(message, self.max_message_length)
    }

    /// Individual payload for a critical record
    pub fn critical_payload(&self, item: &LogItem) -> Payload {
        let payload = Payload::text(format!(
            "@everyone\n**CRITICAL ERROR**\n```{}```",
            self.sanitize(&item.message)
        ));
        match item.stack_trace.as_deref() {
            Some(trace) => payload.with_embed("Stack Trace", format_stack_trace(Some(trace))),
            None => payload,
        }
    }

    /// Timestamped line of a grouped batch
    pub fn batch_line(&self, item: &LogItem) -> String {
        format!(
            "[{}] {}",
            item.enqueued_at.format("%H:%M:%S"),
            self.sanitize(&item.message)
        )
    }

    /// Chunked payloads for one class's grouped lines
    pub fn batch_payloads(&self, class: SeverityClass, lines: &[String]) -> Vec<Payload> {
        if lines.is_empty() {
            return Vec::new();
        }

        let body = lines.join("\n");
        let chunks: Vec<String> = split_into_chunks(&body, self.max_chunk_length).collect();
        let total = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(idx, chunk)| {
                let header = if idx == 0 {
                    batch_header(class).to_owned()
                } else {
                    format!("**CONTINUED ({}/{})**\n```\n", idx + 1, total)
                };
                Payload::text(format!("{}{}{}", header, chunk, CODE_FENCE_CLOSE))
            })
            .collect()
    }
}

fn batch_header(class: SeverityClass) -> &'static str {
    match class {
        SeverityClass::Info => "**SYSTEM UPDATE:**\n```\n",
        SeverityClass::Error => "**ERROR LOGS:**\n```\n",
    }
}
