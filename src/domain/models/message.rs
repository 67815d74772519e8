//! Transcript message domain model.
//!
//! A message is one unit of transcript text. Messages are constructed per
//! transcript line, handed to the analyzer, and dropped; they are never
//! persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// A human operator.
    User,
    /// The supervised agent.
    Assistant,
    /// System prompt or harness text.
    System,
    /// Tool output.
    Tool,
}

impl MessageRole {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Arguments as passed to the tool.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// An immutable unit of transcript text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// When the message was observed.
    pub timestamp: DateTime<Utc>,
    /// Tools invoked alongside this message.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a message timestamped now.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Shorthand for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Shorthand for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a tool call.
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Parse raw transcript text into one assistant message per non-blank line.
    ///
    /// ANSI escape sequences are stripped first; every message shares the
    /// same `timestamp`.
    pub fn parse_transcript(text: &str, timestamp: DateTime<Utc>) -> Vec<Self> {
        text.lines()
            .map(strip_ansi)
            .filter(|line| !line.trim().is_empty())
            .map(|line| Self::assistant(line).with_timestamp(timestamp))
            .collect()
    }
}

/// Strip ANSI escape sequences (CSI, OSC and two-byte escapes) from terminal output.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if c != '\u{9b}' {
                out.push(c);
                continue;
            }
            // Bare CSI
            skip_csi(&mut chars);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                skip_csi(&mut chars);
            }
            Some(']') => {
                chars.next();
                // OSC runs until BEL or ESC \
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(&next) if (' '..='~').contains(&next) => {
                chars.next();
            }
            _ => {}
        }
    }

    out
}

fn skip_csi(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    // Parameter and intermediate bytes, then one final byte.
    while let Some(&c) = chars.peek() {
        if (' '..='?').contains(&c) {
            chars.next();
        } else {
            break;
        }
    }
    if let Some(&c) = chars.peek() {
        if ('@'..='~').contains(&c) {
            chars.next();
        }
    }
}
