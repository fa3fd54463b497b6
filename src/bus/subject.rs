use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of traffic carried on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamCategory {
    /// Inbound audio frames for recognition
    Audio,
    /// Transcripts
    Text,
    /// Synthesized audio
    Tts,
}

impl StreamCategory {
    pub const ALL: [StreamCategory; 3] = [StreamCategory::Audio, StreamCategory::Text, StreamCategory::Tts];

    /// Subject token for this category
    pub fn token(self) -> &'static str {
        match self {
            StreamCategory::Audio => "audio",
            StreamCategory::Text => "text",
            StreamCategory::Tts => "tts",
        }
    }

    /// JetStream stream backing this category
    pub fn stream_name(self) -> &'static str {
        match self {
            StreamCategory::Audio => "AUDIO",
            StreamCategory::Text => "TEXT",
            StreamCategory::Tts => "TTS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StreamCategory::Audio => "Audio frames stream",
            StreamCategory::Text => "Transcripts stream",
            StreamCategory::Tts => "TTS audio stream",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Builds and parses `<prefix>.<category>.<session-id>` subjects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectScheme {
    prefix: String,
}

impl SubjectScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('.').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Subject for one session's traffic in a category
    pub fn subject(&self, category: StreamCategory, session_id: impl fmt::Display) -> String {
        format!("{}.{}.{}", self.prefix, category.token(), session_id)
    }

    /// Filter matching every session in a category
    pub fn wildcard(&self, category: StreamCategory) -> String {
        format!("{}.{}.>", self.prefix, category.token())
    }

    /// Split a subject (or filter) into its category and session part
    pub fn parse<'a>(&self, subject: &'a str) -> Option<(StreamCategory, &'a str)> {
        let rest = subject.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        let (token, session) = rest.split_once('.')?;
        if session.is_empty() {
            return None;
        }
        Some((StreamCategory::from_token(token)?, session))
    }
}

impl Default for SubjectScheme {
    fn default() -> Self {
        Self::new("voice")
    }
}

/// NATS-style subject matching
///
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
