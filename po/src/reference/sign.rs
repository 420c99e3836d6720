//! Perceptual signs
//!
//! A perceptual sign is the surface form `%{norm}id(payload)`, or
//! `%id(payload)` when the norm is `literal`. The sign encodes how a value
//! should be materialized: read a file, load and fill a prompt template,
//! compile a script, treat as a bare literal, and so on. The perception
//! router is the bijection between signs and in-memory content.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ReferenceError;

/// The norm of a perceptual sign: which capability materializes it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignNorm {
    FileLocation,
    PromptLocation,
    ScriptLocation,
    SavePath,
    MemorizedParameter,
    TruthValue,
    /// Bare literal, optionally typed (`literal<file_path>` etc.)
    Literal { kind: Option<String> },
}

impl SignNorm {
    /// Parse a norm name as it appears between `{` and `}`
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        if let Some(rest) = s.strip_prefix("literal<") {
            let kind = rest
                .strip_suffix('>')
                .ok_or_else(|| ReferenceError::BadSign(format!("unterminated literal kind in {s}")))?;
            return Ok(SignNorm::Literal {
                kind: Some(kind.to_string()),
            });
        }
        match s {
            "file_location" => Ok(SignNorm::FileLocation),
            "prompt_location" => Ok(SignNorm::PromptLocation),
            "script_location" => Ok(SignNorm::ScriptLocation),
            "save_path" => Ok(SignNorm::SavePath),
            "memorized_parameter" => Ok(SignNorm::MemorizedParameter),
            "truth_value" => Ok(SignNorm::TruthValue),
            "literal" => Ok(SignNorm::Literal { kind: None }),
            other => Err(ReferenceError::BadSign(format!("unknown norm: {other}"))),
        }
    }

    /// The surface name used between `{` and `}`
    pub fn name(&self) -> String {
        match self {
            SignNorm::FileLocation => "file_location".into(),
            SignNorm::PromptLocation => "prompt_location".into(),
            SignNorm::ScriptLocation => "script_location".into(),
            SignNorm::SavePath => "save_path".into(),
            SignNorm::MemorizedParameter => "memorized_parameter".into(),
            SignNorm::TruthValue => "truth_value".into(),
            SignNorm::Literal { kind: None } => "literal".into(),
            SignNorm::Literal { kind: Some(k) } => format!("literal<{k}>"),
        }
    }
}

/// A parsed perceptual sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualSign {
    pub norm: SignNorm,
    /// Opaque discriminator between signs sharing a norm; often empty
    pub id: String,
    pub payload: String,
}

impl PerceptualSign {
    pub fn new(norm: SignNorm, id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            norm,
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// True if a string has the sign surface shape
    pub fn looks_like(s: &str) -> bool {
        s.starts_with('%') && s.ends_with(')') && s.contains('(')
    }

    /// Parse the surface form `%{norm}id(payload)` / `%id(payload)`
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let rest = s
            .strip_prefix('%')
            .ok_or_else(|| ReferenceError::BadSign(format!("missing %: {s}")))?;

        let (norm, rest) = if let Some(body) = rest.strip_prefix('{') {
            let close = body
                .find('}')
                .ok_or_else(|| ReferenceError::BadSign(format!("unterminated norm: {s}")))?;
            (SignNorm::parse(&body[..close])?, &body[close + 1..])
        } else {
            (SignNorm::Literal { kind: None }, rest)
        };

        let open = rest
            .find('(')
            .ok_or_else(|| ReferenceError::BadSign(format!("missing payload: {s}")))?;
        let id = &rest[..open];
        let payload = rest[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| ReferenceError::BadSign(format!("unterminated payload: {s}")))?;

        Ok(Self::new(norm, id, payload))
    }

    /// Parse a string only if it has the sign shape
    pub fn try_parse(s: &str) -> Option<Self> {
        if Self::looks_like(s) { Self::parse(s).ok() } else { None }
    }

    /// A truth-value sign carrying a boolean
    pub fn truth(value: bool) -> Self {
        Self::new(SignNorm::TruthValue, "", if value { "true" } else { "false" })
    }

    /// Decode a truth-value payload
    pub fn as_truth(&self) -> Option<bool> {
        if self.norm != SignNorm::TruthValue {
            return None;
        }
        match self.payload.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for PerceptualSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.norm {
            SignNorm::Literal { kind: None } if self.id.is_empty() => {
                write!(f, "%{}({})", self.id, self.payload)
            }
            norm => write!(f, "%{{{}}}{}({})", norm.name(), self.id, self.payload),
        }
    }
}
