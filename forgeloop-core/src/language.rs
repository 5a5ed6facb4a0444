//! Lexical facts about the target language
//!
//! Extraction only needs to know three things about the language it is
//! pulling out of the oracle's answer: the tag on the opening fence, the line
//! comment token, and a display name for prompts.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetLanguage {
    /// Display name used in prompts ("Fortran")
    pub name: String,
    /// Tag following the opening fence (```fortran)
    pub fence_tag: String,
    /// Line comment token ("!")
    pub comment_token: String,
}

impl TargetLanguage {
    pub fn new(
        name: impl Into<String>,
        fence_tag: impl Into<String>,
        comment_token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fence_tag: fence_tag.into(),
            comment_token: comment_token.into(),
        }
    }

    pub fn fortran() -> Self {
        Self::new("Fortran", "fortran", "!")
    }

    pub fn c() -> Self {
        Self::new("C", "c", "//")
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fortran" | "f90" => Some(Self::fortran()),
            "c" => Some(Self::c()),
            _ => None,
        }
    }

    pub fn with_fence_tag(mut self, tag: impl Into<String>) -> Self {
        self.fence_tag = tag.into();
        self
    }

    pub fn with_comment_token(mut self, token: impl Into<String>) -> Self {
        self.comment_token = token.into();
        self
    }

    /// Whether `line` opens a fenced block for this language
    pub fn is_fence_open(&self, line: &str) -> bool {
        line.trim()
            .strip_prefix("```")
            .map(|tag| tag.trim().eq_ignore_ascii_case(&self.fence_tag))
            .unwrap_or(false)
    }

    /// Whether `line` closes a fenced block
    pub fn is_fence_close(&self, line: &str) -> bool {
        line.trim().starts_with("```")
    }

    pub fn is_comment(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.comment_token.as_str())
    }

    pub fn comment_out(&self, line: &str) -> String {
        format!("{}{}", self.comment_token, line)
    }

    /// Wrap code in a fence for embedding into a prompt
    pub fn fenced(&self, code: &str) -> String {
        format!("```{}\n{}\n```", self.fence_tag, code)
    }
}

impl Default for TargetLanguage {
    fn default() -> Self {
        Self::fortran()
    }
}
