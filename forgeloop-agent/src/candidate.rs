//! Candidates: one per oracle answer

use forgeloop_core::{extract, Generation, TargetLanguage};
use serde::Serialize;
use std::time::Duration;

/// What produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Answer to the specification prompt
    Initial,
    /// Taken from the existing source file without a generation call
    Seeded,
    CompileFix,
    RuntimeFix,
}

/// Provenance comment block written above the generated code
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    pub prompt_source: &'a str,
    pub model: &'a str,
}

impl Header<'_> {
    pub fn render(&self, lang: &TargetLanguage, latency: Duration) -> String {
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        [
            format!("Generated from prompt file: {}", self.prompt_source),
            format!("Model used: {}", self.model),
            format!("Time generated: {}", generated),
            format!("Generation time: {:.3} seconds", latency.as_secs_f64()),
        ]
        .iter()
        .map(|line| format!("{} {}\n", lang.comment_token, line))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub attempt: usize,
    pub origin: Origin,
    /// The oracle's answer as received
    #[serde(skip)]
    pub raw: String,
    /// What gets written to the source path, header included
    pub code: String,
    /// Non-blank lines of extracted code, header excluded
    pub loc: usize,
    pub fenced: bool,
    #[serde(rename = "latency_secs", serialize_with = "crate::serialize_secs")]
    pub latency: Duration,
}

impl Candidate {
    pub fn from_generation(
        attempt: usize,
        origin: Origin,
        generation: Generation,
        lang: &TargetLanguage,
        header: Option<Header<'_>>,
    ) -> Self {
        let extraction = extract(&generation.text, lang);
        let code = match header {
            Some(header) => header.render(lang, generation.latency) + &extraction.code,
            None => extraction.code,
        };
        if extraction.neutralized > 0 {
            tracing::debug!(attempt, lines = extraction.neutralized, "commented out backtick lines");
        }
        Self {
            attempt,
            origin,
            raw: generation.text,
            code,
            loc: extraction.loc,
            fenced: extraction.fenced,
            latency: generation.latency,
        }
    }

    /// Existing source used verbatim as the first candidate
    pub fn seeded(attempt: usize, content: String) -> Self {
        let loc = forgeloop_core::extract::count_loc(&content);
        Self {
            attempt,
            origin: Origin::Seeded,
            raw: content.clone(),
            code: content,
            loc,
            fenced: false,
            latency: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "Here you go:\n```fortran\nprogram p\n  print *, 'hi'\nend program p\n```\nDone.";

    #[test]
    fn test_without_header() {
        let generation = Generation::new(ANSWER, Duration::from_millis(1500));
        let candidate =
            Candidate::from_generation(1, Origin::Initial, generation, &TargetLanguage::fortran(), None);

        assert_eq!(candidate.code, "program p\n  print *, 'hi'\nend program p");
        assert_eq!(candidate.loc, 3);
        assert!(candidate.fenced);
        assert_eq!(candidate.raw, ANSWER);
    }

    #[test]
    fn test_header_is_comment_and_not_counted() {
        let generation = Generation::new(ANSWER, Duration::from_millis(1234));
        let header = Header {
            prompt_source: "prompt.txt",
            model: "llama-3.3-70b-versatile",
        };
        let candidate = Candidate::from_generation(
            2,
            Origin::CompileFix,
            generation,
            &TargetLanguage::fortran(),
            Some(header),
        );

        let lines: Vec<&str> = candidate.code.lines().collect();
        assert_eq!(lines[0], "! Generated from prompt file: prompt.txt");
        assert_eq!(lines[1], "! Model used: llama-3.3-70b-versatile");
        assert!(lines[2].starts_with("! Time generated: "));
        assert_eq!(lines[3], "! Generation time: 1.234 seconds");
        assert_eq!(lines[4], "program p");
        assert_eq!(candidate.loc, 3);
    }

    #[test]
    fn test_header_uses_language_comment_token() {
        let header = Header {
            prompt_source: "spec.txt",
            model: "m",
        };
        let text = header.render(&TargetLanguage::c(), Duration::ZERO);
        assert!(text.lines().all(|line| line.starts_with("// ")));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_seeded() {
        let candidate = Candidate::seeded(1, "program p\n\nend program p\n".to_string());
        assert_eq!(candidate.origin, Origin::Seeded);
        assert_eq!(candidate.loc, 2);
        assert_eq!(candidate.latency, Duration::ZERO);
    }
}
