//! Code extraction from oracle answers
//!
//! The oracle answers in free text. Extraction pulls out the first block
//! fenced for the target language. When there is no such block the whole
//! answer is commented out, so the artifact is inert prose that fails to
//! compile and re-enters the fix loop instead of running as a program.
//! Lines opening with a backtick are always commented out afterwards.

use crate::language::TargetLanguage;

/// Result of extracting code from one oracle answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub code: String,
    /// Non-blank lines in `code`
    pub loc: usize,
    /// Whether a fenced block was found
    pub fenced: bool,
    /// Lines commented out because they opened with a backtick
    pub neutralized: usize,
}

impl Extraction {
    fn empty() -> Self {
        Self {
            code: String::new(),
            loc: 0,
            fenced: false,
            neutralized: 0,
        }
    }
}

/// Extract a source artifact from `raw` for `lang`.
pub fn extract(raw: &str, lang: &TargetLanguage) -> Extraction {
    if raw.trim().is_empty() {
        return Extraction::empty();
    }

    let (lines, fenced) = match fenced_block(raw, lang) {
        Some(lines) => (lines, true),
        None => (comment_all(raw, lang), false),
    };

    let mut neutralized = 0;
    let lines: Vec<String> = lines
        .into_iter()
        .map(|line| {
            if line.trim_start().starts_with('`') {
                neutralized += 1;
                lang.comment_out(&line)
            } else {
                line
            }
        })
        .collect();

    let code = lines.join("\n");
    Extraction {
        loc: count_loc(&code),
        code,
        fenced,
        neutralized,
    }
}

/// Count non-blank lines
pub fn count_loc(code: &str) -> usize {
    code.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Lines between the first opening fence for `lang` and the next closing
/// fence (or end of text), exclusive of both markers.
fn fenced_block(raw: &str, lang: &TargetLanguage) -> Option<Vec<String>> {
    let mut lines = raw.lines();
    lines.by_ref().find(|line| lang.is_fence_open(line))?;

    Some(
        lines
            .take_while(|line| !lang.is_fence_close(line))
            .map(str::to_string)
            .collect(),
    )
}

fn comment_all(raw: &str, lang: &TargetLanguage) -> Vec<String> {
    raw.lines()
        .map(|line| {
            if lang.is_comment(line) {
                line.to_string()
            } else {
                lang.comment_out(line)
            }
        })
        .collect()
}
