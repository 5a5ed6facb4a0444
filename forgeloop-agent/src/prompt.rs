//! Prompt text sent to the oracle

use forgeloop_core::TargetLanguage;

/// The first prompt: the specification, optionally with prior code as context
pub fn initial(spec: &str, existing: Option<&str>, lang: &TargetLanguage) -> String {
    match existing {
        Some(code) => format!(
            "{}\n\nUse the following existing code as a starting point:\n{}",
            spec.trim_end(),
            lang.fenced(code.trim_end())
        ),
        None => spec.to_string(),
    }
}

pub fn compile_fix(code: &str, diagnostic: &str, lang: &TargetLanguage) -> String {
    format!(
        "The following {} code failed to compile: \n{}\nError: {}\nPlease fix the code and return it in a ```{}``` block.",
        lang.name,
        lang.fenced(code),
        diagnostic.trim_end(),
        lang.fence_tag
    )
}

pub fn runtime_fix(code: &str, error: &str, input: &str, lang: &TargetLanguage) -> String {
    format!(
        "The following {} code compiled but failed when run with input {:?}: \n{}\nError: {}\nPlease fix the code and return it in a ```{}``` block.",
        lang.name,
        input,
        lang.fenced(code),
        error.trim_end(),
        lang.fence_tag
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_without_existing_is_unchanged() {
        let lang = TargetLanguage::fortran();
        assert_eq!(initial("Write a program.", None, &lang), "Write a program.");
    }

    #[test]
    fn test_initial_with_existing() {
        let lang = TargetLanguage::fortran();
        let prompt = initial("Write a program.\n", Some("program p\nend program p\n"), &lang);
        assert_eq!(
            prompt,
            "Write a program.\n\nUse the following existing code as a starting point:\n```fortran\nprogram p\nend program p\n```"
        );
    }

    #[test]
    fn test_compile_fix_carries_code_and_diagnostic() {
        let lang = TargetLanguage::fortran();
        let prompt = compile_fix("x = ", "foo.f90:1:4: Error: Syntax error\n", &lang);
        assert!(prompt.starts_with("The following Fortran code failed to compile: \n```fortran\nx = \n```"));
        assert!(prompt.contains("Error: foo.f90:1:4: Error: Syntax error\nPlease fix"));
        assert!(prompt.ends_with("return it in a ```fortran``` block."));
    }

    #[test]
    fn test_runtime_fix_mentions_input() {
        let lang = TargetLanguage::c();
        let prompt = runtime_fix("int main(){}", "Segmentation fault", "5\n", &lang);
        assert!(prompt.contains("failed when run with input \"5\\n\""));
        assert!(prompt.contains("```c\nint main(){}\n```"));
        assert!(prompt.contains("Error: Segmentation fault"));
    }
}
