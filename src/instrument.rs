//! Line-based counter injection.
//!
//! Rewrites script text so each line bumps its own counter when it runs. The
//! transform works on raw lines, not on a syntax tree: every line gets an
//! increment statement, blank and comment-only lines included, and the
//! registry header is glued onto the front of line 1. No line is ever added
//! or removed, so line numbers in stack traces from the instrumented file
//! match the uninstrumented source.
//!
//! Lines inside multi-line strings or comments will count incorrectly or not
//! at all. That is the price of staying line-based.

use crate::registry::{CounterTable, RegistrySyntax};

/// Result of instrumenting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub text: String,
    /// Number of lines in the input, and in the counter table.
    pub lines: usize,
}

/// Counts newline-separated lines. A final newline ends the last line rather
/// than starting a new one, and empty text has no lines.
pub fn count_lines(text: &str) -> usize {
    split_lines(text).0.len()
}

/// Instruments `text` for the registry key `path` using the default registry.
pub fn instrument(path: &str, text: &str) -> Instrumented {
    instrument_with(&RegistrySyntax::default(), path, text)
}

/// Instruments `text` for the registry key `path`.
///
/// Deterministic and free of I/O: identical inputs give identical output.
pub fn instrument_with(syntax: &RegistrySyntax, path: &str, text: &str) -> Instrumented {
    let (lines, trailing_newline) = split_lines(text);
    let table = CounterTable::new(path, lines.len());

    let mut out = table.header(syntax);
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        // Keep a CR in place so CRLF files stay CRLF.
        let (code, cr) = match line.strip_suffix('\r') {
            Some(code) => (code, "\r"),
            None => (*line, ""),
        };
        out.push_str(code);
        out.push_str(&table.increment(syntax, idx + 1));
        out.push_str(cr);
    }
    if trailing_newline {
        out.push('\n');
    }

    Instrumented {
        text: out,
        lines: lines.len(),
    }
}

fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    match text.strip_suffix('\n') {
        Some(body) => (body.split('\n').collect(), true),
        None => (text.split('\n').collect(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn counts_lines_like_an_editor() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("\n"), 1);
        assert_eq!(count_lines("a"), 1);
        assert_eq!(count_lines("a\n"), 1);
        assert_eq!(count_lines("a\nb"), 2);
        assert_eq!(count_lines("a\n\nb\n"), 3);
    }

    #[test]
    fn instruments_each_line_in_place() {
        let out = instrument("/src/a.js", "var x = 1;\nvar y = 2;\n");
        assert_eq!(out.lines, 2);

        let lines: Vec<&str> = out.text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_snapshot!(lines[0], @r##"if (typeof process.__blanket === "undefined") { process.__blanket = {}; } process.__blanket["/src/a.js"] = {"1":0,"2":0};var x = 1;; process.__blanket["/src/a.js"][1]++;"##);
        assert_snapshot!(lines[1], @r##"var y = 2;; process.__blanket["/src/a.js"][2]++;"##);
        assert_eq!(lines[2], "");
    }

    #[test]
    fn preserves_line_count() {
        let inputs = [
            "",
            "\n",
            "single",
            "a\nb\nc",
            "a\nb\nc\n",
            "\n\n\n",
            "// comment\n\n  /* block\n  still */\nfoo();\n",
            "a\r\nb\r\n",
        ];
        for input in inputs {
            let out = instrument("/src/x.js", input);
            assert_eq!(out.lines, count_lines(input), "input {input:?}");
            let expected_physical = input.split('\n').count();
            assert_eq!(
                out.text.split('\n').count(),
                expected_physical,
                "input {input:?}"
            );
        }
    }

    #[test]
    fn blank_and_comment_lines_are_instrumented_too() {
        let out = instrument("/f.js", "// only a comment\n\nrun();");
        let lines: Vec<&str> = out.text.split('\n').collect();
        assert!(lines[0].ends_with(r#"// only a comment; process.__blanket["/f.js"][1]++;"#));
        assert_eq!(lines[1], r#"; process.__blanket["/f.js"][2]++;"#);
        assert_eq!(lines[2], r#"run();; process.__blanket["/f.js"][3]++;"#);
    }

    #[test]
    fn empty_input_gets_only_the_header() {
        let out = instrument("/empty.js", "");
        assert_eq!(out.lines, 0);
        assert_snapshot!(out.text, @r##"if (typeof process.__blanket === "undefined") { process.__blanket = {}; } process.__blanket["/empty.js"] = {};"##);
    }

    #[test]
    fn crlf_line_endings_are_kept() {
        let out = instrument("/w.js", "a();\r\nb();\r\n");
        assert_eq!(
            out.text.split('\n').nth(1),
            Some(r#"b();; process.__blanket["/w.js"][2]++;"#.to_string() + "\r").as_deref()
        );
        assert!(out.text.ends_with("\r\n"));
    }

    #[test]
    fn output_is_deterministic() {
        let text = "function f() {\n  return 1;\n}\nf();\n";
        assert_eq!(instrument("/d.js", text), instrument("/d.js", text));
    }

    #[test]
    fn custom_registry_expression() {
        let syntax = RegistrySyntax::new("globalThis.__cov");
        let out = instrument_with(&syntax, "/c.js", "go();");
        assert!(out.text.starts_with(r#"if (typeof globalThis.__cov === "undefined")"#));
        assert!(out.text.ends_with(r#"go();; globalThis.__cov["/c.js"][1]++;"#));
    }
}
