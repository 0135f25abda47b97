//! Text form of the per-file counter registry.
//!
//! Instrumented scripts keep their counters in a process-wide object keyed by
//! file path. Each file's entry maps a 1-indexed line number to the number of
//! times that line ran. This module renders the fragments that create the
//! registry, register a file's table, and bump a single line's counter.
//!
//! Every fragment renders on one physical line so that injecting it never
//! shifts line numbers in the instrumented file.

use std::collections::BTreeMap;

/// Global expression holding the registry in instrumented programs.
pub const DEFAULT_REGISTRY: &str = "process.__blanket";

/// How instrumented code addresses the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySyntax {
    /// Assignable expression, e.g. `process.__blanket` or `globalThis.__cov`.
    pub global: String,
}

impl Default for RegistrySyntax {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY)
    }
}

impl RegistrySyntax {
    pub fn new(global: impl Into<String>) -> Self {
        Self {
            global: global.into(),
        }
    }
}

/// Counter table for one instrumented file, as registered at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTable {
    /// Registry key, normally the absolute path of the file.
    pub file: String,
    /// Line number to count. Always starts at zero for every line.
    pub counts: BTreeMap<usize, u64>,
}

impl CounterTable {
    /// Creates a zeroed table covering lines `1..=lines`.
    pub fn new(file: &str, lines: usize) -> Self {
        Self {
            file: file.to_string(),
            counts: (1..=lines).map(|line| (line, 0)).collect(),
        }
    }

    pub fn lines(&self) -> usize {
        self.counts.len()
    }

    /// The file key as a quoted script string literal.
    pub fn key(&self) -> String {
        // U+2028/U+2029 terminate a line in script source.
        serde_json::Value::String(self.file.clone())
            .to_string()
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029")
    }

    /// Creates the registry if missing and registers this table under its key.
    pub fn header(&self, syntax: &RegistrySyntax) -> String {
        let g = &syntax.global;
        let entries: Vec<String> = self
            .counts
            .iter()
            .map(|(line, count)| format!("\"{line}\":{count}"))
            .collect();
        format!(
            "if (typeof {g} === \"undefined\") {{ {g} = {{}}; }} {g}[{key}] = {{{table}}};",
            key = self.key(),
            table = entries.join(","),
        )
    }

    /// Statement appended to `line` that counts one execution of it.
    pub fn increment(&self, syntax: &RegistrySyntax, line: usize) -> String {
        format!("; {}[{}][{}]++;", syntax.global, self.key(), line)
    }
}
