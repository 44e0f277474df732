use serde::{Deserialize, Serialize};

/// An execution target. `run_cmd` is a template with a single `%s`
/// substitution point for inline code; `compile_cmd`, when present, takes the
/// sanitized compiler options at its `%s`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
    /// Filename the source is written to inside a sandbox (e.g. "main.py").
    pub source_file: String,
    pub compile_cmd: Option<String>,
    pub run_cmd: String,
    /// True for multi-file project submissions that ship their own
    /// compile/run scripts.
    pub is_project: bool,
}

impl Language {
    pub fn is_compiled(&self) -> bool {
        self.compile_cmd.is_some()
    }
}

/// Returns the canonical name for a (possibly misspelled) language tag.
/// Unknown tags pass through unchanged.
pub fn normalize_language(lang: &str) -> String {
    let normalized = match lang.to_lowercase().as_str() {
        "js" | "jscript" | "javscript" | "javsscript" | "javascipt" | "javasript"
        | "javascript" | "java script" | "jscipt" => "Javascript",
        "python" | "pyt" | "pyn" | "pythn" | "phyton" | "py" | "py thon" | "pthon" => "Python",
        "go" | "golang" | "gol" | "goo" | "g o" | "golangg" => "Golang",
        other => return other.to_string(),
    };
    normalized.to_string()
}
