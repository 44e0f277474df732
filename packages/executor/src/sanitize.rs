//! Static pre-execution screening of submitted source code.
//!
//! Categories are data, not code: each is a named list of regular
//! expressions, compiled exactly once on first use. The common set applies to
//! every submission, then the set for the submission's language tag. The
//! first matching category rejects the submission before it reaches the
//! execution pool.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SanitizeError {
    #[error("code length exceeds maximum limit: max length allowed is {max_length}")]
    TooLong { max_length: usize },

    #[error("prohibited {language} operation detected: {category}")]
    Prohibited {
        language: String,
        category: String,
        details: String,
    },
}

impl SanitizeError {
    pub fn category(&self) -> &str {
        match self {
            Self::TooLong { .. } => "maxCodeLength",
            Self::Prohibited { category, .. } => category,
        }
    }
}

/// A named list of rejection patterns.
struct PatternCategory {
    name: &'static str,
    description: &'static str,
    patterns: &'static [&'static str],
}

struct CompiledCategory {
    name: &'static str,
    description: &'static str,
    regexes: Vec<Regex>,
}

struct PatternTable {
    common: Vec<CompiledCategory>,
    language: HashMap<&'static str, Vec<CompiledCategory>>,
}

static COMMON: &[PatternCategory] = &[
    PatternCategory {
        name: "systemOperations",
        description: "Dangerous system operations",
        patterns: &[
            r"(?i)(os\.Remove|os\.RemoveAll)",
            r"(?i)(net\.Listen|net\.Dial)",
            r"(?i)(exec\.Command)",
            r"(?i)(syscall\.Exec)",
        ],
    },
    PatternCategory {
        name: "codeExecution",
        description: "Dynamic code execution",
        patterns: &[r"eval\(", r"exec\("],
    },
    PatternCategory {
        name: "resourceDepletion",
        description: "Resource depletion attacks",
        patterns: &[
            r"(?i)while\s*\(\s*true\s*\)",
            r"(?i)while\s*\(\s*1\s*\)",
            r"(?i)for\s*\(\s*;;\s*\)",
            r"(?i)for\s*\(;\s*true\s*;\)",
            r"(?i)\.repeat\s*\(\s*Infinity\s*\)",
            r"\[\s*\.\.\.Array\s*\(\s*1e\d+\s*\)\s*\]",
            r"Array\s*\(\s*1e\d+\s*\)",
            r"BigInt\s*\(\s*Number\.MAX_SAFE_INTEGER\s*\)\s*\*\s*BigInt",
            r"(?i)setTimeout\s*\(\s*function\s*\(\s*\)\s*\{\s*while\s*\(\s*true\s*\)",
        ],
    },
    PatternCategory {
        name: "forkBombs",
        description: "Fork bomb attacks",
        patterns: &[
            r"(?i)while\s*\(\s*true\s*\)\s*\{\s*fork\s*\(\s*\)",
            r"(?i)for\s*\(;;\)\s*\{\s*fork\s*\(\s*\)",
            // Bash fork bomb
            r":\s*\(\)\s*\{\s*:\|:\s*&\s*\}\s*;\s*:",
            // Lisp fork bomb
            r"define\s+f\s+\(\)\s+\(f\)&\s*f",
            r#"(?i)while\s+1;\s+do\s+sh\s+-c\s+"\$0\s+&""#,
            r"Process\.fork\(\)",
            r"cluster\.fork\(\)",
            r"multiprocessing\.Process",
            r"pthread_create",
        ],
    },
];

static PYTHON: &[PatternCategory] = &[
    PatternCategory {
        name: "dangerousModules",
        description: "Dangerous Python modules",
        patterns: &[
            r"import\s+os\s*$",
            r"from\s+os\s+import\s+(system|popen|execl|execle|execlp|execv|execve|execvp|execvpe|spawn)",
            r"import\s+subprocess",
            r"import\s+shutil",
            r"import\s+ctypes",
            r"import\s+sys",
            r#"__import__\(['"]os['"]"#,
        ],
    },
    PatternCategory {
        name: "dangerousOperations",
        description: "Dangerous Python operations",
        patterns: &[
            r#"open\(.+,\s*['"]w['"]"#,
            r"__import__\(",
            r"globals\(\)\.",
            r"locals\(\)\.",
            r"os\.system\(",
            r"os\.exec\(",
            r"subprocess\.Popen\(",
            r"os\.fork\(",
            r"threading\.Thread\s*\(.*bomb\(\)",
            r"for\s*\(.*\s*os\.fork\(\)",
            r"while\s*True\s*:\s*os\.fork\(\)",
        ],
    },
    PatternCategory {
        name: "pythonResourceDepletion",
        description: "Python resource depletion attacks",
        patterns: &[
            r"while\s+True\s*:",
            r"\[\s*0\s*\]\s*\*\s*10\*\*\d+",
            r"range\s*\(\s*10\s*\*\*\s*\d{2,}\s*\)",
            r"'\s*'\s*\.join\s*\(\s*\[\s*'A'\s*\]\s*\*\s*10\*\*\d+\s*\)",
            r"multiprocessing\.Pool\s*\(\s*processes\s*=\s*\d{3,}\s*\)",
            r"threading\.Thread\s*\(\s*target\s*=\s*.+\s*\)\s*\.start\s*\(\s*\)",
            // Regex denial of service
            r"\{\s*\.\*\s*\.\*\s*\.\*\s*\.\*\s*\}",
        ],
    },
];

static GO: &[PatternCategory] = &[
    PatternCategory {
        name: "infiniteLoops",
        description: "Potential infinite loops",
        patterns: &[r"for\s*\{", r"for\s+true\s*\{", r"for\s+;\s*;\s*\{"],
    },
    PatternCategory {
        name: "dangerousOsFunctions",
        description: "Dangerous OS functions",
        patterns: &[
            r"os\.Remove",
            r"os\.RemoveAll",
            r"os\.Chdir",
            r"os\.Chmod",
            r"os\.Chown",
            r"os\.Exit",
            r"os\.Link",
            r"os\.MkdirAll",
            r"os\.Rename",
            r"os\.Symlink",
        ],
    },
    PatternCategory {
        name: "goResourceDepletion",
        description: "Go resource depletion attacks",
        patterns: &[
            r"make\s*\(\s*\[\]\w+\s*,\s*\d{8,}\s*\)",
            r"go\s+func\s*\(\s*\)\s*\{\s*for\s*\{",
            r"for\s*i\s*:=\s*0\s*;\s*;\s*i\+\+",
            r"runtime\.GOMAXPROCS\s*\(\s*\d{3,}\s*\)",
            r"len\s*\(\s*make\s*\(\s*\[\]byte\s*,\s*1<<\d{2,}\s*\)\s*\)",
        ],
    },
];

static JS: &[PatternCategory] = &[
    PatternCategory {
        name: "dangerousModules",
        description: "Dangerous JS modules",
        patterns: &[
            r#"require\(['"]fs['"]"#,
            r#"require\(['"]child_process['"]"#,
            r#"require\(['"]http['"]"#,
            r#"require\(['"]https['"]"#,
            r#"require\(['"]os['"]"#,
            r#"import\s+.*\s+from\s+['"]fs['"]"#,
            r#"import\s+.*\s+from\s+['"]child_process['"]"#,
        ],
    },
    PatternCategory {
        name: "dangerousOperations",
        description: "Dangerous JS operations",
        patterns: &[
            r"process\.exit",
            r"Function\(.*\)",
            r"new Function",
            r"window\.",
            r"document\.",
            r"localStorage",
            r"sessionStorage",
            r"indexedDB",
            r"WebSocket",
        ],
    },
    PatternCategory {
        name: "jsResourceDepletion",
        description: "JavaScript resource depletion attacks",
        patterns: &[
            r"while\s*\(\s*true\s*\)",
            r"for\s*\(\s*;;\s*\)",
            r"setTimeout\s*\(\s*function\s*\(\s*\)\s*\{\s*location\.reload\s*\(\s*\)",
            r"\.repeat\s*\(\s*1e\d+\s*\)",
            r"Array\s*\(\s*1e\d+\s*\)",
            r"new\s+Array\s*\(\s*1e\d+\s*\)",
            r"\[\s*\.\.\.Array\s*\(\s*1e\d+\s*\)\s*\]",
            r"(?i)\(\+\[\]\+\[\]\+\[\]\+\[\]\+\[\]\+\[\]\+\[\]",
        ],
    },
];

static CPP: &[PatternCategory] = &[
    PatternCategory {
        name: "dangerousOperations",
        description: "Dangerous C++ operations",
        patterns: &[
            r"system\(",
            r"exec\(",
            r"fork\(",
            r"popen\(",
            r"delete\s+.*\s+;",
            r"new\s+.*\s*;",
            r"std::system",
        ],
    },
    PatternCategory {
        name: "cppResourceDepletion",
        description: "C++ resource depletion attacks",
        patterns: &[
            r"while\s*\(\s*true\s*\)",
            r"for\s*\(\s*;;\s*\)",
            r"malloc\s*\(\s*UINT_MAX\s*\)",
            r"calloc\s*\(\s*UINT_MAX",
            r"new\s+char\s*\[\s*UINT_MAX\s*\]",
            r"std::vector<\w+>\s*\(\s*\d{9,}\s*\)",
            r"std::thread\s*\(\s*\[\]\s*\(\s*\)\s*\{\s*while\s*\(\s*true\s*\)",
            r"#include\s*<fork.h>",
        ],
    },
];

static TABLE: LazyLock<PatternTable> = LazyLock::new(|| {
    let compile = |categories: &[PatternCategory]| -> Vec<CompiledCategory> {
        categories
            .iter()
            .map(|c| CompiledCategory {
                name: c.name,
                description: c.description,
                regexes: c
                    .patterns
                    .iter()
                    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("bad pattern {p:?}: {e}")))
                    .collect(),
            })
            .collect()
    };

    let mut language = HashMap::new();
    language.insert("python", compile(PYTHON));
    language.insert("go", compile(GO));
    language.insert("js", compile(JS));
    language.insert("cpp", compile(CPP));

    PatternTable {
        common: compile(COMMON),
        language,
    }
});

/// Maps language tags (and their canonical names) onto pattern table keys.
fn table_key(language: &str) -> String {
    match language.to_lowercase().as_str() {
        "javascript" | "node" => "js".to_string(),
        "golang" => "go".to_string(),
        "c++" => "cpp".to_string(),
        other => other.to_string(),
    }
}

/// Screens `code` against the length cap, the common categories, and the
/// categories registered for `language`. A rejection is terminal: the
/// submission must not be enqueued.
pub fn sanitize(code: &str, language: &str, max_code_length: usize) -> Result<(), SanitizeError> {
    if code.len() > max_code_length {
        return Err(SanitizeError::TooLong {
            max_length: max_code_length,
        });
    }

    let table = &*TABLE;
    let key = table_key(language);

    let language_categories = table
        .language
        .get(key.as_str())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for category in table.common.iter().chain(language_categories) {
        if category.regexes.iter().any(|r| r.is_match(code)) {
            return Err(SanitizeError::Prohibited {
                language: language.to_string(),
                category: category.name.to_string(),
                details: category.description.to_string(),
            });
        }
    }

    Ok(())
}
