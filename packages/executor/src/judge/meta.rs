//! Parsing of the sandbox metadata file (`key:value` per line).

use std::collections::HashMap;

/// Parses isolate's metadata file. Malformed lines are skipped.
pub fn parse_metadata(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .collect()
}

/// Right-trims spaces and tabs from every line, then from the joined text.
/// Used to compare program output against the expected output.
pub fn strip(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}
