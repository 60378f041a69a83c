// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Parses step output files (and captured stdout) into string maps.

use std::collections::HashMap;

/// Parses an output blob as JSON (if the first non-whitespace byte is `{`) or
/// as `KEY=VALUE` lines otherwise. Invalid key-value lines are skipped, not
/// fatal: the caller is expected to log a warning for each one skipped.
pub fn parse_output(content: &str) -> (HashMap<String, String>, Vec<String>) {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') {
        return parse_json(trimmed);
    }
    parse_key_value(content)
}

fn parse_json(content: &str) -> (HashMap<String, String>, Vec<String>) {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(map)) => {
            let outputs = map
                .into_iter()
                .map(|(k, v)| (k, value_to_string(&v)))
                .collect();
            (outputs, vec![])
        }
        Ok(_) => (HashMap::new(), vec!["top-level JSON value is not an object".to_string()]),
        Err(e) => (HashMap::new(), vec![format!("invalid JSON: {e}")]),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_key_value(content: &str) -> (HashMap<String, String>, Vec<String>) {
    let mut outputs = HashMap::new();
    let mut warnings = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                let value = unquote(value.trim());
                if key.is_empty() {
                    warnings.push(format!("skipping line with empty key: '{line}'"));
                    continue;
                }
                outputs.insert(key.to_string(), value);
            }
            None => warnings.push(format!("skipping unparseable line: '{line}'")),
        }
    }

    (outputs, warnings)
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_key_value_lines() {
        let content = "HOST=db.example.com\nPORT=5432\n";
        let (outputs, warnings) = parse_output(content);
        assert_eq!(outputs["HOST"], "db.example.com");
        assert_eq!(outputs["PORT"], "5432");
        assert!(warnings.is_empty());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let content = "# a comment\n\nHOST=db\n";
        let (outputs, _) = parse_output(content);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["HOST"], "db");
    }

    #[test]
    fn handles_quoted_values() {
        let content = "NAME=\"hello world\"\nOTHER='quoted'\n";
        let (outputs, _) = parse_output(content);
        assert_eq!(outputs["NAME"], "hello world");
        assert_eq!(outputs["OTHER"], "quoted");
    }

    #[test]
    fn warns_but_does_not_fail_on_bad_lines() {
        let content = "HOST=db\nnotakeyvalue\n=novalue\n";
        let (outputs, warnings) = parse_output(content);
        assert_eq!(outputs.len(), 1);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn parses_json_object() {
        let content = r#"{"host": "db.example.com", "port": 5432}"#;
        let (outputs, warnings) = parse_output(content);
        assert_eq!(outputs["host"], "db.example.com");
        assert_eq!(outputs["port"], "5432");
        assert!(warnings.is_empty());
    }

    #[test]
    fn non_object_json_is_a_warning() {
        let (outputs, warnings) = parse_output("[1, 2, 3]");
        assert!(outputs.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
