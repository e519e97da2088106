//! Flat `key=value` property stream parsing
//!
//! Used for both post-processor output and the rc configuration file.
//! The accepted syntax is the common subset of `.properties` files:
//!
//! ```text
//! # comment
//! ! also a comment
//! key=value
//! key: value
//! key value
//! long.key = first part \
//!            continued
//! ```
//!
//! Parsing is best effort. Lines that are not valid UTF-8 or that have no
//! key are dropped instead of failing the whole stream.

use std::collections::HashMap;

/// Result of parsing a property stream
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedProperties {
    pub values: HashMap<String, String>,
    /// Non-blank, non-comment lines that yielded nothing
    pub dropped_lines: usize,
    /// Lines holding a key/value pair
    pub parsed_lines: usize,
}

impl ParsedProperties {
    /// True if there was content but none of it could be parsed
    pub fn is_malformed(&self) -> bool {
        self.parsed_lines == 0 && self.dropped_lines > 0
    }
}

/// Parse raw bytes (e.g. captured stdout) into properties
pub fn parse_bytes(raw: &[u8]) -> ParsedProperties {
    let mut logical_lines: Vec<String> = Vec::new();
    let mut dropped = 0;
    let mut pending: Option<String> = None;

    for raw_line in raw.split(|b| *b == b'\n') {
        let line = match std::str::from_utf8(raw_line) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(_) => {
                log::debug!("Dropping non-UTF-8 property line");
                dropped += 1;
                pending = None;
                continue;
            }
        };

        let line = match pending.take() {
            Some(mut acc) => {
                acc.push_str(line.trim_start());
                acc
            }
            None => {
                let trimmed = line.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed.to_string()
            }
        };

        if ends_with_continuation(&line) {
            let mut acc = line;
            acc.pop();
            pending = Some(acc);
            continue;
        }
        logical_lines.push(line);
    }
    if let Some(acc) = pending {
        logical_lines.push(acc);
    }

    let mut parsed = ParsedProperties {
        dropped_lines: dropped,
        ..Default::default()
    };
    for line in logical_lines {
        match parse_line(&line) {
            Some((key, value)) => {
                parsed.values.insert(key, value);
                parsed.parsed_lines += 1;
            }
            None => {
                log::debug!("Dropping unparseable property line: {}", line);
                parsed.dropped_lines += 1;
            }
        }
    }
    parsed
}

/// Parse a string into properties
pub fn parse_str(text: &str) -> ParsedProperties {
    parse_bytes(text.as_bytes())
}

/// An odd number of trailing backslashes continues onto the next line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split one logical line at the first unescaped `=`, `:` or whitespace
fn parse_line(line: &str) -> Option<(String, String)> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut key_end = None;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '=' | ':' => {
                key_end = Some((i, true));
                break;
            }
            c if c.is_whitespace() => {
                key_end = Some((i, false));
                break;
            }
            _ => i += 1,
        }
    }

    let (end, explicit) = key_end?;
    let key = unescape(&chars[..end].iter().collect::<String>());
    if key.is_empty() {
        return None;
    }

    let mut rest = &chars[end + 1..];
    if !explicit {
        // "key   = value" style: skip whitespace then an optional separator
        while let Some(c) = rest.first() {
            if c.is_whitespace() {
                rest = &rest[1..];
            } else {
                break;
            }
        }
        if let Some('=') | Some(':') = rest.first() {
            rest = &rest[1..];
        }
    }
    let value: String = rest.iter().collect();
    Some((key, unescape(value.trim_start())))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
