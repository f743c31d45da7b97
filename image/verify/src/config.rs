/*++

Licensed under the Apache-2.0 license.

File Name:

    config.rs

Abstract:

    Reader for the line oriented `key = value` configuration blob supplied
    by the platform configuration collaborator.

--*/

use aegis_error::{AegisError, AegisResult};

/// One `key = value` line
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigEntry<'a> {
    /// One-based line number, for diagnostics
    pub line: usize,

    pub key: &'a str,

    pub value: &'a str,
}

/// Iterator over the entries of a configuration blob
///
/// `#` starts a comment, blank lines are skipped and whitespace around keys
/// and values is trimmed. A line without `=`, or with an empty key or a key
/// containing whitespace, yields `CONFIG_MALFORMED_LINE`.
pub struct ConfigReader<'a> {
    lines: core::str::Lines<'a>,
    line: usize,
}

impl<'a> ConfigReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line: 0,
        }
    }
}

impl<'a> Iterator for ConfigReader<'a> {
    type Item = AegisResult<ConfigEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            self.line += 1;

            let content = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if content.is_empty() {
                continue;
            }

            let Some((key, value)) = content.split_once('=') else {
                log::warn!("[config] line {}: missing '='", self.line);
                return Some(Err(AegisError::CONFIG_MALFORMED_LINE));
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                log::warn!("[config] line {}: invalid key", self.line);
                return Some(Err(AegisError::CONFIG_MALFORMED_LINE));
            }
            return Some(Ok(ConfigEntry {
                line: self.line,
                key,
                value: value.trim(),
            }));
        }
    }
}

/// Parse a decimal or `0x` prefixed hexadecimal integer
pub fn parse_u64(value: &str) -> AegisResult<u64> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| AegisError::CONFIG_INVALID_VALUE)
}

/// Parse `true` or `false`
pub fn parse_bool(value: &str) -> AegisResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(AegisError::CONFIG_INVALID_VALUE),
    }
}
