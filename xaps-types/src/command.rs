//! Line grammar for the mail-server command channel.
//!
//! One request line looks like:
//!
//! ```text
//! REGISTER aps-account-id="AAA"\taps-device-token="BBB"\t...
//! ```
//!
//! The command name is separated from the arguments by a single space;
//! arguments are tab-separated `key=value` pairs. A value is either a quoted
//! string (`"..."`, backslash-unescaped) or a quoted list (`("a","b")`).

use std::collections::HashMap;

use crate::CommandParseError;

/// The closed set of commands the daemon understands.
///
/// Unknown names are handled at the single `None` arm of the lookup rather
/// than through a catch-all dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    /// Register a device for mailbox notifications.
    Register,
    /// Notify registered devices about new mail in a mailbox.
    Notify,
}

impl CommandName {
    /// Look up a command by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "REGISTER" => Some(Self::Register),
            "NOTIFY" => Some(Self::Notify),
            _ => None,
        }
    }
}

/// One argument value: a string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// A quoted string value.
    Str(String),
    /// A quoted list value.
    List(Vec<String>),
}

/// One parsed request line, transient for the duration of its processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name as received on the wire.
    pub name: String,
    /// Parsed arguments by key.
    pub args: HashMap<String, ArgValue>,
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let (name, rest) = line.split_once(' ').ok_or(CommandParseError::MissingName)?;
        if name.is_empty() {
            return Err(CommandParseError::MissingName);
        }

        let mut args = HashMap::new();
        for pair in rest.split('\t') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CommandParseError::MissingSeparator {
                    pair: pair.to_string(),
                })?;
            args.insert(key.to_string(), parse_value(key, value)?);
        }

        Ok(Self {
            name: name.to_string(),
            args,
        })
    }

    /// Get a string argument, if present and a string.
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        match self.args.get(name) {
            Some(ArgValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Get a list argument, if present and a list.
    pub fn list_arg(&self, name: &str) -> Option<&[String]> {
        match self.args.get(name) {
            Some(ArgValue::List(values)) => Some(values),
            _ => None,
        }
    }
}

fn parse_value(key: &str, value: &str) -> Result<ArgValue, CommandParseError> {
    if let Some(inner) = strip_delimiters(value, '"', '"') {
        return Ok(ArgValue::Str(unescape(inner)));
    }
    if let Some(inner) = strip_delimiters(value, '(', ')') {
        return Ok(ArgValue::List(parse_list(key, inner)?));
    }
    Err(CommandParseError::InvalidValue {
        key: key.to_string(),
    })
}

/// Parse the interior of a quoted list.
///
/// Elements are split on commas before unquoting, matching the original
/// protocol; a comma inside a quoted element is not representable.
fn parse_list(key: &str, inner: &str) -> Result<Vec<String>, CommandParseError> {
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|element| {
            strip_delimiters(element, '"', '"')
                .map(unescape)
                .ok_or_else(|| CommandParseError::InvalidValue {
                    key: key.to_string(),
                })
        })
        .collect()
}

/// Strip a leading and trailing delimiter pair, or return None.
fn strip_delimiters(value: &str, open: char, close: char) -> Option<&str> {
    if value.len() >= 2 && value.starts_with(open) && value.ends_with(close) {
        Some(&value[open.len_utf8()..value.len() - close.len_utf8()])
    } else {
        None
    }
}

/// Decode standard backslash escapes; unrecognized escapes pass through.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_line() {
        let line = concat!(
            "REGISTER aps-account-id=\"A1\"\taps-device-token=\"AB12\"\t",
            "aps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"stefan\"\t",
            "dovecot-mailboxes=(\"Inbox\",\"Notes\")"
        );

        let command = Command::parse(line).unwrap();
        assert_eq!(command.name, "REGISTER");
        assert_eq!(CommandName::from_name(&command.name), Some(CommandName::Register));
        assert_eq!(command.str_arg("aps-account-id"), Some("A1"));
        assert_eq!(command.str_arg("aps-device-token"), Some("AB12"));
        assert_eq!(command.str_arg("dovecot-username"), Some("stefan"));
        assert_eq!(
            command.list_arg("dovecot-mailboxes"),
            Some(&["Inbox".to_string(), "Notes".to_string()][..])
        );
    }

    #[test]
    fn parses_notify_line() {
        let command =
            Command::parse("NOTIFY dovecot-username=\"stefan\"\tdovecot-mailbox=\"Inbox\"")
                .unwrap();
        assert_eq!(CommandName::from_name(&command.name), Some(CommandName::Notify));
        assert_eq!(command.str_arg("dovecot-mailbox"), Some("Inbox"));
    }

    #[test]
    fn unknown_name_is_not_in_the_closed_set() {
        assert_eq!(CommandName::from_name("HELO"), None);
    }

    #[test]
    fn escaped_characters_are_decoded() {
        let command = Command::parse(r#"NOTIFY key="a\"b\\c\nd""#).unwrap();
        assert_eq!(command.str_arg("key"), Some("a\"b\\c\nd"));
    }

    #[test]
    fn unknown_escape_passes_through() {
        let command = Command::parse(r#"NOTIFY key="a\qb""#).unwrap();
        assert_eq!(command.str_arg("key"), Some(r"a\qb"));
    }

    #[test]
    fn empty_list_parses() {
        let command = Command::parse("REGISTER dovecot-mailboxes=()").unwrap();
        assert_eq!(command.list_arg("dovecot-mailboxes"), Some(&[][..]));
    }

    #[test]
    fn line_without_arguments_fails() {
        assert!(matches!(
            Command::parse("REGISTER"),
            Err(CommandParseError::MissingName)
        ));
    }

    #[test]
    fn pair_without_separator_fails() {
        assert!(matches!(
            Command::parse("NOTIFY novalue"),
            Err(CommandParseError::MissingSeparator { .. })
        ));
    }

    #[test]
    fn bare_value_fails() {
        assert!(matches!(
            Command::parse("NOTIFY key=bare"),
            Err(CommandParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn mismatched_arg_kind_returns_none() {
        let command = Command::parse("NOTIFY key=\"x\"\tlist=(\"y\")").unwrap();
        assert_eq!(command.list_arg("key"), None);
        assert_eq!(command.str_arg("list"), None);
    }
}
