//! IRC line parsing and formatting.
//!
//! ```text
//! [:prefix] COMMAND [middle ...] [:trailing]
//! ```

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Source (`nick!user@host` or server name), without the colon.
    pub prefix: Option<String>,
    /// Command or numeric, upper-cased.
    pub command: String,
    /// Parameters; the trailing parameter, if any, is last.
    pub params: Vec<String>,
}

impl Line {
    /// Parse a line without its CRLF terminator.
    ///
    /// Returns `None` for empty lines or lines without a command.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']);

        let prefix = match rest.strip_prefix(':') {
            Some(tail) => {
                let (prefix, tail) = tail.split_once(' ')?;
                rest = tail;
                Some(prefix.to_string())
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => match rest.strip_prefix(':') {
                Some(trailing) => ("", Some(trailing)),
                None => (rest, None),
            },
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix.
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    /// Parameter at `index`.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Body of a CTCP `ACTION` (`/me`), if `text` is one.
#[must_use]
pub fn ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('\u{1}')?;
    let inner = inner.strip_suffix('\u{1}').unwrap_or(inner);
    inner.strip_prefix("ACTION ").or_else(|| (inner == "ACTION").then_some(""))
}

/// Format a raw command line, CRLF-terminated.
///
/// Embedded CR/LF would split the line on the wire, so they are removed.
#[must_use]
pub fn format_line(command: &str, params: &[&str], trailing: Option<&str>) -> String {
    let mut line = String::from(command);
    for param in params {
        line.push(' ');
        line.push_str(param);
    }
    if let Some(trailing) = trailing {
        line.push_str(" :");
        line.push_str(trailing);
    }
    line.retain(|c| c != '\r' && c != '\n');
    line.push_str("\r\n");
    line
}

/// Next nickname to try after `current` was rejected.
///
/// Appends `_`; once `current` is more than three characters longer than
/// `base`, starts over from `base`.
#[must_use]
pub fn next_nick(base: &str, current: &str) -> String {
    if current.len() > base.len() + 3 {
        base.to_string()
    } else {
        format!("{current}_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let line = Line::parse(":alice!a@host PRIVMSG #chan :hello there\r\n").unwrap();
        assert_eq!(line.prefix.as_deref(), Some("alice!a@host"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#chan", "hello there"]);
        assert_eq!(line.nick(), Some("alice"));
    }

    #[test]
    fn test_parse_without_prefix() {
        let line = Line::parse("PING :irc.example.net").unwrap();
        assert!(line.prefix.is_none());
        assert_eq!(line.command, "PING");
        assert_eq!(line.param(0), Some("irc.example.net"));
        assert!(line.nick().is_none());
    }

    #[test]
    fn test_parse_numeric_with_middle_params() {
        let line = Line::parse(":srv 433 * bridge :Nickname is already in use").unwrap();
        assert_eq!(line.command, "433");
        assert_eq!(line.params, vec!["*", "bridge", "Nickname is already in use"]);
        assert_eq!(line.nick(), Some("srv"));
    }

    #[test]
    fn test_parse_trailing_keeps_colons_and_spaces() {
        let line = Line::parse(":a PRIVMSG #c :see: http://x  y").unwrap();
        assert_eq!(line.param(1), Some("see: http://x  y"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Line::parse("").is_none());
        assert!(Line::parse("\r\n").is_none());
        assert!(Line::parse(":prefixonly").is_none());
    }

    #[test]
    fn test_ctcp_action() {
        assert_eq!(ctcp_action("\u{1}ACTION waves\u{1}"), Some("waves"));
        assert_eq!(ctcp_action("\u{1}ACTION waves"), Some("waves"));
        assert_eq!(ctcp_action("\u{1}VERSION\u{1}"), None);
        assert_eq!(ctcp_action("plain"), None);
    }

    #[test]
    fn test_format_line_strips_newlines() {
        assert_eq!(
            format_line("PRIVMSG", &["#c"], Some("a\r\nb")),
            "PRIVMSG #c :ab\r\n"
        );
        assert_eq!(format_line("JOIN", &["#c"], None), "JOIN #c\r\n");
    }

    #[test]
    fn test_next_nick_wraps_past_three_extra_chars() {
        assert_eq!(next_nick("bot", "bot"), "bot_");
        assert_eq!(next_nick("bot", "bot_"), "bot__");
        assert_eq!(next_nick("bot", "bot__"), "bot___");
        assert_eq!(next_nick("bot", "bot___"), "bot____");
        assert_eq!(next_nick("bot", "bot____"), "bot");
    }
}
