//! Slack message markup → display text.
//!
//! Slack escapes `<`, `>` and `&` in message bodies and wraps its own markup
//! (links, mentions, channel references, mail addresses) in unescaped angle
//! brackets. [`tokenize`] splits a body into plain text and bracketed
//! [`Token`]s, [`normalize`] renders them with names from a directory
//! snapshot and finally decodes HTML entities.
//!
//! A bracket token is the shortest `<…>` run with a non-empty interior on a
//! single line; anything else is plain text.

use std::borrow::Cow;

use super::directory::Snapshot;

/// One piece of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Text outside any bracket.
    Text(&'a str),
    /// `<http…>` or `<http…|label>`.
    Link {
        /// Target URL.
        url: &'a str,
    },
    /// `<@U…>`.
    Mention {
        /// Mentioned user ID.
        user_id: &'a str,
    },
    /// `<mailto:addr>` or `<mailto:addr|label>`.
    Mail {
        /// Mail address without the `mailto:` scheme.
        address: &'a str,
    },
    /// `<#C…>`.
    ChannelRef {
        /// Referenced channel ID.
        channel_id: &'a str,
    },
    /// Any other bracketed text, brackets included.
    Other(&'a str),
}

/// Split a message body into tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = text;
    let mut plain_start = 0usize;
    let mut offset = 0usize;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let close = after_open.find(['>', '\n']);
        match close {
            Some(close) if close > 0 && after_open.as_bytes()[close] == b'>' => {
                let start = offset + open;
                if start > plain_start {
                    tokens.push(Token::Text(&text[plain_start..start]));
                }
                let interior = &after_open[..close];
                let raw = &text[start..start + close + 2];
                tokens.push(classify(interior, raw));

                let consumed = open + close + 2;
                offset += consumed;
                rest = &rest[consumed..];
                plain_start = offset;
            }
            _ => {
                // Lone '<': keep it as text and keep scanning after it.
                offset += open + 1;
                rest = after_open;
            }
        }
    }

    if plain_start < text.len() {
        tokens.push(Token::Text(&text[plain_start..]));
    }
    tokens
}

/// Classify a bracket interior by its prefix.
fn classify<'a>(interior: &'a str, raw: &'a str) -> Token<'a> {
    let before_label = |s: &'a str| s.split_once('|').map_or(s, |(head, _)| head);

    if interior.starts_with("http") {
        Token::Link {
            url: before_label(interior),
        }
    } else if let Some(id) = interior.strip_prefix('@').filter(|id| id.starts_with('U')) {
        Token::Mention {
            user_id: before_label(id),
        }
    } else if let Some(address) = interior.strip_prefix("mailto:") {
        Token::Mail {
            address: before_label(address),
        }
    } else if let Some(id) = interior.strip_prefix('#').filter(|id| id.starts_with('C')) {
        Token::ChannelRef {
            channel_id: before_label(id),
        }
    } else {
        Token::Other(raw)
    }
}

/// Render a message body for display.
#[must_use]
pub fn normalize(text: &str, directory: &Snapshot) -> String {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Text(s) | Token::Other(s) => out.push_str(s),
            Token::Link { url } => out.push_str(url),
            Token::Mail { address } => out.push_str(address),
            Token::Mention { user_id } => {
                out.push('@');
                match directory.user(user_id) {
                    Some(user) if !user.profile.display_name.is_empty() => {
                        out.push_str(&user.profile.display_name);
                    }
                    Some(user) if !user.name.is_empty() => out.push_str(&user.name),
                    _ => out.push_str(user_id),
                }
            }
            Token::ChannelRef { channel_id } => {
                out.push('#');
                match directory.channel_by_id(channel_id) {
                    Some(channel) => out.push_str(&channel.name),
                    None => out.push_str(channel_id),
                }
            }
        }
    }

    if let Cow::Owned(decoded) = html_escape::decode_html_entities(&out) {
        return decoded;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::directory::tests::sample_directory;

    fn render(text: &str) -> String {
        normalize(text, &sample_directory().snapshot())
    }

    #[test]
    fn test_mentions() {
        assert_eq!(render("<@U1>"), "@alice");
        assert_eq!(render("<@U2> hi"), "@bob hi");
        assert_eq!(render("<@U9>"), "@U9");
    }

    #[test]
    fn test_links() {
        assert_eq!(render("<http://x>"), "http://x");
        assert_eq!(render("<http://x|label>"), "http://x");
        assert_eq!(render("see <https://a.b/c?d=e|a.b>!"), "see https://a.b/c?d=e!");
    }

    #[test]
    fn test_mail() {
        assert_eq!(render("<mailto:a@b|l>"), "a@b");
        assert_eq!(render("<mailto:a@b>"), "a@b");
    }

    #[test]
    fn test_channels() {
        assert_eq!(render("<#C1>"), "#general");
        assert_eq!(render("<#C1|general>"), "#general");
        assert_eq!(render("<#C404>"), "#C404");
    }

    #[test]
    fn test_other_brackets_preserved() {
        assert_eq!(render("<foo>"), "<foo>");
        assert_eq!(render("<fooBarBaz &lt; &gt;>"), "<fooBarBaz < >>");
    }

    #[test]
    fn test_entities_decoded_after_substitution() {
        assert_eq!(render("a &lt;b&gt; &amp; c"), "a <b> & c");
        // An escaped mention is text, not markup.
        assert_eq!(render("&lt;@U1&gt;"), "<@U1>");
    }

    #[test]
    fn test_mixed_message() {
        let raw = "<@U1> foobars &lt; &gt; <http://www.test.com> or \
                   <http://www.test.com|test.com> in <#C2> for <mailto:test@example.com|test@example.com>";
        assert_eq!(
            render(raw),
            "@alice foobars < > http://www.test.com or http://www.test.com in #dev for test@example.com"
        );
    }

    #[test]
    fn test_lone_and_empty_brackets_are_text() {
        assert_eq!(render("a < b"), "a < b");
        assert_eq!(render("<>"), "<>");
        assert_eq!(render("<a\nb> <@U1>"), "<a\nb> @alice");
        assert_eq!(render("trailing <"), "trailing <");
    }

    #[test]
    fn test_tokenize_shapes() {
        assert_eq!(
            tokenize("hi <@U1|al> <#C1>"),
            vec![
                Token::Text("hi "),
                Token::Mention { user_id: "U1" },
                Token::Text(" "),
                Token::ChannelRef { channel_id: "C1" },
            ]
        );
        assert_eq!(tokenize("<@here>"), vec![Token::Other("<@here>")]);
        assert!(tokenize("").is_empty());
    }
}
