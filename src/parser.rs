//! Intent parsing — classifies message text into karma commands.
//!
//! Patterns are compiled once at construction and checked in a fixed
//! priority order: show-URL, give-karma, leaderboard, throwback, balance
//! query. Only the first matching pattern is acted upon per message; text
//! that matches nothing is silently ignored.

use std::borrow::Cow;

use regex::Regex;

/// A recognized command with its captured parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Post the public web URL.
    ShowUrl,
    /// Give or take points. `target` is a raw token — a literal handle or a
    /// mention (`<@ID>`) — and `run` is the `++`/`--` run (length ≥ 2).
    GiveKarma {
        target: String,
        run: String,
        reason: Option<String>,
    },
    /// Show the leaderboard, optionally limited.
    Leaderboard { limit: Option<usize> },
    /// Surface a historical transaction. Target defaults to the invoker.
    Throwback { target: Option<String> },
    /// Query a user's balance.
    QueryKarma { target: String },
}

/// Classifies message text into intents.
pub struct IntentParser {
    motivate_enabled: bool,
    motivate: Regex,
    url: Regex,
    give: Regex,
    leaderboard: Regex,
    throwback: Regex,
    query: Regex,
}

impl IntentParser {
    pub fn new(motivate_enabled: bool) -> Self {
        Self {
            motivate_enabled,
            motivate: Regex::new(r"^(?:!m|!motivate)\s+(\S+?)\s*$").unwrap(),
            url: Regex::new(r"^karma(?:bot)? (?:url|web|link)$").unwrap(),
            give: Regex::new(
                r"^(<@[A-Za-z0-9]+>|\S+?)(\+{2,}|-{2,})(?:\s+(?:for|because)\s+(.+?))?\s*$",
            )
            .unwrap(),
            leaderboard: Regex::new(r"^karma(?:bot)? (?:leaderboard|top|highscores) ?([0-9]+)?$")
                .unwrap(),
            throwback: Regex::new(r"^karma(?:bot)? throwback(?: (<@[A-Za-z0-9]+>|\S+))?$")
                .unwrap(),
            query: Regex::new(r"^karma(?:bot)? (?:for )?(<@[A-Za-z0-9]+>|\S+)$").unwrap(),
        }
    }

    /// Classify a message. Returns `None` when nothing matches.
    pub fn parse(&self, text: &str) -> Option<Intent> {
        let text = self.rewrite_motivate(text.trim());
        let text = text.as_ref();

        if self.url.is_match(text) {
            return Some(Intent::ShowUrl);
        }

        if let Some(caps) = self.give.captures(text) {
            return Some(Intent::GiveKarma {
                target: caps[1].to_string(),
                run: caps[2].to_string(),
                reason: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }

        if let Some(caps) = self.leaderboard.captures(text) {
            return Some(Intent::Leaderboard {
                limit: caps.get(1).and_then(|m| m.as_str().parse().ok()),
            });
        }

        if let Some(caps) = self.throwback.captures(text) {
            return Some(Intent::Throwback {
                target: caps.get(1).map(|m| m.as_str().to_string()),
            });
        }

        if let Some(caps) = self.query.captures(text) {
            return Some(Intent::QueryKarma {
                target: caps[1].to_string(),
            });
        }

        None
    }

    /// Convert motivate-style phrases into give-karma syntax.
    ///
    /// Applied to plain messages only, before normal pattern matching.
    fn rewrite_motivate<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !self.motivate_enabled {
            return Cow::Borrowed(text);
        }
        match self.motivate.captures(text) {
            Some(caps) => Cow::Owned(format!("{}++ for doing good work", &caps[1])),
            None => Cow::Borrowed(text),
        }
    }
}

/// Extract the user id from a platform mention token (`<@U123ABC>`).
pub fn mention_id(token: &str) -> Option<&str> {
    let id = token.strip_prefix("<@")?.strip_suffix('>')?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::new(true)
    }

    #[test]
    fn gives_karma_with_plain_handle() {
        let intent = parser().parse("alice++").unwrap();
        assert_eq!(
            intent,
            Intent::GiveKarma {
                target: "alice".into(),
                run: "++".into(),
                reason: None,
            }
        );
    }

    #[test]
    fn gives_karma_with_mention_token() {
        let intent = parser().parse("<@U123ABC>+++").unwrap();
        assert_eq!(
            intent,
            Intent::GiveKarma {
                target: "<@U123ABC>".into(),
                run: "+++".into(),
                reason: None,
            }
        );
    }

    #[test]
    fn captures_reason_after_for() {
        let intent = parser().parse("alice++ for helping with the deploy").unwrap();
        assert_eq!(
            intent,
            Intent::GiveKarma {
                target: "alice".into(),
                run: "++".into(),
                reason: Some("helping with the deploy".into()),
            }
        );
    }

    #[test]
    fn captures_reason_after_because() {
        let intent = parser().parse("alice-- because reasons").unwrap();
        assert_eq!(
            intent,
            Intent::GiveKarma {
                target: "alice".into(),
                run: "--".into(),
                reason: Some("reasons".into()),
            }
        );
    }

    #[test]
    fn long_runs_are_captured_whole() {
        let Some(Intent::GiveKarma { target, run, .. }) = parser().parse("alice+++++") else {
            panic!("expected give-karma");
        };
        assert_eq!(target, "alice");
        assert_eq!(run, "+++++");
    }

    #[test]
    fn single_plus_is_not_karma() {
        assert_eq!(parser().parse("alice+"), None);
    }

    #[test]
    fn plain_chatter_matches_nothing() {
        assert_eq!(parser().parse("good morning everyone"), None);
    }

    #[test]
    fn leaderboard_with_limit() {
        assert_eq!(
            parser().parse("karmabot leaderboard 5"),
            Some(Intent::Leaderboard { limit: Some(5) })
        );
    }

    #[test]
    fn leaderboard_without_limit_falls_back() {
        assert_eq!(
            parser().parse("karma top"),
            Some(Intent::Leaderboard { limit: None })
        );
    }

    #[test]
    fn leaderboard_wins_over_balance_query() {
        // "top" is also a plausible handle; the leaderboard pattern is
        // checked first.
        assert!(matches!(
            parser().parse("karma highscores"),
            Some(Intent::Leaderboard { .. })
        ));
    }

    #[test]
    fn url_command_wins_over_balance_query() {
        assert_eq!(parser().parse("karma url"), Some(Intent::ShowUrl));
        assert_eq!(parser().parse("karmabot web"), Some(Intent::ShowUrl));
    }

    #[test]
    fn throwback_with_target() {
        assert_eq!(
            parser().parse("karma throwback alice"),
            Some(Intent::Throwback {
                target: Some("alice".into())
            })
        );
    }

    #[test]
    fn throwback_without_target() {
        assert_eq!(
            parser().parse("karmabot throwback"),
            Some(Intent::Throwback { target: None })
        );
    }

    #[test]
    fn balance_query_with_handle() {
        assert_eq!(
            parser().parse("karma alice"),
            Some(Intent::QueryKarma {
                target: "alice".into()
            })
        );
    }

    #[test]
    fn balance_query_with_mention() {
        assert_eq!(
            parser().parse("karmabot for <@U42>"),
            Some(Intent::QueryKarma {
                target: "<@U42>".into()
            })
        );
    }

    #[test]
    fn motivate_rewrites_to_give_karma() {
        let intent = parser().parse("!m alice").unwrap();
        assert_eq!(
            intent,
            Intent::GiveKarma {
                target: "alice".into(),
                run: "++".into(),
                reason: Some("doing good work".into()),
            }
        );
    }

    #[test]
    fn motivate_disabled_leaves_text_alone() {
        let parser = IntentParser::new(false);
        assert_eq!(parser.parse("!m alice"), None);
    }

    #[test]
    fn mention_id_extracts_valid_tokens() {
        assert_eq!(mention_id("<@U123ABC>"), Some("U123ABC"));
        assert_eq!(mention_id("alice"), None);
        assert_eq!(mention_id("<@>"), None);
        assert_eq!(mention_id("<@U1 2>"), None);
    }
}
