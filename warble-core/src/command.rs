//! Command messages and the registered command table.
//!
//! A [`CommandMessage`] is built once per qualifying MESSAGE_CREATE
//! frame and owns every field outright, so any exit path — matched,
//! unmatched, or voided mid-build — releases the strings through a
//! normal drop.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::rest::RestHandle;

// ── CommandMessage ───────────────────────────────────────────────

/// One user-initiated command, extracted from an inbound frame.
///
/// Never enqueued unless the content was non-empty, the command
/// prefix matched, the message was not a webhook message, and its
/// type was the default (0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub channel_id: String,
    pub guild_id: String,
    pub author_name: String,
    pub author_id: String,
    /// `<@id>` — ready to drop into a reply.
    pub author_mention: String,
    /// The message text with the command prefix already stripped.
    pub content: String,
}

impl CommandMessage {
    #[cfg(test)]
    pub(crate) fn for_tests(content: &str, channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.into(),
            guild_id: String::new(),
            author_name: "tester".into(),
            author_id: "0".into(),
            author_mention: "<@0>".into(),
            content: content.into(),
        }
    }
}

// ── MessageBuilder ───────────────────────────────────────────────

/// What became of a MESSAGE_CREATE candidate.
#[derive(Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Prefix matched; dispatch it.
    Command(CommandMessage),
    /// The bypass keyword matched instead of the prefix.
    Help(CommandMessage),
    /// Disqualified. Fields already collected are released here.
    Void,
}

/// Accumulates MESSAGE_CREATE fields as the decoder encounters them,
/// then applies the qualification rules in one place.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    channel_id: Option<String>,
    guild_id: Option<String>,
    author_name: Option<String>,
    author_id: Option<String>,
    content: Option<String>,
    webhook: bool,
    message_type: Option<String>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_id(&mut self, v: String) {
        self.channel_id = Some(v);
    }

    pub fn guild_id(&mut self, v: String) {
        self.guild_id = Some(v);
    }

    pub fn author_name(&mut self, v: String) {
        self.author_name = Some(v);
    }

    pub fn author_id(&mut self, v: String) {
        self.author_id = Some(v);
    }

    pub fn content(&mut self, v: String) {
        self.content = Some(v);
    }

    /// The frame carried a `webhook_id`; bot-relayed messages never
    /// qualify.
    pub fn webhook(&mut self) {
        self.webhook = true;
    }

    /// Raw `type` field as it appeared in the frame.
    pub fn message_type(&mut self, v: String) {
        self.message_type = Some(v);
    }

    /// Apply the qualification rules, in order, short-circuiting on
    /// the first failure:
    /// webhook → non-default type → bypass keyword → prefix length →
    /// prefix match → non-empty remainder.
    pub fn finish(
        self,
        prefix: &str,
        case_sensitive: bool,
        help_keyword: Option<&str>,
    ) -> MatchOutcome {
        if self.webhook {
            return MatchOutcome::Void;
        }
        if let Some(t) = &self.message_type {
            if t != "0" {
                return MatchOutcome::Void;
            }
        }
        let (Some(channel_id), Some(author_name), Some(author_id), Some(content)) = (
            self.channel_id,
            self.author_name,
            self.author_id,
            self.content,
        ) else {
            return MatchOutcome::Void;
        };

        let build = |content: String| {
            let author_mention = format!("<@{author_id}>");
            CommandMessage {
                channel_id,
                guild_id: self.guild_id.unwrap_or_default(),
                author_name,
                author_id,
                author_mention,
                content,
            }
        };

        // The bypass keyword opens the basic-help path even when the
        // prefix itself would not match.
        if let Some(keyword) = help_keyword {
            if eq_fold(&content, keyword, case_sensitive) {
                return MatchOutcome::Help(build(content));
            }
        }
        if content.len() < prefix.len() {
            return MatchOutcome::Void;
        }
        if !starts_with_fold(&content, prefix, case_sensitive) {
            return MatchOutcome::Void;
        }
        let stripped = content[prefix.len()..].to_string();
        if stripped.is_empty() {
            return MatchOutcome::Void;
        }
        MatchOutcome::Command(build(stripped))
    }
}

fn eq_fold(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

fn starts_with_fold(content: &str, prefix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        content.starts_with(prefix)
    } else {
        content
            .as_bytes()
            .iter()
            .zip(prefix.as_bytes())
            .all(|(c, p)| c.eq_ignore_ascii_case(p))
            && content.len() >= prefix.len()
    }
}

// ── CommandTable ─────────────────────────────────────────────────

type CommandFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// An async command handler: the message plus a REST handle to reply
/// with.
pub type CommandHandler = Arc<dyn Fn(CommandMessage, RestHandle) -> CommandFuture + Send + Sync>;

/// Registered commands, matched by the first whitespace-delimited
/// token of the stripped content.
pub struct CommandTable {
    commands: HashMap<String, CommandHandler>,
    case_sensitive: bool,
    reply_on_unknown: bool,
}

impl CommandTable {
    pub fn new(case_sensitive: bool, reply_on_unknown: bool) -> Self {
        Self {
            commands: HashMap::new(),
            case_sensitive,
            reply_on_unknown,
        }
    }

    /// Register a handler under `name`.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(CommandMessage, RestHandle) -> CommandFuture + Send + Sync + 'static,
    {
        self.commands.insert(self.key(name), Arc::new(handler));
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// Names of all registered commands, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Match and run the handler for `msg`. Unmatched content is
    /// dropped silently or answered with the command list, per
    /// configuration.
    pub async fn dispatch(&self, msg: CommandMessage, rest: RestHandle) {
        let word = msg.content.split_whitespace().next().unwrap_or("");
        match self.commands.get(&self.key(word)) {
            Some(handler) => handler(msg, rest).await,
            None => {
                if self.reply_on_unknown {
                    self.send_help(&msg, &rest);
                } else {
                    debug!(content = %msg.content, "no matching command, dropped");
                }
            }
        }
    }

    /// The basic-help response, also used for the bypass keyword.
    pub fn send_help(&self, msg: &CommandMessage, rest: &RestHandle) {
        let listing = self.names().join(", ");
        rest.post_embed(&msg.channel_id, "Commands", &listing);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn full_builder(content: &str) -> MessageBuilder {
        let mut b = MessageBuilder::new();
        b.channel_id("1".into());
        b.author_name("bob".into());
        b.author_id("2".into());
        b.content(content.into());
        b
    }

    #[test]
    fn prefix_match_strips_and_mentions() {
        let out = full_builder("!cast hi").finish("!cast ", true, None);
        let MatchOutcome::Command(msg) = out else {
            panic!("expected command, got {out:?}");
        };
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.channel_id, "1");
        assert_eq!(msg.author_name, "bob");
        assert_eq!(msg.author_id, "2");
        assert_eq!(msg.author_mention, "<@2>");
    }

    #[test]
    fn webhook_voids() {
        let mut b = full_builder("!cast hi");
        b.webhook();
        assert_eq!(b.finish("!cast ", true, None), MatchOutcome::Void);
    }

    #[test]
    fn non_default_type_voids() {
        let mut b = full_builder("!cast hi");
        b.message_type("1".into());
        assert_eq!(b.finish("!cast ", true, None), MatchOutcome::Void);

        let mut b = full_builder("!cast hi");
        b.message_type("0".into());
        assert!(matches!(
            b.finish("!cast ", true, None),
            MatchOutcome::Command(_)
        ));
    }

    #[test]
    fn short_or_unprefixed_content_voids() {
        assert_eq!(full_builder("!c").finish("!cast ", true, None), MatchOutcome::Void);
        assert_eq!(
            full_builder("hello there").finish("!cast ", true, None),
            MatchOutcome::Void
        );
        // Prefix with nothing after it.
        assert_eq!(
            full_builder("!cast ").finish("!cast ", true, None),
            MatchOutcome::Void
        );
    }

    #[test]
    fn case_insensitive_prefix() {
        let out = full_builder("!CAST hi").finish("!cast ", false, None);
        assert!(matches!(out, MatchOutcome::Command(m) if m.content == "hi"));
        // Sensitive mode refuses the same frame.
        assert_eq!(
            full_builder("!CAST hi").finish("!cast ", true, None),
            MatchOutcome::Void
        );
    }

    #[test]
    fn help_keyword_bypasses_prefix() {
        let out = full_builder("!help").finish("!cast ", false, Some("!help"));
        assert!(matches!(out, MatchOutcome::Help(m) if m.content == "!help"));
        // Even though "!help" is shorter than the prefix.
        assert!("!help".len() < "!cast ".len());
    }

    #[test]
    fn missing_fields_void() {
        let mut b = MessageBuilder::new();
        b.content("!cast hi".into());
        assert_eq!(b.finish("!cast ", true, None), MatchOutcome::Void);
    }

    #[tokio::test]
    async fn table_matches_first_word() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let hit = Arc::new(AtomicBool::new(false));
        let mut table = CommandTable::new(false, false);
        {
            let hit = Arc::clone(&hit);
            table.register("Roll", move |msg, _| {
                let hit = Arc::clone(&hit);
                Box::pin(async move {
                    assert_eq!(msg.content, "roll d20");
                    hit.store(true, Ordering::SeqCst);
                })
            });
        }
        let (rest, _rx) = RestHandle::detached(4);
        table
            .dispatch(CommandMessage::for_tests("roll d20", "1"), rest)
            .await;
        assert!(hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unknown_command_replies_when_configured() {
        let mut table = CommandTable::new(false, true);
        table.register("ping", |_, _| Box::pin(async {}));
        let (rest, mut rx) = RestHandle::detached(4);
        table
            .dispatch(CommandMessage::for_tests("nope", "9"), rest)
            .await;
        let job = rx.pop().await.expect("help reply queued");
        assert_eq!(job.path, "/api/v10/channels/9/messages");
        assert!(job.json_body.contains("ping"));
    }
}
