//! Outbound JSON payload builders.
//!
//! Everything the engine ever writes to the wire is produced here:
//! the identify/login payload, heartbeats, and REST message bodies.

use bitflags::bitflags;
use serde_json::{Map, Value, json};

bitflags! {
    /// Gateway intents requested at identify time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GatewayIntents: u32 {
        const GUILDS = 1 << 0;
        const GUILD_MESSAGES = 1 << 9;
        const DIRECT_MESSAGES = 1 << 12;
        const MESSAGE_CONTENT = 1 << 15;
    }
}

impl Default for GatewayIntents {
    fn default() -> Self {
        GatewayIntents::GUILD_MESSAGES
    }
}

/// The identify (login) payload sent in response to Hello.
pub fn identify_json(token: &str, intents: GatewayIntents) -> String {
    json!({
        "op": 2,
        "d": {
            "token": token,
            "properties": {
                "$os": std::env::consts::OS,
                "$browser": "warble",
                "$device": "warble",
            },
            "compress": false,
            "large_threshold": 50,
            "shard": [0, 1],
            "presence": { "status": "online", "afk": false },
            "intents": intents.bits(),
        }
    })
    .to_string()
}

/// A heartbeat frame carrying the last observed sequence, or null
/// before any Dispatch has been seen.
pub fn heartbeat_json(sequence: Option<i64>) -> String {
    json!({ "op": 1, "d": sequence }).to_string()
}

/// REST body for posting a message: plain content, an embed, or both.
pub fn message_json(
    content: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut body = Map::new();
    if let Some(content) = content {
        body.insert("content".into(), Value::from(content));
    }
    body.insert("tts".into(), Value::from(false));
    if title.is_some() || description.is_some() {
        let mut embed = Map::new();
        if let Some(title) = title {
            embed.insert("title".into(), Value::from(title));
        }
        if let Some(description) = description {
            embed.insert("description".into(), Value::from(description));
        }
        body.insert("embed".into(), Value::Object(embed));
    }
    Value::Object(body).to_string()
}

/// REST path for posting to a channel.
pub fn channel_messages_path(channel_id: &str) -> String {
    format!("/api/v10/channels/{channel_id}/messages")
}

/// Authorization header value for bot credentials.
pub fn auth_header(token: &str) -> String {
    format!("Bot {token}")
}
