//! Configuration for the bot runner.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warble_core::{GatewayConfig, GatewayIntents};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Gateway connection settings.
    pub gateway: GatewaySection,
    /// Command matching behaviour.
    pub bot: BotSection,
    /// Memory and pipeline budgets.
    pub limits: LimitsSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// WebSocket endpoint of the event stream.
    pub uri: String,
    /// Bot token. May also come from `WARBLE_TOKEN` in the
    /// environment, which wins over the file.
    pub auth_token: String,
    /// Gateway intents bitfield requested at identify.
    pub intents: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Command matching behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// Prefix a message must carry to be treated as a command.
    pub command_prefix: String,
    /// Match the prefix (and command names) case-sensitively.
    pub case_sensitive: bool,
    /// Keyword that answers with basic help even without the prefix.
    /// Empty disables the bypass.
    pub help_keyword: String,
    /// Reply with the command list when a prefixed message matches
    /// nothing; otherwise drop it silently.
    pub reply_on_unknown: bool,
}

/// Memory and pipeline budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Largest reassembled inbound frame, in bytes.
    pub receive_buffer_size: usize,
    /// Token table size per frame.
    pub max_tokens: usize,
    /// Raw frame queue capacity.
    pub frame_queue_capacity: usize,
    /// Decoded command queue capacity.
    pub command_queue_capacity: usize,
    /// Command worker pool size.
    pub max_concurrent_commands: usize,
    /// Outbound REST queue capacity.
    pub rest_queue_capacity: usize,
    /// Minimum spacing between outbound sends, in milliseconds.
    pub min_send_spacing_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            gateway: GatewaySection::default(),
            bot: BotSection::default(),
            limits: LimitsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            uri: "wss://gateway.discord.gg/?v=10&encoding=json".into(),
            auth_token: String::new(),
            intents: GatewayIntents::default().bits(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            command_prefix: "!cast ".into(),
            case_sensitive: false,
            help_keyword: "!help".into(),
            reply_on_unknown: false,
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            receive_buffer_size: 8192,
            max_tokens: 256,
            frame_queue_capacity: 16,
            command_queue_capacity: 16,
            max_concurrent_commands: 5,
            rest_queue_capacity: 16,
            min_send_spacing_ms: 550,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        };
        if let Ok(token) = std::env::var("WARBLE_TOKEN") {
            config.gateway.auth_token = token;
        }
        config
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the core engine's configuration.
    pub fn to_gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            gateway_uri: self.gateway.uri.clone(),
            auth_token: self.gateway.auth_token.clone(),
            command_prefix: self.bot.command_prefix.clone(),
            case_sensitive: self.bot.case_sensitive,
            help_keyword: (!self.bot.help_keyword.is_empty())
                .then(|| self.bot.help_keyword.clone()),
            reply_on_unknown: self.bot.reply_on_unknown,
            intents: GatewayIntents::from_bits_truncate(self.gateway.intents),
            receive_buffer_size: self.limits.receive_buffer_size.max(512),
            max_tokens: self.limits.max_tokens.max(16),
            frame_queue_capacity: self.limits.frame_queue_capacity.max(1),
            command_queue_capacity: self.limits.command_queue_capacity.max(1),
            max_concurrent_commands: self.limits.max_concurrent_commands.clamp(1, 64),
            rest_queue_capacity: self.limits.rest_queue_capacity.max(1),
            min_send_spacing: Duration::from_millis(self.limits.min_send_spacing_ms),
            connect_timeout: Duration::from_millis(self.gateway.connect_timeout_ms),
            ..GatewayConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = BotConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("command_prefix"));
        assert!(text.contains("receive_buffer_size"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = BotConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: BotConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bot.command_prefix, "!cast ");
        assert_eq!(parsed.limits.min_send_spacing_ms, 550);
    }

    #[test]
    fn to_gateway_config_clamps() {
        let mut cfg = BotConfig::default();
        cfg.limits.max_concurrent_commands = 500;
        cfg.limits.max_tokens = 1;
        let gw = cfg.to_gateway_config();
        assert_eq!(gw.max_concurrent_commands, 64);
        assert_eq!(gw.max_tokens, 16);
    }

    #[test]
    fn empty_help_keyword_disables_bypass() {
        let mut cfg = BotConfig::default();
        cfg.bot.help_keyword.clear();
        assert!(cfg.to_gateway_config().help_keyword.is_none());
    }
}
