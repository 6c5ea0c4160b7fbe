//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.marka/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Automation webhook the site's contact form posts to.
pub const DEFAULT_CONTACT_WEBHOOK: &str =
    "https://hook.us2.make.com/7xj1a4k9g4se5ake5bw6qvmic7ig8w1p";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat widget behavior (typing delay, responder).
    #[serde(default)]
    pub chat: ChatConfig,

    /// Gemini settings, used only when chat.responder is "gemini".
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Contact form webhook.
    #[serde(default)]
    pub contact: ContactConfig,

    /// Workspace root (default ~/.marka/workspace). Holds SYSTEM.md.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Which responder answers chat messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponderKind {
    /// Keyword and phone-number matching with fixed replies.
    #[default]
    Scripted,
    /// Gemini model with the agency persona.
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Simulated typing delay before the assistant reply is shown (default 1500 ms).
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,

    #[serde(default)]
    pub responder: ResponderKind,

    /// Gateway sessions idle this long are closed and forgotten (default 1800; 0 keeps them).
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_typing_delay_ms() -> u64 {
    1500
}

fn default_session_idle_secs() -> u64 {
    1800
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay_ms(),
            responder: ResponderKind::default(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl ChatConfig {
    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        (self.session_idle_secs > 0).then(|| Duration::from_secs(self.session_idle_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY (or API_KEY) env.
    pub api_key: Option<String>,
    /// Model id (default gemini-2.5-flash).
    pub model: Option<String>,
    /// API base URL override (default Google's v1beta endpoint).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactConfig {
    /// Webhook receiving contact form submissions. Overridden by MARKA_CONTACT_WEBHOOK env.
    #[serde(default = "default_contact_webhook")]
    pub webhook_url: String,
    /// Source tag sent with every submission.
    #[serde(default = "default_contact_source")]
    pub source: String,
}

fn default_contact_webhook() -> String {
    DEFAULT_CONTACT_WEBHOOK.to_string()
}

fn default_contact_source() -> String {
    crate::contact::DEFAULT_SOURCE.to_string()
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_contact_webhook(),
            source: default_contact_source(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Gemini API key: env GEMINI_API_KEY, then API_KEY, override config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    non_empty_env("GEMINI_API_KEY")
        .or_else(|| non_empty_env("API_KEY"))
        .or_else(|| {
            config
                .gemini
                .api_key
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the contact webhook: env MARKA_CONTACT_WEBHOOK overrides config.
pub fn resolve_contact_webhook(config: &Config) -> String {
    non_empty_env("MARKA_CONTACT_WEBHOOK").unwrap_or_else(|| config.contact.webhook_url.clone())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MARKA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".marka").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Resolve workspace directory: config override, else `workspace` next to the config file.
pub fn resolve_workspace_dir(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.workspace {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => config_parent.join("workspace"),
    }
}

/// Load config from the given path (or MARKA_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 15152);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.chat.typing_delay(), Duration::from_millis(1500));
        assert_eq!(c.chat.responder, ResponderKind::Scripted);
        assert_eq!(c.chat.session_idle_ttl(), Some(Duration::from_secs(1800)));
        assert_eq!(c.contact.source, "Website Contact Form");
        assert_eq!(c.contact.webhook_url, DEFAULT_CONTACT_WEBHOOK);
    }

    #[test]
    fn parses_camel_case_partial_json() {
        let c: Config = serde_json::from_str(
            r#"{"chat":{"typingDelayMs":0,"responder":"gemini","sessionIdleSecs":0},"gemini":{"apiKey":"k"}}"#,
        )
        .unwrap();
        assert_eq!(c.chat.typing_delay_ms, 0);
        assert_eq!(c.chat.responder, ResponderKind::Gemini);
        assert_eq!(c.chat.session_idle_ttl(), None);
        assert_eq!(c.gemini.api_key.as_deref(), Some("k"));
        assert_eq!(c.gateway.port, 15152);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("marka-missing-{}.json", uuid::Uuid::new_v4()));
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.gateway.port, 15152);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let path = std::env::temp_dir().join(format!("marka-bad-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ nope").unwrap();
        assert!(load_config(Some(path.clone())).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn resolve_workspace_dir_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.marka/config.json");
        assert_eq!(
            resolve_workspace_dir(&config, path),
            PathBuf::from("/home/user/.marka/workspace")
        );
    }

    #[test]
    fn resolve_workspace_dir_override_relative() {
        let config = Config {
            workspace: Some(PathBuf::from("site/ws")),
            ..Config::default()
        };
        let path = Path::new("/home/user/.marka/config.json");
        assert_eq!(
            resolve_workspace_dir(&config, path),
            PathBuf::from("/home/user/.marka/site/ws")
        );
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind(" 127.0.0.1 "));
        assert!(is_loopback_bind("localhost"));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
