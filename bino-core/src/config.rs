use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct BinoConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    20
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Timings and fixed texts of the widget.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WidgetConfig {
    /// Delay before first-visit welcome bubbles hide on their own.
    pub welcome_auto_hide_ms: u64,
    pub welcome_fade_ms: u64,
    /// Delay before the input is focused after opening.
    pub focus_delay_ms: u64,
    /// Touch devices never get programmatic focus.
    pub touch_input: bool,
    pub greeting: String,
    pub welcome_bubbles: Vec<String>,
    /// Shown when the webhook answered without usable text.
    pub fallback_reply: String,
    /// Shown when the request itself failed.
    pub error_reply: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            welcome_auto_hide_ms: 10_000,
            welcome_fade_ms: 500,
            focus_delay_ms: 100,
            touch_input: false,
            greeting: "Bonjour ! 👋 Je suis Bino, l'assistant de BinkoO Digital Lab. Comment puis-je vous aider aujourd'hui ?".to_string(),
            welcome_bubbles: vec![
                "👋🏿 Salut! Comment puis-je aider mon humain préféré ? 😻".to_string(),
                "Au fait, Nous pouvons créer un agent comme ça pour VOTRE site ! 😮".to_string(),
            ],
            fallback_reply: "Désolé, je n'ai pas pu traiter votre message. Essayez à nouveau."
                .to_string(),
            error_reply: "Une erreur s'est produite. Veuillez réessayer.".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.bino/storage.json".to_string(),
            key_prefix: "binkoo-".to_string(),
        }
    }
}

impl StorageConfig {
    /// Storage path with `~` and environment variables expanded.
    pub fn resolved_path(&self) -> std::path::PathBuf {
        let expanded = shellexpand::full(&self.path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.path.clone());
        std::path::PathBuf::from(expanded)
    }
}

impl BinoConfig {
    /// Load from a TOML file, with `BINO__SECTION__KEY` environment overrides.
    ///
    /// A missing file is tolerated so the webhook URL can come from the
    /// environment alone.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with_webhook(path, None)
    }

    /// Like [`BinoConfig::load`], with an optional webhook URL that beats
    /// both the file and the environment.
    pub fn load_with_webhook(path: &str, webhook_url: Option<String>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BINO").separator("__"))
            .set_override_option("webhook.url", webhook_url)?
            .build()?;
        s.try_deserialize()
    }

    pub fn with_webhook(url: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig::default(),
            webhook: WebhookConfig::new(url),
            widget: WidgetConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_applies_defaults_for_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[webhook]\nurl = \"http://localhost:5678/webhook/chat\"").unwrap();

        let config = BinoConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.webhook.url, "http://localhost:5678/webhook/chat");
        assert_eq!(config.webhook.request_timeout_seconds, 20);
        assert_eq!(config.widget.welcome_auto_hide_ms, 10_000);
        assert_eq!(config.widget.focus_delay_ms, 100);
        assert_eq!(config.widget.welcome_bubbles.len(), 2);
        assert_eq!(config.storage.key_prefix, "binkoo-");
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn test_load_overrides_widget_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[webhook]\nurl = \"http://x\"\nrequest_timeout_seconds = 5\n\n[widget]\ntouch_input = true\ngreeting = \"\""
        )
        .unwrap();

        let config = BinoConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.webhook.request_timeout_seconds, 5);
        assert!(config.widget.touch_input);
        assert!(config.widget.greeting.is_empty());
        // untouched fields keep their defaults
        assert_eq!(config.widget.welcome_fade_ms, 500);
    }

    #[test]
    fn test_load_without_webhook_url_fails() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[widget]\ntouch_input = true").unwrap();

        assert!(BinoConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_webhook_override_wins_over_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[webhook]\nurl = \"http://from-file\"").unwrap();

        let config = BinoConfig::load_with_webhook(
            file.path().to_str().unwrap(),
            Some("http://from-flag".to_string()),
        )
        .unwrap();
        assert_eq!(config.webhook.url, "http://from-flag");
    }

    #[test]
    fn test_webhook_override_supplies_missing_url() {
        let config = BinoConfig::load_with_webhook(
            "/nonexistent/bino-config",
            Some("http://from-flag".to_string()),
        )
        .unwrap();
        assert_eq!(config.webhook.url, "http://from-flag");
        assert_eq!(config.webhook.request_timeout_seconds, 20);
    }

    #[test]
    fn test_resolved_path_expands_home() {
        let storage = StorageConfig {
            path: "~/bino-test.json".to_string(),
            key_prefix: String::new(),
        };
        let resolved = storage.resolved_path();
        assert!(resolved.ends_with("bino-test.json"));

        let plain = StorageConfig {
            path: "/tmp/bino/storage.json".to_string(),
            key_prefix: String::new(),
        };
        assert_eq!(plain.resolved_path(), std::path::PathBuf::from("/tmp/bino/storage.json"));
    }
}
