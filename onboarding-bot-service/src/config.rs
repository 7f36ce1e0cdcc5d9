// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use heroes_common::{DEFAULT_GAME_URL, expand_env_vars};
use serde::Deserialize;
use tracing::{info, warn};

use crate::token::{
    AccessTokenSource, ServiceAccountKey, ServiceAccountTokenSource, StaticAccessToken,
};

const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_POLL_TIMEOUT_SECONDS: u64 = 30;

/// User-facing reply texts. `{name}` in `welcome` is replaced by the display name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotMessages {
    pub welcome: String,
    pub login_failed: String,
    pub not_understood: String,
    pub play_prompt: String,
    pub play_button_label: String,
    pub game_url: String,
}

impl Default for BotMessages {
    fn default() -> Self {
        Self {
            welcome: "Bienvenido, {name}! Tu sesión ha sido iniciada automáticamente.".to_string(),
            login_failed:
                "Ocurrió un error al iniciar sesión. Por favor, inténtalo de nuevo más tarde."
                    .to_string(),
            not_understood: "Lo siento, no entendí ese comando.".to_string(),
            play_prompt: "Haz clic en el siguiente botón para jugar:".to_string(),
            play_button_label: "Jugar ahora".to_string(),
            game_url: DEFAULT_GAME_URL.to_string(),
        }
    }
}

impl BotMessages {
    pub fn welcome_for(&self, display_name: &str) -> String {
        self.welcome.replace("{name}", display_name)
    }

    fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            welcome: non_empty_or(self.welcome, defaults.welcome),
            login_failed: non_empty_or(self.login_failed, defaults.login_failed),
            not_understood: non_empty_or(self.not_understood, defaults.not_understood),
            play_prompt: non_empty_or(self.play_prompt, defaults.play_prompt),
            play_button_label: non_empty_or(self.play_button_label, defaults.play_button_label),
            game_url: non_empty_or(self.game_url, defaults.game_url),
        }
    }
}

fn non_empty_or(value: String, fallback: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    }
}

pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_bot_messages(raw: &str) -> Result<BotMessages, serde_yaml::Error> {
    let expanded = expand_env_vars(raw);
    if expanded.trim().is_empty() {
        return Ok(BotMessages::default());
    }
    serde_yaml::from_str::<BotMessages>(&expanded).map(BotMessages::normalized)
}

/// Load the reply catalog from `BOT_MESSAGES_PATH`, falling back to the
/// built-in texts when the file is missing or invalid. `GAME_URL` wins over
/// the file.
pub fn load_bot_messages() -> BotMessages {
    let mut messages = match env_non_empty("BOT_MESSAGES_PATH") {
        Some(path) => load_bot_messages_from(Path::new(&path)),
        None => BotMessages::default(),
    };

    if let Some(game_url) = env_non_empty("GAME_URL") {
        messages.game_url = game_url;
    }
    messages
}

fn load_bot_messages_from(path: &Path) -> BotMessages {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to read bot messages file");
            return BotMessages::default();
        }
    };

    match parse_bot_messages(&raw) {
        Ok(messages) => {
            info!(path = %path.display(), "loaded bot messages");
            messages
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to parse bot messages yaml");
            BotMessages::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub base_url: String,
    pub project_id: String,
    pub service_account: ServiceAccountKey,
    pub token_override: Option<String>,
}

impl IdentitySettings {
    /// A missing `FIREBASE_SERVICE_ACCOUNT` is fatal at startup.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env_non_empty("FIREBASE_SERVICE_ACCOUNT").context(
            "FIREBASE_SERVICE_ACCOUNT is not set; the identity service credential path is required",
        )?;
        let service_account = read_service_account_key(Path::new(&path))?;
        let base_url = env_non_empty("IDENTITY_TOOLKIT_BASE_URL")
            .unwrap_or_else(|| DEFAULT_IDENTITY_TOOLKIT_BASE_URL.to_string());

        let settings = Self::resolve(
            service_account,
            env_non_empty("IDENTITY_ACCESS_TOKEN"),
            base_url,
        )?;
        info!(
            path = %path,
            project_id = %settings.project_id,
            token_override = settings.token_override.is_some(),
            "identity service credential loaded"
        );
        Ok(settings)
    }

    fn resolve(
        service_account: ServiceAccountKey,
        token_override: Option<String>,
        base_url: String,
    ) -> anyhow::Result<Self> {
        let project_id = service_account.project_id.trim().to_string();
        if project_id.is_empty() {
            anyhow::bail!("identity credential has an empty project_id");
        }

        Ok(Self {
            base_url,
            project_id,
            service_account,
            token_override: token_override
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    /// `IDENTITY_ACCESS_TOKEN` wins; otherwise tokens are minted from the key.
    /// An unusable private key fails here, at startup.
    pub fn token_source(
        &self,
        client: reqwest::Client,
    ) -> anyhow::Result<Arc<dyn AccessTokenSource>> {
        match &self.token_override {
            Some(token) => Ok(Arc::new(StaticAccessToken::new(token.clone()))),
            None => Ok(Arc::new(
                ServiceAccountTokenSource::new(client, &self.service_account)
                    .context("identity credential cannot mint access tokens")?,
            )),
        }
    }
}

pub fn read_service_account_key(path: &Path) -> anyhow::Result<ServiceAccountKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read identity credential {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid identity credential {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Polling,
    Webhook,
}

pub fn parse_run_mode(value: Option<&str>) -> RunMode {
    match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("webhook") => RunMode::Webhook,
        Some("polling") | None => RunMode::Polling,
        Some(other) => {
            warn!(mode = %other, "unknown BOT_MODE; using polling");
            RunMode::Polling
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub api_base_url: String,
    pub poll_timeout_seconds: u64,
    pub webhook_secret: Option<String>,
}

impl TelegramSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = env_non_empty("BOT_TOKEN").context("BOT_TOKEN is not set")?;
        Ok(Self {
            bot_token,
            api_base_url: env_non_empty("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE_URL.to_string()),
            poll_timeout_seconds: env_non_empty("TELEGRAM_POLL_TIMEOUT_SECONDS")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_POLL_TIMEOUT_SECONDS),
            webhook_secret: env_non_empty("TELEGRAM_WEBHOOK_SECRET"),
        })
    }
}
