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

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use heroes_common::{PLAY_COMMAND, PlatformUser, Reply, START_COMMAND};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    config::TelegramSettings,
    dispatcher::{ChatId, ChatTransport, CommandDispatcher, InboundCommand, spawn_command},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Update {
    /// Text messages from human senders become commands; everything else is skipped.
    pub fn into_command(self) -> Option<InboundCommand> {
        let message = self.message?;
        let from = message.from?;
        if from.is_bot {
            return None;
        }
        let text = message.text?;
        Some(InboundCommand {
            chat_id: message.chat.id,
            user: PlatformUser::new(from.id, from.first_name),
            text,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramClient {
    pub fn new(client: reqwest::Client, settings: &TelegramSettings) -> Self {
        Self {
            client,
            api_base: format!(
                "{}/bot{}",
                settings.api_base_url.trim_end_matches('/'),
                settings.bot_token
            ),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to call Telegram {method}"))?;

        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("invalid Telegram {method} payload ({status})"))?;

        if !body.ok {
            anyhow::bail!(
                "Telegram {method} returned {status}: {}",
                body.description.unwrap_or_default()
            );
        }
        body.result
            .with_context(|| format!("Telegram {method} returned no result"))
    }

    pub async fn get_updates(&self, offset: i64, timeout_seconds: u64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": timeout_seconds,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Publish the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "setMyCommands",
                serde_json::json!({
                    "commands": [
                        {"command": START_COMMAND, "description": "Iniciar sesión"},
                        {"command": PLAY_COMMAND, "description": "Jugar ahora"},
                    ]
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", send_message_payload(chat_id, reply))
            .await?;
        debug!(chat_id, with_button = reply.button.is_some(), "reply sent");
        Ok(())
    }
}

pub fn send_message_payload(chat_id: ChatId, reply: &Reply) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "chat_id": chat_id,
        "text": reply.text,
    });
    if let Some(button) = &reply.button {
        payload["reply_markup"] = serde_json::json!({
            "inline_keyboard": [[{"text": button.label, "url": button.target_url}]]
        });
    }
    payload
}

/// Long-poll `getUpdates` forever, handing each command to its own task.
pub async fn run_polling(
    client: TelegramClient,
    dispatcher: CommandDispatcher,
    poll_timeout_seconds: u64,
) -> anyhow::Result<()> {
    let transport: Arc<dyn ChatTransport> = Arc::new(client.clone());
    let mut offset: i64 = 0;
    info!(poll_timeout_seconds, "polling Telegram for updates");

    loop {
        let updates = match client.get_updates(offset, poll_timeout_seconds).await {
            Ok(updates) => updates,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "Telegram poll failed, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let update_id = update.update_id;
            match update.into_command() {
                Some(command) => {
                    spawn_command(dispatcher.clone(), transport.clone(), command);
                }
                None => debug!(update_id, "skipping update without a text command"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(
            reqwest::Client::new(),
            &TelegramSettings {
                bot_token: "123:abc".to_string(),
                api_base_url: server.base_url(),
                poll_timeout_seconds: 0,
                webhook_secret: None,
            },
        )
    }

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_message_becomes_command() {
        let command = update(json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": {"id": 555, "type": "private"},
                "from": {"id": 42, "is_bot": false, "first_name": "Ana"},
                "text": "/start"
            }
        }))
        .into_command()
        .unwrap();

        assert_eq!(command.chat_id, 555);
        assert_eq!(command.user, PlatformUser::new(42, "Ana"));
        assert_eq!(command.text, "/start");
    }

    #[test]
    fn updates_without_text_sender_or_from_bots_are_skipped() {
        let no_message = update(json!({"update_id": 1, "inline_query": {"id": "q"}}));
        let no_text = update(json!({
            "update_id": 2,
            "message": {"chat": {"id": 1}, "from": {"id": 42, "first_name": "Ana"}, "sticker": {}}
        }));
        let from_bot = update(json!({
            "update_id": 3,
            "message": {"chat": {"id": 1}, "from": {"id": 9, "is_bot": true, "first_name": "Bot"}, "text": "/start"}
        }));
        let channel_post = update(json!({
            "update_id": 4,
            "message": {"chat": {"id": 1}, "text": "/start"}
        }));

        assert!(no_message.into_command().is_none());
        assert!(no_text.into_command().is_none());
        assert!(from_bot.into_command().is_none());
        assert!(channel_post.into_command().is_none());
    }

    #[test]
    fn plain_reply_has_no_markup() {
        let payload = send_message_payload(7, &Reply::text("hola"));
        assert_eq!(payload, json!({"chat_id": 7, "text": "hola"}));
    }

    #[test]
    fn button_reply_uses_inline_url_keyboard() {
        let reply = Reply::with_button("Haz clic", "Jugar ahora", "https://t.me/TapHeroesBot/TapHeroes");
        let payload = send_message_payload(7, &reply);

        assert_eq!(
            payload["reply_markup"],
            json!({"inline_keyboard": [[{"text": "Jugar ahora", "url": "https://t.me/TapHeroesBot/TapHeroes"}]]})
        );
    }

    #[tokio::test]
    async fn get_updates_parses_result_list() {
        let server = MockServer::start_async().await;
        let poll = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:abc/getUpdates")
                .json_body(json!({"offset": 11, "timeout": 0, "allowed_updates": ["message"]}));
            then.status(200).json_body(json!({
                "ok": true,
                "result": [{
                    "update_id": 11,
                    "message": {
                        "chat": {"id": 555},
                        "from": {"id": 42, "first_name": "Ana"},
                        "text": "/play"
                    }
                }]
            }));
        });

        let updates = client(&server).get_updates(11, 0).await.unwrap();

        poll.assert_calls(1);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 11);
    }

    #[tokio::test]
    async fn send_reply_posts_message_with_button() {
        let server = MockServer::start_async().await;
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:abc/sendMessage")
                .body_includes("\"chat_id\":555")
                .body_includes("inline_keyboard");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 3}}));
        });

        client(&server)
            .send_reply(555, &Reply::with_button("go", "Jugar ahora", "https://example.com"))
            .await
            .unwrap();

        send.assert_calls(1);
    }

    #[tokio::test]
    async fn api_rejection_is_an_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/bot123:abc/sendMessage");
            then.status(403).json_body(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            }));
        });

        let error = client(&server)
            .send_reply(555, &Reply::text("hola"))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("bot was blocked"));
    }

    #[tokio::test]
    async fn set_my_commands_registers_start_and_play() {
        let server = MockServer::start_async().await;
        let register = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:abc/setMyCommands")
                .body_includes("\"command\":\"start\"")
                .body_includes("\"command\":\"play\"");
            then.status(200).json_body(json!({"ok": true, "result": true}));
        });

        client(&server).set_my_commands().await.unwrap();

        register.assert_calls(1);
    }
}
