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

use std::sync::Arc;

use async_trait::async_trait;
use heroes_common::{PLAY_COMMAND, PlatformUser, Reply, START_COMMAND};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{config::BotMessages, reconciler::Reconciler};

pub type ChatId = i64;

/// One command as received from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub chat_id: ChatId,
    pub user: PlatformUser,
    pub text: String,
}

/// Reply delivery back to the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Play,
    Unknown(String),
}

impl BotCommand {
    /// Accepts `/name`, `/name@bot_username` and trailing arguments.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return BotCommand::Unknown(trimmed.to_string());
        };

        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            START_COMMAND => BotCommand::Start,
            PLAY_COMMAND => BotCommand::Play,
            _ => BotCommand::Unknown(trimmed.to_string()),
        }
    }
}

/// Stateless command router: every inbound command yields exactly one reply.
#[derive(Clone)]
pub struct CommandDispatcher {
    reconciler: Reconciler,
    messages: Arc<BotMessages>,
}

impl CommandDispatcher {
    pub fn new(reconciler: Reconciler, messages: Arc<BotMessages>) -> Self {
        Self {
            reconciler,
            messages,
        }
    }

    pub async fn dispatch(&self, command: &InboundCommand) -> Reply {
        match BotCommand::parse(&command.text) {
            BotCommand::Start => self.start(&command.user).await,
            BotCommand::Play => self.play(),
            BotCommand::Unknown(text) => {
                debug!(chat_id = command.chat_id, text = %text, "unrecognized command");
                Reply::text(&self.messages.not_understood)
            }
        }
    }

    async fn start(&self, user: &PlatformUser) -> Reply {
        match self.reconciler.ensure_identity(user).await {
            Ok(identity_key) => {
                info!(
                    identity_key = %identity_key,
                    platform_user_id = user.platform_user_id,
                    "user session started"
                );
                Reply::text(self.messages.welcome_for(&user.display_name))
            }
            Err(failure) => {
                info!(
                    platform_user_id = user.platform_user_id,
                    reason = %failure.reason,
                    "start failed; replying with retry message"
                );
                Reply::text(&self.messages.login_failed)
            }
        }
    }

    fn play(&self) -> Reply {
        Reply::with_button(
            &self.messages.play_prompt,
            &self.messages.play_button_label,
            &self.messages.game_url,
        )
    }
}

/// Dispatch one command and deliver its reply. Delivery failures are logged
/// and end here.
pub async fn handle_command(
    dispatcher: &CommandDispatcher,
    transport: &dyn ChatTransport,
    command: InboundCommand,
) {
    let reply = dispatcher.dispatch(&command).await;
    if let Err(error) = transport.send_reply(command.chat_id, &reply).await {
        warn!(chat_id = command.chat_id, error = %error, "failed to deliver reply");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandExit {
    Completed,
    Panicked,
    Cancelled,
}

/// Run one command on its own task so a slow remote call or a panic only
/// affects that command. The returned handle belongs to a supervising task
/// that logs how the command task ended.
pub fn spawn_command(
    dispatcher: CommandDispatcher,
    transport: Arc<dyn ChatTransport>,
    command: InboundCommand,
) -> JoinHandle<CommandExit> {
    let span = info_span!(
        "command",
        command_id = %Uuid::new_v4(),
        chat_id = command.chat_id,
        platform_user_id = command.user.platform_user_id
    );
    let worker = tokio::spawn(
        async move { handle_command(&dispatcher, transport.as_ref(), command).await }
            .instrument(span.clone()),
    );

    tokio::spawn(
        async move {
            match worker.await {
                Ok(()) => CommandExit::Completed,
                Err(error) if error.is_panic() => {
                    warn!(error = %error, "command task panicked");
                    CommandExit::Panicked
                }
                Err(error) => {
                    warn!(error = %error, "command task cancelled");
                    CommandExit::Cancelled
                }
            }
        }
        .instrument(span),
    )
}
