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

mod config;
mod dispatcher;
mod identity;
mod profile;
mod reconciler;
mod telegram;
mod token;
#[cfg(test)]
mod testing;

use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lambda_http::run as lambda_run;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    config::{
        IdentitySettings, RunMode, TelegramSettings, env_non_empty, load_bot_messages,
        parse_run_mode,
    },
    dispatcher::{ChatTransport, CommandDispatcher, handle_command},
    identity::{FirebaseIdentityGateway, IdentityGateway},
    profile::{DynamoProfileStore, ProfileStore},
    reconciler::Reconciler,
    telegram::{TelegramClient, Update, run_polling},
};

const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct AppState {
    dispatcher: CommandDispatcher,
    transport: Arc<dyn ChatTransport>,
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "onboarding_bot_service=debug,tower_http=info".to_string()),
        )
        .init();

    let telegram_settings = TelegramSettings::from_env()?;
    let identity_settings = IdentitySettings::from_env()?;

    let http = reqwest::Client::new();
    let tokens = identity_settings.token_source(http.clone())?;
    let identities: Arc<dyn IdentityGateway> = Arc::new(FirebaseIdentityGateway::new(
        http.clone(),
        identity_settings.base_url,
        identity_settings.project_id,
        tokens,
    ));
    let profiles: Arc<dyn ProfileStore> = Arc::new(DynamoProfileStore::from_env().await);
    let dispatcher = CommandDispatcher::new(
        Reconciler::new(identities, profiles),
        Arc::new(load_bot_messages()),
    );
    let telegram = TelegramClient::new(http, &telegram_settings);

    let state = AppState {
        dispatcher: dispatcher.clone(),
        transport: Arc::new(telegram.clone()),
        webhook_secret: telegram_settings.webhook_secret.clone(),
    };
    let app = build_router(state);

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; serving Telegram webhooks in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    if let Err(error) = telegram.set_my_commands().await {
        warn!(error = %format!("{error:#}"), "failed to register bot command menu");
    }

    let bind_addr = parse_bind_addr("ONBOARDING_BOT_BIND", "0.0.0.0:8095")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    match parse_run_mode(env_non_empty("BOT_MODE").as_deref()) {
        RunMode::Webhook => {
            info!(%bind_addr, "onboarding-bot-service listening for Telegram webhooks");
            axum::serve(listener, app).await?;
        }
        RunMode::Polling => {
            info!(%bind_addr, "onboarding-bot-service health endpoint listening");
            tokio::select! {
                result = run_polling(telegram, dispatcher, telegram_settings.poll_timeout_seconds) => {
                    result.context("Telegram polling stopped")?;
                }
                result = axum::serve(listener, app).into_future() => {
                    result.context("health server stopped")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("onboarding-bot-service shutting down");
                }
            }
        }
    }
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(telegram_webhook_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "onboarding-bot-service"}))
}

async fn telegram_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_webhook_secret(state.webhook_secret.as_deref(), &headers)?;

    let update_id = update.update_id;
    match update.into_command() {
        Some(command) => {
            handle_command(&state.dispatcher, state.transport.as_ref(), command).await;
        }
        None => debug!(update_id, "skipping webhook update without a text command"),
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

fn verify_webhook_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("invalid webhook secret token"))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
