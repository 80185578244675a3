use std::time::Duration;

use async_trait::async_trait;
use procurebot_core::config::TelegramConfig;
use procurebot_core::{MessageTransport, OutboundMessage, SendError, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::api::{AnswerCallbackQueryRequest, ApiResponse, GetUpdatesRequest, Update, User};
use crate::render::send_message_request;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Added on top of the long-poll timeout so the server answers first.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not build telegram http client: {0}")]
    Build(String),
}

/// Thin Bot API client over reqwest. Every failure is folded into
/// [`SendError`] so callers only deal with retry classes.
#[derive(Clone)]
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    poll_timeout: Duration,
}

impl BotApiClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| ClientError::Build(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.bot_token.clone(),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        })
    }

    pub async fn get_me(&self) -> Result<User, SendError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT).await
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, SendError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: vec!["message", "callback_query"],
        };
        self.call("getUpdates", &request, self.poll_timeout + POLL_GRACE).await
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), SendError> {
        let request =
            AnswerCallbackQueryRequest { callback_query_id: callback_query_id.to_owned() };
        let _: bool = self.call("answerCallbackQuery", &request, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, SendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{method}", self.base_url, self.token.expose_secret());
        let response = self
            .http
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status().as_u16();
        match response.json::<ApiResponse<T>>().await {
            Ok(ApiResponse { ok: true, result: Some(result), .. }) => Ok(result),
            Ok(failure) => {
                let retry_after = failure.parameters.and_then(|parameters| parameters.retry_after);
                let description =
                    failure.description.unwrap_or_else(|| "no description".to_owned());
                debug!(
                    event_name = "telegram.api_failure",
                    method,
                    status,
                    error_code = failure.error_code,
                    description = %description,
                    "bot api call failed"
                );
                Err(classify_api_failure(status, failure.error_code, retry_after, description))
            }
            Err(error) => Err(classify_api_failure(
                status,
                None,
                None,
                format!("undecodable response: {}", error.without_url()),
            )),
        }
    }
}

#[async_trait]
impl MessageTransport for BotApiClient {
    async fn send(&self, recipient: UserId, message: &OutboundMessage) -> Result<(), SendError> {
        let request = send_message_request(recipient, message);
        let _: IgnoredAny = self.call("sendMessage", &request, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

/// Network level failures. The url is stripped because it carries the token.
fn classify_request_error(error: reqwest::Error) -> SendError {
    let error = error.without_url();
    if error.is_timeout() || error.is_connect() || error.is_request() {
        SendError::Transient(error.to_string())
    } else {
        SendError::Permanent(error.to_string())
    }
}

pub fn classify_api_failure(
    status: u16,
    error_code: Option<u16>,
    retry_after: Option<u64>,
    description: String,
) -> SendError {
    let code = error_code.unwrap_or(status);
    if code == 429 || status == 429 {
        return match retry_after {
            Some(seconds) => SendError::RateLimited { retry_after: Duration::from_secs(seconds) },
            None => SendError::Transient(format!("429: {description}")),
        };
    }
    if status >= 500 || code >= 500 {
        return SendError::Transient(format!("{code}: {description}"));
    }
    SendError::Permanent(format!("{code}: {description}"))
}
