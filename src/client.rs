use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClientError, classify_status};
use crate::session::{SESSION_TTL, SessionCache};
use crate::sse::EventStream;
use crate::types::*;

const DEFAULT_BASE_URL: &str = "https://chat.openai.com";

/// Client for the ChatGPT backend API.
///
/// Owns the session cache and the single cancellation handle: starting a
/// new request supersedes any in-flight one, and [`abort_requests`]
/// cancels the current one outright. A superseded or aborted call makes
/// no further callback invocations.
///
/// [`abort_requests`]: ChatGptClient::abort_requests
pub struct ChatGptClient {
    base_url: String,
    http: Client,
    model: String,
    session_cache: SessionCache,
    cancel: Mutex<CancellationToken>,
}

impl ChatGptClient {
    /// Create a client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a client builder.
    pub fn builder() -> ChatGptClientBuilder {
        ChatGptClientBuilder::new()
    }

    fn full_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Swap in a fresh cancellation token, cancelling whichever request
    /// held the previous one.
    fn begin_request(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = {
            let mut current = self.cancel.lock().expect("cancel handle lock poisoned");
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();
        token
    }

    /// Cancel the in-flight request, if any. Its pending network work is
    /// dropped and it delivers no further callbacks.
    pub fn abort_requests(&self) {
        self.cancel
            .lock()
            .expect("cancel handle lock poisoned")
            .cancel();
    }

    /// Fetch the authentication session, memoized for the cache TTL.
    ///
    /// Fails with `Unauthorized` when the response carries no access
    /// token, which is how the endpoint signals a signed-out browser.
    pub async fn get_session(&self) -> Result<ApiSession, ClientError> {
        let url = self.full_url("/api/auth/session");
        let http = self.http.clone();
        self.session_cache
            .get_or_fetch(|| async move {
                let response = http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(classify_status(status));
                }
                let session: ApiSession = response
                    .json()
                    .await
                    .map_err(|err| ClientError::Unknown(Some(err.to_string())))?;
                if session.access_token.is_empty() {
                    return Err(ClientError::Unauthorized);
                }
                Ok(session)
            })
            .await
    }

    /// Run one streamed conversation exchange.
    ///
    /// `on_message` is invoked once per decoded message, in arrival order,
    /// and exactly once with `done == true` unless the call is aborted or
    /// superseded first. Errors classified before or during the exchange
    /// are returned without any retry.
    pub async fn conversation<F>(
        &self,
        params: ConversationParams,
        mut on_message: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(Option<ConversationResponse>, bool),
    {
        let token = self.begin_request();
        let session = self.get_session().await?;

        let body = ConversationBody {
            action: "next".to_string(),
            model: self.model.clone(),
            parent_message_id: params
                .parent_message_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            conversation_id: params.conversation_id,
            messages: vec![ConversationMessage {
                id: Uuid::new_v4().to_string(),
                role: "user".to_string(),
                content: MessageContent {
                    content_type: "text".to_string(),
                    parts: vec![params.text],
                },
            }],
        };

        let request = self
            .http
            .post(self.full_url("/backend-api/conversation"))
            .bearer_auth(&session.access_token)
            .json(&body);

        debug!("dispatching conversation request");
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("conversation aborted while sending");
                return Ok(());
            }
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let mut events =
            EventStream::<_, ConversationEvent>::new(response.bytes_stream().boxed(), STREAM_DONE_TOKEN);

        loop {
            // `biased` checks the token first: frames already buffered must
            // not beat a cancellation the callback itself may have issued.
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("conversation aborted while streaming");
                    return Ok(());
                }
                event = events.next() => event,
            };
            let Some(event) = event else {
                break;
            };
            let event = event?;

            let Some(message) = event.payload.as_ref().and_then(|p| p.message.clone()) else {
                // Terminator frame, or a payload with no message in it;
                // either way the exchange is over for the caller.
                on_message(None, true);
                return Ok(());
            };

            let text = message
                .content
                .as_ref()
                .and_then(|content| content.parts.first())
                .filter(|text| !text.is_empty());
            if let Some(text) = text {
                let conversation_id = event
                    .payload
                    .and_then(|p| p.conversation_id)
                    .unwrap_or_default();
                on_message(
                    Some(ConversationResponse {
                        text: text.clone(),
                        message_id: message.id,
                        conversation_id,
                    }),
                    event.done,
                );
            }
            if event.done {
                debug!("conversation stream complete");
                return Ok(());
            }
        }

        Ok(())
    }

    /// Partially update a conversation's properties (visibility, title).
    pub async fn set_conversation_property(
        &self,
        conversation_id: &str,
        props: &ConversationProperty,
    ) -> Result<(), ClientError> {
        let token = self.begin_request();
        let session = self.get_session().await?;

        let request = self
            .http
            .patch(self.full_url(&format!("/backend-api/conversation/{conversation_id}")))
            .bearer_auth(&session.access_token)
            .json(props);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("property update aborted");
                return Ok(());
            }
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        // The response body is ignored by callers.
        Ok(())
    }
}

impl Default for ChatGptClient {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChatGptClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    model: Option<String>,
    session_ttl: Option<Duration>,
}

impl ChatGptClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: None,
            model: None,
            session_ttl: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Overall request timeout. Unset by default: streamed responses stay
    /// open for as long as the model keeps generating.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn build(self) -> ChatGptClient {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let session_ttl = self.session_ttl.unwrap_or(SESSION_TTL);

        let mut http = Client::builder().connect_timeout(Duration::from_secs(30));
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build().expect("failed to create HTTP client");

        ChatGptClient {
            base_url,
            http,
            model,
            session_cache: SessionCache::new(session_ttl),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

impl Default for ChatGptClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
