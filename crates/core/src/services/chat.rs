//! Chat (WhatsApp gateway) channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::channels::{ChannelAdapter, ChannelMessage, Recipient};
use super::credentials::{ClientCache, CredentialKind, CredentialResolver, Credentials};
use super::event::Channel;

/// HTTP client bound to one tenant's gateway credentials.
#[derive(Debug)]
pub struct ChatGatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    instance: String,
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendTextResponse {
    key: Option<MessageKey>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

impl ChatGatewayClient {
    /// Create a client for one gateway instance.
    pub fn new(base_url: &str, api_key: &str, instance: &str, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            instance: instance.to_string(),
        })
    }

    /// URL of the send-text operation for this instance.
    #[must_use]
    pub fn send_text_url(&self) -> String {
        format!("{}/message/sendText/{}", self.base_url, self.instance)
    }

    /// Send a text message and return the gateway's message id.
    pub async fn send_text(&self, number: &str, text: &str) -> AppResult<Option<String>> {
        let response = self
            .http
            .post(self.send_text_url())
            .header("apikey", &self.api_key)
            .json(&SendTextRequest { number, text })
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Chat gateway unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Chat gateway returned {status}: {body}"
            )));
        }

        let parsed: SendTextResponse = response
            .json()
            .await
            .unwrap_or(SendTextResponse { key: None });
        Ok(parsed.key.and_then(|k| k.id))
    }
}

/// Chat adapter. Clients are built per tenant on first use.
#[derive(Clone)]
pub struct ChatChannel {
    credentials: Arc<dyn CredentialResolver>,
    clients: ClientCache<ChatGatewayClient>,
    timeout: Duration,
}

impl ChatChannel {
    /// Create a new chat channel.
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialResolver>,
        clients: ClientCache<ChatGatewayClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            clients,
            timeout,
        }
    }

    async fn client_for(&self, tenant_id: &str) -> AppResult<Arc<ChatGatewayClient>> {
        self.clients
            .get_or_try_init(CredentialKind::ChatGateway, tenant_id, || async {
                match self
                    .credentials
                    .resolve(CredentialKind::ChatGateway, tenant_id)
                    .await?
                {
                    Some(Credentials::ChatGateway {
                        base_url,
                        api_key,
                        instance,
                    }) => ChatGatewayClient::new(&base_url, &api_key, &instance, self.timeout),
                    _ => Err(AppError::Config(format!(
                        "No chat gateway configured for tenant {tenant_id}"
                    ))),
                }
            })
            .await
    }
}

/// Render a message as chat text.
#[must_use]
pub fn format_text(message: &ChannelMessage) -> String {
    if message.body.is_empty() {
        format!("*{}*", message.title)
    } else {
        format!("*{}*\n{}", message.title, message.body)
    }
}

#[async_trait]
impl ChannelAdapter for ChatChannel {
    fn channel(&self) -> Channel {
        Channel::Chat
    }

    async fn send(
        &self,
        recipient: &Recipient,
        message: &ChannelMessage,
    ) -> AppResult<Option<String>> {
        let number = recipient
            .phone
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("No phone number on file".to_string()))?;

        let client = self.client_for(&recipient.tenant_id).await?;
        client.send_text(number, &format_text(message)).await
    }
}
