//! Mastodon REST + streaming client
//!
//! Concrete `AccountClient` over the Mastodon v1/v2 HTTP API. Every
//! response goes through one status classifier so the engines see the
//! `ClientError` taxonomy instead of raw HTTP.

use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use async_trait::async_trait;

use crate::data::{Account, Post, RemoteList};

use super::{AccountClient, ClientError, EventStream, StreamEvent};

const ERROR_BODY_PREVIEW: usize = 200;

/// Mastodon API client
///
/// Holds the authenticated identity's own account ID, resolved once at
/// connect time, for the `following` endpoint.
pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    own_account_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    accounts: Vec<Account>,
}

impl MastodonClient {
    /// Connect to an instance and verify the access token
    ///
    /// Resolves the authenticated account via `verify_credentials`; a
    /// rejected token fails here, before any worker starts.
    pub async fn connect(
        http: reqwest::Client,
        base_url: &str,
        access_token: &str,
    ) -> Result<Self, ClientError> {
        let mut client = Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            own_account_id: String::new(),
        };

        let me: Account = client
            .get_json(&client.api_url("/api/v1/accounts/verify_credentials"), &[])
            .await?;
        tracing::info!(acct = %me.acct, account_id = %me.id, "Authenticated against Mastodon instance");

        client.own_account_id = me.id;
        Ok(client)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        checked(response).await?.json().await.map_err(transport_error)
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), ClientError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        checked(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountClient for MastodonClient {
    async fn search_account(&self, handle: &str) -> Result<Option<Account>, ClientError> {
        let results: SearchResults = self
            .get_json(
                &self.api_url("/api/v2/search"),
                &[
                    ("q", handle),
                    ("type", "accounts"),
                    ("resolve", "true"),
                    ("limit", "1"),
                ],
            )
            .await?;
        Ok(results.accounts.into_iter().next())
    }

    async fn recent_posts(&self, account_id: &str, limit: usize) -> Result<Vec<Post>, ClientError> {
        let limit = limit.to_string();
        self.get_json(
            &self.api_url(&format!("/api/v1/accounts/{}/statuses", account_id)),
            &[("limit", limit.as_str())],
        )
        .await
    }

    async fn follow(&self, account_id: &str) -> Result<(), ClientError> {
        self.post_json(
            &self.api_url(&format!("/api/v1/accounts/{}/follow", account_id)),
            &serde_json::json!({}),
        )
        .await
    }

    async fn lists(&self) -> Result<Vec<RemoteList>, ClientError> {
        self.get_json(&self.api_url("/api/v1/lists"), &[]).await
    }

    async fn create_list(&self, title: &str) -> Result<RemoteList, ClientError> {
        let response = self
            .http
            .post(self.api_url("/api/v1/lists"))
            .json(&serde_json::json!({ "title": title }))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        checked(response).await?.json().await.map_err(transport_error)
    }

    async fn list_members(&self, list_id: &str) -> Result<Vec<Account>, ClientError> {
        self.get_json(
            &self.api_url(&format!("/api/v1/lists/{}/accounts", list_id)),
            &[("limit", "80")],
        )
        .await
    }

    async fn add_to_list(&self, list_id: &str, account_id: &str) -> Result<(), ClientError> {
        self.post_json(
            &self.api_url(&format!("/api/v1/lists/{}/accounts", list_id)),
            &serde_json::json!({ "account_ids": [account_id] }),
        )
        .await
    }

    // TODO: follow the Link pagination header; one page covers 80
    // followings, beyond that the engine falls back on idempotent follows.
    async fn following(&self) -> Result<Vec<Account>, ClientError> {
        self.get_json(
            &self.api_url(&format!(
                "/api/v1/accounts/{}/following",
                self.own_account_id
            )),
            &[("limit", "80")],
        )
        .await
    }

    async fn subscribe_list(&self, list_id: &str) -> Result<EventStream, ClientError> {
        let response = self
            .http
            .get(self.api_url("/api/v1/streaming/list"))
            .query(&[("list", list_id)])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = checked(response).await?;

        let mut parser = SseParser::default();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => parser
                    .push(&bytes)
                    .into_iter()
                    .filter_map(message_to_event)
                    .map(Ok)
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(ClientError::Transient(e.to_string()))],
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(events))
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    ClientError::Transient(e.to_string())
}

/// Pass through a successful response, classify everything else
async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> ClientError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::UNPROCESSABLE_ENTITY if mentions_already_satisfied(body) => {
            ClientError::AlreadyDone
        }
        s if s.is_server_error() => {
            ClientError::Transient(format!("HTTP {}: {}", s.as_u16(), preview(body)))
        }
        s => ClientError::Permanent(format!("HTTP {}: {}", s.as_u16(), preview(body))),
    }
}

/// "Already following", "already taken" and friends are success in disguise
fn mentions_already_satisfied(body: &str) -> bool {
    body.to_ascii_lowercase().contains("already")
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

// =============================================================================
// Server-sent events
// =============================================================================

/// One parsed SSE message
#[derive(Debug, PartialEq)]
struct SseMessage {
    event: String,
    data: String,
}

/// Incremental SSE frame parser
///
/// Chunk boundaries are arbitrary; complete messages are terminated by a
/// blank line. Comment lines (`:thump` keepalives) are dropped.
#[derive(Default)]
struct SseParser {
    buffer: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer
            .push_str(&String::from_utf8_lossy(chunk).replace('\r', ""));

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(message) = parse_block(&block) {
                messages.push(message);
            }
        }
        messages
    }
}

fn parse_block(block: &str) -> Option<SseMessage> {
    let mut event = String::new();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }
    Some(SseMessage {
        event,
        data: data_lines.join("\n"),
    })
}

fn message_to_event(message: SseMessage) -> Option<StreamEvent> {
    match message.event.as_str() {
        "update" | "status.update" => match serde_json::from_str::<Post>(&message.data) {
            Ok(post) => Some(StreamEvent::Update(post)),
            Err(error) => {
                tracing::warn!(%error, "Dropping undecodable stream payload");
                None
            }
        },
        "delete" => Some(StreamEvent::Delete(message.data.trim().to_string())),
        other => {
            tracing::debug!(event = %other, "Ignoring stream event type");
            None
        }
    }
}
