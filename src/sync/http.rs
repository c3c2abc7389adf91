//! [`ClientDirectory`] backed by the roster service's REST and SSE endpoints.

use async_trait::async_trait;
use chrono::SecondsFormat;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::auth::{API_KEY_HEADER, SESSION_HEADER};
use crate::errors::ErrorResponse;
use crate::models::{ClientListResponse, CurrentUser, Snapshot, SuccessResponse, Watermark};

use super::{ClientDirectory, SnapshotStream, SyncError};

/// Body of an `error` event on the feed.
#[derive(Debug, Deserialize)]
struct FeedErrorBody {
    message: String,
}

/// HTTP client for one coach session.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(
        base_url: impl Into<String>,
        api_psk: Option<&str>,
        session_token: &str,
    ) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        if let Some(psk) = api_psk {
            headers.insert(API_KEY_HEADER, header_value(psk)?);
        }
        headers.insert(SESSION_HEADER, header_value(session_token)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ClientDirectory for HttpDirectory {
    async fn current_user(&self) -> Result<CurrentUser, SyncError> {
        let resp = self.client.get(self.url("/api/auth/me")).send().await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn list_clients(&self, coach: &CurrentUser) -> Result<ClientListResponse, SyncError> {
        tracing::debug!(coach_id = %coach.uid, "Listing clients");
        let resp = self.client.get(self.url("/api/clients")).send().await?;
        let body: ClientListResponse = check_status(resp).await?.json().await?;
        if !body.success {
            return Err(SyncError::Rejected);
        }
        Ok(body)
    }

    async fn delete_client(&self, coach: &CurrentUser, client_id: &str) -> Result<(), SyncError> {
        tracing::debug!(coach_id = %coach.uid, %client_id, "Deleting client");
        let resp = self
            .client
            .delete(self.url(&format!("/api/clients/{}", client_id)))
            .send()
            .await?;
        let body: SuccessResponse = check_status(resp).await?.json().await?;
        if !body.success {
            return Err(SyncError::Rejected);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        coach: &CurrentUser,
        watermark: Watermark,
    ) -> Result<SnapshotStream, SyncError> {
        tracing::debug!(coach_id = %coach.uid, %watermark, "Opening client feed");

        let query = match watermark {
            Watermark::After(seq) => ("after", seq.to_string()),
            Watermark::Since(at) => ("since", at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        };
        let resp = self
            .client
            .get(self.url("/api/clients/feed"))
            .query(&[query])
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let stream = resp
            .bytes_stream()
            .eventsource()
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => match event.event.as_str() {
                        "snapshot" => Some(
                            serde_json::from_str::<Snapshot>(&event.data)
                                .map_err(|e| SyncError::Decode(e.to_string())),
                        ),
                        "error" => {
                            let message = serde_json::from_str::<FeedErrorBody>(&event.data)
                                .map(|b| b.message)
                                .unwrap_or(event.data);
                            Some(Err(SyncError::Feed(message)))
                        }
                        _ => None,
                    },
                    Err(e) => Some(Err(SyncError::Feed(e.to_string()))),
                })
            })
            .boxed();

        Ok(stream)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SyncError> {
    HeaderValue::from_str(value).map_err(|e| SyncError::Http(format!("invalid header value: {}", e)))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let message = resp
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error.message)
        .unwrap_or_else(|_| "unexpected response".to_string());
    Err(SyncError::Status { status, message })
}
