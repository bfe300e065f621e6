use async_trait::async_trait;
use contracts::domain::a025_mp_returns::{ReturnsListRequest, ReturnsListResponse};

use super::error::FetchError;
use crate::shared::config::ApiConfig;

/// Трейт для источника списка возвратов (upstream-сервис)
#[async_trait]
pub trait ReturnsApi: Send + Sync {
    /// Получить страницу возвратов по запросу
    async fn list_returns(
        &self,
        request: &ReturnsListRequest,
    ) -> Result<ReturnsListResponse, FetchError>;
}

/// HTTP-клиент upstream-сервиса возвратов
pub struct HttpReturnsApi {
    client: reqwest::Client,
    url: String,
}

impl HttpReturnsApi {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.returns_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReturnsApi for HttpReturnsApi {
    async fn list_returns(
        &self,
        request: &ReturnsListRequest,
    ) -> Result<ReturnsListResponse, FetchError> {
        tracing::debug!(
            "POST {} accounts={:?} offset={} limit={}",
            self.url,
            request.account_ids,
            request.pagination.offset,
            request.pagination.limit
        );

        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(500).collect();
            tracing::error!("Returns API request failed: {} {}", status, preview);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<ReturnsListResponse>(&body).map_err(|e| {
            let preview: String = body.chars().take(500).collect();
            tracing::error!("Failed to parse returns API response: {}. Body: {}", e, preview);
            FetchError::Decode(e.to_string())
        })
    }
}
