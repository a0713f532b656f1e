// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! AI collaborator contract and an HTTP implementation

use async_trait::async_trait;

use super::results::{AiAnalysis, AnalyticsResults};
use crate::error::Result;
use crate::tracking::AnalysisInput;

/// External AI analysis service.
///
/// Only consulted when a caller explicitly routes through AI; a failure
/// leaves the statistical results in place without `ai` metadata.
#[async_trait]
pub trait AiAnalyzer: Send + Sync {
    /// Provider name reported in metadata
    fn provider(&self) -> &str;

    /// Analyze `input`, given the locally computed statistical results
    async fn analyze(&self, input: &AnalysisInput, local: &AnalyticsResults) -> Result<AiAnalysis>;
}

#[cfg(feature = "http-ai")]
pub use http::HttpAiAnalyzer;

#[cfg(feature = "http-ai")]
mod http {
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use chrono::Utc;
    use reqwest::Client;
    use secrecy::{ExposeSecret, SecretString};
    use serde::Deserialize;
    use serde_json::json;
    use tracing::{debug, info};

    use super::AiAnalyzer;
    use crate::analysis::results::{AiAnalysis, AnalyticsResults, TokenUsage};
    use crate::config::AiConfig;
    use crate::error::{AnalyticsError, Result};
    use crate::tracking::AnalysisInput;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct AiReply {
        model: Option<String>,
        insights: Vec<String>,
        caveats: Vec<String>,
        usage: Option<TokenUsage>,
        confidence: Option<f64>,
    }

    /// Posts a summary of the analysis to a JSON endpoint
    pub struct HttpAiAnalyzer {
        client: Client,
        endpoint: String,
        model: String,
        api_key: Option<SecretString>,
    }

    impl HttpAiAnalyzer {
        /// Build from configuration; `None` when no endpoint is configured
        pub fn from_config(config: &AiConfig) -> Result<Option<Self>> {
            let Some(endpoint) = config.endpoint.clone() else {
                return Ok(None);
            };
            let client = Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| AnalyticsError::Ai(e.to_string()))?;
            let api_key = std::env::var(&config.api_key_env).ok().map(SecretString::new);
            info!("AI analyzer configured for {}", endpoint);
            Ok(Some(Self {
                client,
                endpoint,
                model: config.model.clone(),
                api_key,
            }))
        }
    }

    #[async_trait]
    impl AiAnalyzer for HttpAiAnalyzer {
        fn provider(&self) -> &str {
            "http"
        }

        async fn analyze(&self, input: &AnalysisInput, local: &AnalyticsResults) -> Result<AiAnalysis> {
            let body = json!({
                "model": self.model,
                "studentId": input.student_id,
                "sessions": input.entries.len(),
                "emotions": input.emotions.len(),
                "sensoryInputs": input.sensory_inputs.len(),
                "goals": input.goals.len(),
                "statistics": local,
            });

            let started = Instant::now();
            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key.expose_secret());
            }
            let response = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| AnalyticsError::Ai(e.to_string()))?;
            let reply: AiReply = response.json().await.map_err(|e| AnalyticsError::Ai(e.to_string()))?;
            let latency_ms = started.elapsed().as_millis() as u64;
            debug!("AI analysis answered in {} ms", latency_ms);

            Ok(AiAnalysis {
                provider: self.provider().to_string(),
                model: reply.model.unwrap_or_else(|| self.model.clone()),
                latency_ms,
                usage: reply.usage,
                caveats: reply.caveats,
                insights: reply.insights,
                data_lineage: vec![
                    format!("{} tracking entries", input.entries.len()),
                    format!("{} goals", input.goals.len()),
                ],
                confidence: reply.confidence,
                created_at: Utc::now(),
            })
        }
    }
}
