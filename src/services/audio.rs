use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::services::llm::env_string;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio pipeline not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} from {service}")]
    HttpStatus {
        service: &'static str,
        status: reqwest::StatusCode,
    },
}

#[derive(Debug, Deserialize)]
struct TtsHealth {
    status: String,
}

/// Client for the speech-synthesis HTTP service.
#[derive(Clone)]
struct TtsClient {
    base_url: String,
    client: reqwest::Client,
}

impl TtsClient {
    fn new(base_url: String, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    async fn health_check(&self) -> Result<(), AudioError> {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(AudioError::HttpStatus {
                service: "tts",
                status: resp.status(),
            });
        }

        let health: TtsHealth = resp.json().await?;
        if health.status != "ok" && health.status != "healthy" {
            return Err(AudioError::HttpStatus {
                service: "tts",
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            });
        }
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AudioError> {
        let url = format!("{}/api/tts", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AudioError::HttpStatus {
                service: "tts",
                status: resp.status(),
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

/// Client for the S3-compatible audio bucket, spoken to through its HTTP
/// gateway: PUT uploads an object, public URLs are served from the same key.
#[derive(Clone)]
struct StorageClient {
    endpoint: String,
    bucket: String,
    token: Option<String>,
    public_base: String,
    client: reqwest::Client,
}

impl StorageClient {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String, AudioError> {
        let url = format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            key
        );

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", "audio/wav")
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(AudioError::HttpStatus {
                service: "storage",
                status: resp.status(),
            });
        }

        Ok(format!(
            "{}/{}/{}",
            self.public_base.trim_end_matches('/'),
            self.bucket,
            key
        ))
    }
}

/// TTS + object storage composed into the single best-effort collaborator the
/// news pipeline talks to.
#[derive(Clone)]
pub struct AudioService {
    tts: Option<TtsClient>,
    storage: Option<StorageClient>,
}

impl AudioService {
    pub fn from_env() -> Self {
        let timeout = Duration::from_millis(
            std::env::var("AUDIO_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let tts = env_string("TTS_SERVICE_URL").map(|url| TtsClient::new(url, client.clone()));

        let storage = env_string("AUDIO_STORAGE_ENDPOINT").map(|endpoint| StorageClient {
            public_base: env_string("AUDIO_STORAGE_PUBLIC_URL").unwrap_or_else(|| endpoint.clone()),
            endpoint,
            bucket: env_string("AUDIO_STORAGE_BUCKET").unwrap_or_else(|| "lexnews-audio".to_string()),
            token: env_string("AUDIO_STORAGE_TOKEN"),
            client,
        });

        Self { tts, storage }
    }

    pub fn is_available(&self) -> bool {
        self.tts.is_some() && self.storage.is_some()
    }

    pub async fn synthesize_and_store(
        &self,
        text: &str,
        news_id: &str,
    ) -> Result<StoredAudio, AudioError> {
        let tts = self
            .tts
            .as_ref()
            .ok_or(AudioError::NotConfigured("TTS_SERVICE_URL"))?;
        let storage = self
            .storage
            .as_ref()
            .ok_or(AudioError::NotConfigured("AUDIO_STORAGE_ENDPOINT"))?;

        tts.health_check().await?;
        let audio = tts.synthesize(text).await?;

        let key = format!("news/{news_id}.wav");
        let url = storage.upload(&key, audio).await?;

        tracing::info!(news_id, %url, "audio stored");
        Ok(StoredAudio { url, key })
    }
}
