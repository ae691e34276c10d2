//! tts-bridge: client side of a remote text-to-speech service
//!
//! A call runs parameter resolution, request assembly, the synthesis POST and audio
//! retrieval in sequence, and either returns the audio or pushes it to a messaging
//! channel. Retryable failures (transport, HTTP status, download) re-run the whole
//! pipeline according to `HTTP_RETRY_COUNT`.

pub mod audio;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod params;
pub mod request;
pub mod retry;

use std::path::PathBuf;
use std::sync::Arc;

pub use crate::audio::{AudioAsset, AudioFormat};
pub use crate::client::SynthesisResponse;
pub use crate::config::{ConfigStore, ProviderConfig, ProviderProfile};
pub use crate::dispatch::{AudioPayload, ConversationTarget, MessageSender, SendError};
pub use crate::error::{Bound, ErrorKind, Result, TtsBridgeError};
pub use crate::params::SynthesisOverrides;

use crate::audio::{AudioResolver, DownloadOptions};
use crate::client::HttpSynthesisClient;
use crate::retry::RetryPolicy;

/// Entry point for synthesis calls
///
/// Cheap to share between tasks; every call reads its own config snapshot.
pub struct TtsBridge {
    config: Arc<ConfigStore>,
    client: HttpSynthesisClient,
    retry_override: Option<RetryPolicy>,
}

impl TtsBridge {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Self::with_store(Arc::new(ConfigStore::new(config)))
    }

    pub fn with_store(config: Arc<ConfigStore>) -> Result<Self> {
        Ok(Self {
            config,
            client: HttpSynthesisClient::new()?,
            retry_override: None,
        })
    }

    /// Load the persisted configuration at `path` and set up logging from it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = ConfigStore::open(path)?;
        logger::init_logger(&store.snapshot().log_level);
        log::info!("TTS bridge mounted ({})", store.snapshot().profile.as_str());
        Self::with_store(Arc::new(store))
    }

    /// Use a fixed retry policy instead of one derived from `HTTP_RETRY_COUNT`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_override = Some(policy);
        self
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Synthesize `text` and return the audio
    pub async fn synthesize(&self, text: &str, overrides: SynthesisOverrides) -> Result<AudioAsset> {
        let config = self.config.snapshot();
        self.synthesize_with(&config, text, overrides).await
    }

    /// One pipeline run against a single config snapshot
    async fn synthesize_with(
        &self,
        config: &ProviderConfig,
        text: &str,
        overrides: SynthesisOverrides,
    ) -> Result<AudioAsset> {
        let call_id = uuid::Uuid::new_v4();
        log::info!(
            "[{}] Synthesizing {} chars via {}",
            call_id,
            text.chars().count(),
            config.profile.as_str()
        );

        let resolved = params::resolve(text, overrides, config).map_err(|e| {
            log::error!("[{}] Parameter validation failed: {}", call_id, e);
            e
        })?;
        log::debug!("[{}] Resolved parameters: {:?}", call_id, resolved);

        let request = request::build(&resolved, config).map_err(|e| {
            log::error!("[{}] Failed to build TTS request: {}", call_id, e);
            e
        })?;
        let resolver =
            AudioResolver::new(self.client.inner().clone(), DownloadOptions::from(config)).for_call(call_id);
        let policy = self
            .retry_override
            .clone()
            .unwrap_or_else(|| RetryPolicy::from_retry_count(config.retry_count));
        let timeout = config.timeout();

        let client = &self.client;
        let request = &request;
        let resolver = &resolver;
        let result = policy
            .run(move |attempt| async move {
                log::debug!("[{}] Attempt {}", call_id, attempt);
                let response = client.send(call_id, request, timeout).await?;
                if let Some(message) = &response.message {
                    log::debug!("[{}] Provider message: {}", call_id, message);
                }
                resolver.resolve(&response).await
            })
            .await;

        match result {
            Ok(asset) => {
                log::info!("[{}] Synthesized {} bytes of audio", call_id, asset.len());
                Ok(asset)
            }
            Err(e) => {
                log::error!("[{}] TTS failed ({:?}): {}", call_id, e.kind(), e);
                Err(e)
            }
        }
    }

    /// Tool-call form: raw WAV bytes
    pub async fn synthesize_bytes(&self, text: &str, overrides: SynthesisOverrides) -> Result<Vec<u8>> {
        self.synthesize(text, overrides).await.map(AudioAsset::into_vec)
    }

    /// Synthesize `text` and send it to the conversation `conversation_id`
    pub async fn synthesize_and_push(
        &self,
        text: &str,
        overrides: SynthesisOverrides,
        conversation_id: &str,
        sender: &dyn MessageSender,
    ) -> Result<()> {
        // reject a bad target before spending a synthesis call on it
        ConversationTarget::parse(conversation_id)?;

        let config = self.config.snapshot();
        let asset = self.synthesize_with(&config, text, overrides).await?;
        dispatch::push(sender, conversation_id, &asset, config.push_source_url).await
    }

    /// Unmount hook; per-call resources are already released
    pub async fn cleanup(&self) {
        log::info!("TTS bridge resources cleaned up");
    }
}

/// One-shot synthesis with an explicit configuration
pub async fn synthesize_speech(config: ProviderConfig, text: &str, overrides: SynthesisOverrides) -> Result<Vec<u8>> {
    TtsBridge::new(config)?.synthesize_bytes(text, overrides).await
}
