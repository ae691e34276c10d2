//! HTTP client for the synthesis call
//!
//! Sends one POST, classifies transport and status failures and turns the provider's
//! JSON envelope into a [`SynthesisResponse`]. Retrying is left to the caller.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ProviderProfile;
use crate::error::{snippet, Result, TtsBridgeError};
use crate::request::ProviderRequest;

/// Parsed provider answer
///
/// At least one of `audio_url` and `audio_bytes` is set; [`parse_response`] fails
/// with `MissingAudio` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResponse {
    pub message: Option<String>,
    /// Absolute URL of the synthesized audio
    pub audio_url: Option<String>,
    pub audio_bytes: Option<Bytes>,
}

/// Provider JSON envelope
///
/// Knob-schema services answer `{msg?, audio_url?, audio?}`; gradio answers
/// `{data: [...], error?}`. Some gradio deployments front the knob envelope instead,
/// so both shapes are read into one struct.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    audio_url: Option<String>,
    /// Base64 audio some deployments return instead of a URL
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Where the provider put the audio
enum AudioLocation {
    Url(String),
    Inline(Bytes),
}

fn decode_base64(encoded: &str, raw_body: &str) -> Result<Bytes> {
    STANDARD
        .decode(encoded.trim())
        .map(Bytes::from)
        .map_err(|e| {
            log::error!("Inline audio is not valid base64: {}", e);
            TtsBridgeError::malformed(raw_body)
        })
}

/// Interpret a location string: `data:` URL, absolute URL or a path relative to the service
fn locate(location: &str, profile: ProviderProfile, base_url: &str, raw_body: &str) -> Result<Option<AudioLocation>> {
    let location = location.trim();
    if location.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = location.strip_prefix("data:") {
        let (meta, data) = rest.split_once(',').ok_or_else(|| TtsBridgeError::malformed(raw_body))?;
        if !meta.ends_with(";base64") {
            return Err(TtsBridgeError::malformed(raw_body));
        }
        return decode_base64(data, raw_body).map(|b| Some(AudioLocation::Inline(b)));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Some(AudioLocation::Url(location.to_string())));
    }

    let url = match profile {
        // gradio serves generated files through its `file=` route
        ProviderProfile::LegacyV1 => format!("{}/file={}", base_url.trim_end_matches('/'), location),
        ProviderProfile::TokenQuery | ProviderProfile::BearerAuth => Url::parse(base_url)
            .and_then(|base| base.join(location))
            .map(String::from)
            .map_err(|_| TtsBridgeError::malformed(raw_body))?,
    };
    Ok(Some(AudioLocation::Url(url)))
}

fn gradio_location(output: &Value) -> Option<&str> {
    match output {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["url", "data", "name", "path"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty()),
        _ => None,
    }
}

fn knob_location(envelope: &Envelope, profile: ProviderProfile, base_url: &str, body: &str) -> Result<Option<AudioLocation>> {
    match (&envelope.audio_url, &envelope.audio) {
        (Some(url), _) if !url.trim().is_empty() => locate(url, profile, base_url, body),
        (_, Some(audio)) if !audio.trim().is_empty() => Ok(Some(AudioLocation::Inline(decode_base64(audio, body)?))),
        _ => Ok(None),
    }
}

/// Parse a 2xx body according to `profile`
pub fn parse_response(body: &str, profile: ProviderProfile, base_url: &str) -> Result<SynthesisResponse> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        log::error!("Failed to parse TTS response: {}", e);
        TtsBridgeError::malformed(body)
    })?;

    let location = match profile {
        ProviderProfile::LegacyV1 => match envelope
            .data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|outputs| outputs.first())
            .and_then(gradio_location)
        {
            Some(location) => locate(location, profile, base_url, body)?,
            None => knob_location(&envelope, profile, base_url, body)?,
        },
        ProviderProfile::TokenQuery | ProviderProfile::BearerAuth => knob_location(&envelope, profile, base_url, body)?,
    };
    let message = envelope
        .msg
        .or_else(|| envelope.error.as_ref().and_then(Value::as_str).map(str::to_string));

    match location {
        Some(AudioLocation::Url(url)) => Ok(SynthesisResponse {
            message,
            audio_url: Some(url),
            audio_bytes: None,
        }),
        Some(AudioLocation::Inline(bytes)) if !bytes.is_empty() => Ok(SynthesisResponse {
            message,
            audio_url: None,
            audio_bytes: Some(bytes),
        }),
        _ => {
            log::error!(
                "TTS response carries no audio (msg: {})",
                message.as_deref().unwrap_or("<none>")
            );
            Err(TtsBridgeError::MissingAudio { message })
        }
    }
}

/// Classify a reqwest failure of the synthesis call
fn transport_error(err: reqwest::Error) -> TtsBridgeError {
    let cause = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    TtsBridgeError::Transport { cause }
}

/// Synthesis POST client
#[derive(Debug, Clone)]
pub struct HttpSynthesisClient {
    client: Client,
}

impl HttpSynthesisClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tts-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TtsBridgeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Underlying reqwest client, shared with the audio download
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Issue the synthesis POST and parse the answer
    pub async fn send(&self, call_id: Uuid, request: &ProviderRequest, timeout: Duration) -> Result<SynthesisResponse> {
        log::debug!(
            "[{}] Sending TTS request to {} ({}, timeout {:?})",
            call_id,
            request.url,
            request.profile.as_str(),
            timeout
        );

        let response = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                log::error!("[{}] TTS request failed: {}", call_id, e);
                transport_error(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            log::error!("[{}] Failed to read TTS response body: {}", call_id, e);
            transport_error(e)
        })?;

        if !status.is_success() {
            log::error!("[{}] TTS HTTP error (status {}): {}", call_id, status, snippet(&body));
            return Err(TtsBridgeError::http_status(status.as_u16(), &body));
        }

        parse_response(&body, request.profile, &request.base_url)
    }
}
