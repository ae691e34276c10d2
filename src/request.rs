//! Provider request assembly
//!
//! One builder covers all [`ProviderProfile`] variants. The decoding knobs are not
//! exposed to callers; each profile gets the constants its service expects.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{ProviderConfig, ProviderProfile};
use crate::error::{Bound, Result, TtsBridgeError};
use crate::params::ResolvedParams;

pub const TOP_K: u32 = 10;
pub const TOP_P: f64 = 1.0;
pub const TEMPERATURE: f64 = 1.0;
/// Split on punctuation
pub const TEXT_SPLIT_METHOD: &str = "按标点符号切";
pub const BATCH_THRESHOLD: f64 = 0.75;
pub const SPLIT_BUCKET: bool = true;
pub const SPEED_FACTOR: f64 = 1.0;
pub const FRAGMENT_INTERVAL: f64 = 0.3;
pub const MEDIA_TYPE: &str = "wav";
pub const PARALLEL_INFER: bool = true;
pub const REPETITION_PENALTY: f64 = 1.35;
pub const SEED: i64 = -1;

/// Body of the JSON knob schema used by `TokenQuery` and `BearerAuth`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KnobPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub speaker_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    pub text: String,
    pub sdp_ratio: f64,
    pub noise_scale: f64,
    pub noise_scale_w: f64,
    pub length_scale: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub temperature: f64,
    pub text_split_method: &'static str,
    pub batch_size: u32,
    pub batch_threshold: f64,
    pub split_bucket: bool,
    pub speed_factor: f64,
    pub fragment_interval: f64,
    pub media_type: &'static str,
    pub parallel_infer: bool,
    pub repetition_penalty: f64,
    pub seed: i64,
}

/// A ready-to-send synthesis request
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub profile: ProviderProfile,
    /// Base URL that relative audio locations are resolved against
    pub base_url: String,
    pub url: String,
    pub payload: Value,
    pub headers: HeaderMap,
}

fn batch_size(profile: ProviderProfile) -> u32 {
    match profile {
        ProviderProfile::TokenQuery => 10,
        ProviderProfile::LegacyV1 | ProviderProfile::BearerAuth => 1,
    }
}

/// Endpoint for the synthesis POST
pub fn endpoint(config: &ProviderConfig) -> String {
    match config.profile {
        ProviderProfile::LegacyV1 => format!("{}/run/predict", config.base_url.trim_end_matches('/')),
        ProviderProfile::TokenQuery | ProviderProfile::BearerAuth => config.base_url.clone(),
    }
}

fn knob_payload(params: &ResolvedParams, profile: ProviderProfile, access_token: Option<String>) -> KnobPayload {
    KnobPayload {
        access_token,
        model_name: params.model.clone(),
        speaker_name: params.speaker.clone(),
        emotion: params.emotion.clone(),
        text: params.text.clone(),
        sdp_ratio: params.sdp_ratio,
        noise_scale: params.noise_scale,
        noise_scale_w: params.noise_scale_w,
        length_scale: params.length_scale,
        top_k: TOP_K,
        top_p: TOP_P,
        temperature: TEMPERATURE,
        text_split_method: TEXT_SPLIT_METHOD,
        batch_size: batch_size(profile),
        batch_threshold: BATCH_THRESHOLD,
        split_bucket: SPLIT_BUCKET,
        speed_factor: SPEED_FACTOR,
        fragment_interval: FRAGMENT_INTERVAL,
        media_type: MEDIA_TYPE,
        parallel_infer: PARALLEL_INFER,
        repetition_penalty: REPETITION_PENALTY,
        seed: SEED,
    }
}

/// Build the payload and headers for `params` under the configured profile
pub fn build(params: &ResolvedParams, config: &ProviderConfig) -> Result<ProviderRequest> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let payload = match config.profile {
        ProviderProfile::LegacyV1 => json!({
            "data": [
                params.text,
                params.speaker,
                params.sdp_ratio,
                params.noise_scale,
                params.noise_scale_w,
                params.length_scale,
            ],
            "fn_index": 0,
        }),
        ProviderProfile::TokenQuery => {
            let token = Some(config.auth_token.clone()).filter(|t| !t.is_empty());
            serde_json::to_value(knob_payload(params, config.profile, token))?
        }
        ProviderProfile::BearerAuth => {
            if !config.auth_token.is_empty() {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", config.auth_token))
                    .map_err(|_| TtsBridgeError::validation("token", Bound::Required, "<non-ascii token>"))?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            serde_json::to_value(knob_payload(params, config.profile, None))?
        }
    };

    Ok(ProviderRequest {
        profile: config.profile,
        base_url: config.base_url.clone(),
        url: endpoint(config),
        payload,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ResolvedParams {
        ResolvedParams {
            text: "你好".to_string(),
            speaker: "莱依拉".to_string(),
            model: Some("genshin".to_string()),
            emotion: Some("开心".to_string()),
            sdp_ratio: 0.2,
            noise_scale: 0.6,
            noise_scale_w: 0.8,
            length_scale: 1.0,
        }
    }

    fn config(profile: ProviderProfile) -> ProviderConfig {
        ProviderConfig {
            base_url: "http://tts.local/api/".to_string(),
            auth_token: "secret".to_string(),
            profile,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_legacy_positional_payload() {
        let request = build(&params(), &config(ProviderProfile::LegacyV1)).unwrap();

        assert_eq!(request.url, "http://tts.local/api/run/predict");
        assert_eq!(
            request.payload["data"],
            json!(["你好", "莱依拉", 0.2, 0.6, 0.8, 1.0])
        );
        assert!(request.headers.get(header::AUTHORIZATION).is_none());
        assert!(request.payload.get("access_token").is_none());
    }

    #[test]
    fn test_token_query_embeds_token_and_knobs() {
        let request = build(&params(), &config(ProviderProfile::TokenQuery)).unwrap();
        let body = &request.payload;

        assert_eq!(request.url, "http://tts.local/api/");
        assert_eq!(body["access_token"], "secret");
        assert_eq!(body["speaker_name"], "莱依拉");
        assert_eq!(body["model_name"], "genshin");
        assert_eq!(body["emotion"], "开心");
        assert_eq!(body["top_k"], 10);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(body["batch_size"], 10);
        assert_eq!(body["batch_threshold"], 0.75);
        assert_eq!(body["split_bucket"], true);
        assert_eq!(body["fragment_interval"], 0.3);
        assert_eq!(body["media_type"], "wav");
        assert_eq!(body["parallel_infer"], true);
        assert_eq!(body["repetition_penalty"], 1.35);
        assert_eq!(body["seed"], -1);
        assert!(request.headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_bearer_auth_uses_header() {
        let request = build(&params(), &config(ProviderProfile::BearerAuth)).unwrap();

        assert_eq!(request.headers[header::AUTHORIZATION], "Bearer secret");
        assert_eq!(request.headers[header::ACCEPT], "application/json");
        assert_eq!(request.headers[header::CONTENT_TYPE], "application/json");
        assert!(request.payload.get("access_token").is_none());
        assert_eq!(request.payload["batch_size"], 1);
    }

    #[test]
    fn test_unset_optionals_are_omitted() {
        let mut params = params();
        params.model = None;
        params.emotion = None;
        let mut config = config(ProviderProfile::TokenQuery);
        config.auth_token.clear();

        let request = build(&params, &config).unwrap();
        assert!(request.payload.get("model_name").is_none());
        assert!(request.payload.get("emotion").is_none());
        assert!(request.payload.get("access_token").is_none());
    }

    #[test]
    fn test_bad_token_is_validation_error() {
        let mut config = config(ProviderProfile::BearerAuth);
        config.auth_token = "line\nbreak".to_string();

        let err = build(&params(), &config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
