//! Synthesis parameter resolution
//!
//! Caller overrides are merged with the configured defaults. A supplied numeric value
//! is checked against its inclusive range; an absent one takes the default as is.

use crate::config::{ProviderConfig, Range};
use crate::error::{Bound, Result, TtsBridgeError};

/// Parameters as supplied by the caller; `None` means "use the default"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOverrides {
    pub speaker: Option<String>,
    pub model: Option<String>,
    pub emotion: Option<String>,
    pub sdp_ratio: Option<f64>,
    pub noise_scale: Option<f64>,
    pub noise_scale_w: Option<f64>,
    pub length_scale: Option<f64>,
}

impl SynthesisOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn sdp_ratio(mut self, value: f64) -> Self {
        self.sdp_ratio = Some(value);
        self
    }

    pub fn noise_scale(mut self, value: f64) -> Self {
        self.noise_scale = Some(value);
        self
    }

    pub fn noise_scale_w(mut self, value: f64) -> Self {
        self.noise_scale_w = Some(value);
        self
    }

    pub fn length_scale(mut self, value: f64) -> Self {
        self.length_scale = Some(value);
        self
    }
}

/// Fully resolved parameters of one synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub text: String,
    pub speaker: String,
    pub model: Option<String>,
    pub emotion: Option<String>,
    pub sdp_ratio: f64,
    pub noise_scale: f64,
    pub noise_scale_w: f64,
    pub length_scale: f64,
}

/// Check a single bounded parameter
///
/// `None` yields `default` without a bound check.
pub fn resolve_bounded(name: &str, value: Option<f64>, default: f64, range: Range) -> Result<f64> {
    let Some(value) = value else {
        return Ok(default);
    };

    // NaN slips past both comparisons and infinity has no JSON encoding
    if !value.is_finite() {
        return Err(TtsBridgeError::validation(name, Bound::Finite, value));
    }
    if let Some(min) = range.min {
        if value < min {
            return Err(TtsBridgeError::validation(name, Bound::Min(min), value));
        }
    }
    if let Some(max) = range.max {
        if value > max {
            return Err(TtsBridgeError::validation(name, Bound::Max(max), value));
        }
    }

    Ok(value)
}

fn pick(value: Option<String>, default: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| default.map(str::to_string))
}

/// Merge `overrides` with the defaults and bounds of `config`
pub fn resolve(text: &str, overrides: SynthesisOverrides, config: &ProviderConfig) -> Result<ResolvedParams> {
    if text.trim().is_empty() {
        return Err(TtsBridgeError::validation("text", Bound::Required, "\"\""));
    }

    let bounds = &config.bounds;
    let sdp_ratio = resolve_bounded("sdp_ratio", overrides.sdp_ratio, config.default_sdp_ratio, bounds.sdp_ratio)?;
    let noise_scale = resolve_bounded("noise_scale", overrides.noise_scale, config.default_noise_scale, bounds.noise_scale)?;
    let noise_scale_w = resolve_bounded(
        "noise_scale_w",
        overrides.noise_scale_w,
        config.default_noise_scale_w,
        bounds.noise_scale_w,
    )?;
    let length_scale = resolve_bounded(
        "length_scale",
        overrides.length_scale,
        config.default_length_scale,
        bounds.length_scale,
    )?;

    let speaker = pick(overrides.speaker, Some(&config.default_speaker))
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TtsBridgeError::validation("speaker", Bound::Required, "\"\""))?;

    Ok(ResolvedParams {
        text: text.to_string(),
        speaker,
        model: pick(overrides.model, config.default_model.as_deref()),
        emotion: pick(overrides.emotion, config.default_emotion.as_deref()),
        sdp_ratio,
        noise_scale,
        noise_scale_w,
        length_scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::default()
    }

    #[test]
    fn test_absent_values_take_defaults() {
        let config = config();
        let params = resolve("你好", SynthesisOverrides::new(), &config).unwrap();

        assert_eq!(params.text, "你好");
        assert_eq!(params.speaker, config.default_speaker);
        assert_eq!(params.sdp_ratio, config.default_sdp_ratio);
        assert_eq!(params.noise_scale, config.default_noise_scale);
        assert_eq!(params.noise_scale_w, config.default_noise_scale_w);
        assert_eq!(params.length_scale, config.default_length_scale);
        assert_eq!(params.model, None);
        assert_eq!(params.emotion, None);
    }

    #[test]
    fn test_default_is_not_bound_checked() {
        // a default outside its range is used as configured
        let config = ProviderConfig {
            default_sdp_ratio: 3.0,
            ..config()
        };
        let params = resolve("hi", SynthesisOverrides::new(), &config).unwrap();
        assert_eq!(params.sdp_ratio, 3.0);
    }

    #[test]
    fn test_in_range_values_pass_unchanged() {
        let overrides = SynthesisOverrides::new()
            .sdp_ratio(0.0)
            .noise_scale(1.0)
            .noise_scale_w(0.33)
            .length_scale(2.5);
        let params = resolve("hi", overrides, &config()).unwrap();

        assert_eq!(params.sdp_ratio, 0.0);
        assert_eq!(params.noise_scale, 1.0);
        assert_eq!(params.noise_scale_w, 0.33);
        assert_eq!(params.length_scale, 2.5);
    }

    #[test]
    fn test_sdp_ratio_above_max_fails() {
        let err = resolve("你好", SynthesisOverrides::new().sdp_ratio(1.5), &config()).unwrap_err();
        match err {
            TtsBridgeError::Validation { parameter, bound, value } => {
                assert_eq!(parameter, "sdp_ratio");
                assert_eq!(bound, Bound::Max(1.0));
                assert_eq!(value, "1.5");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_values_fail_for_every_parameter() {
        let cases = [
            ("sdp_ratio", SynthesisOverrides::new().sdp_ratio(-0.1)),
            ("noise_scale", SynthesisOverrides::new().noise_scale(1.01)),
            ("noise_scale_w", SynthesisOverrides::new().noise_scale_w(-2.0)),
            ("length_scale", SynthesisOverrides::new().length_scale(-1.0)),
        ];
        for (name, overrides) in cases {
            match resolve("hi", overrides, &config()) {
                Err(TtsBridgeError::Validation { parameter, .. }) => assert_eq!(parameter, name),
                other => panic!("{}: unexpected result {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_length_scale_has_no_upper_bound() {
        let params = resolve("hi", SynthesisOverrides::new().length_scale(10.0), &config()).unwrap();
        assert_eq!(params.length_scale, 10.0);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let cases = [
            ("noise_scale", SynthesisOverrides::new().noise_scale(f64::NAN)),
            ("length_scale", SynthesisOverrides::new().length_scale(f64::INFINITY)),
            ("sdp_ratio", SynthesisOverrides::new().sdp_ratio(f64::NEG_INFINITY)),
        ];
        for (name, overrides) in cases {
            match resolve("hi", overrides, &config()) {
                Err(TtsBridgeError::Validation { parameter, bound, .. }) => {
                    assert_eq!(parameter, name);
                    assert_eq!(bound, Bound::Finite);
                }
                other => panic!("{}: unexpected result {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_unbounded_range_still_requires_finite_value() {
        let err = resolve_bounded("x", Some(f64::INFINITY), 1.0, Range::new(None, None)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let err = resolve("   ", SynthesisOverrides::new(), &config()).unwrap_err();
        match err {
            TtsBridgeError::Validation { parameter, bound, .. } => {
                assert_eq!(parameter, "text");
                assert_eq!(bound, Bound::Required);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_string_overrides() {
        let config = ProviderConfig {
            default_model: Some("genshin".to_string()),
            default_emotion: Some("中立".to_string()),
            ..config()
        };

        let params = resolve(
            "hi",
            SynthesisOverrides::new().speaker("派蒙").emotion("开心").model("  "),
            &config,
        )
        .unwrap();
        assert_eq!(params.speaker, "派蒙");
        assert_eq!(params.emotion.as_deref(), Some("开心"));
        // blank override falls back to the default
        assert_eq!(params.model.as_deref(), Some("genshin"));
    }

    #[test]
    fn test_blank_speaker_without_default_fails() {
        let config = ProviderConfig {
            default_speaker: String::new(),
            ..config()
        };
        let err = resolve("hi", SynthesisOverrides::new(), &config).unwrap_err();
        assert!(matches!(err, TtsBridgeError::Validation { ref parameter, .. } if parameter == "speaker"));
    }
}
