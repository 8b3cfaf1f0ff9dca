//! Gemini Live API configuration constants.

use crate::core::codec::AudioFormat;

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Model used when none is configured.
pub const GEMINI_LIVE_DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";

/// Input sample rate Gemini Live expects.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;

/// Output sample rate of Gemini Live audio replies.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Format of audio sent to Gemini.
pub const GEMINI_INPUT_FORMAT: AudioFormat = AudioFormat::pcm16(GEMINI_INPUT_SAMPLE_RATE);

/// Format of audio replies, unless the reply's MIME type says otherwise.
pub const GEMINI_OUTPUT_FORMAT: AudioFormat = AudioFormat::pcm16(GEMINI_OUTPUT_SAMPLE_RATE);

/// Prebuilt voices offered by Gemini Live.
pub const GEMINI_VOICES: &[&str] = &[
    "Puck", "Charon", "Kore", "Fenrir", "Aoede", "Leda", "Orus", "Zephyr",
];

/// Resource name for a model, adding the `models/` prefix when missing.
pub fn model_resource_name(model: &str) -> String {
    let model = model.trim();
    let model = if model.is_empty() {
        GEMINI_LIVE_DEFAULT_MODEL
    } else {
        model
    };

    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// MIME type for raw PCM at `rate`, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(rate: u32) -> String {
    format!("audio/pcm;rate={rate}")
}

/// Sample rate named in a MIME type such as `audio/pcm;rate=24000`.
pub fn rate_from_mime_type(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

/// Canonical voice name, if `voice` names a Gemini prebuilt voice.
pub fn voice_name(voice: &str) -> Option<&'static str> {
    GEMINI_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(voice.trim()))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_resource_name() {
        assert_eq!(
            model_resource_name(""),
            "models/gemini-2.0-flash-live-001"
        );
        assert_eq!(
            model_resource_name("gemini-live-2.5-flash-preview"),
            "models/gemini-live-2.5-flash-preview"
        );
        assert_eq!(model_resource_name("models/x"), "models/x");
    }

    #[test]
    fn test_mime_rates() {
        assert_eq!(pcm_mime_type(16000), "audio/pcm;rate=16000");
        assert_eq!(rate_from_mime_type("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(rate_from_mime_type("audio/pcm; rate=8000"), Some(8000));
        assert_eq!(rate_from_mime_type("audio/pcm"), None);
    }

    #[test]
    fn test_voice_name() {
        assert_eq!(voice_name("kore"), Some("Kore"));
        assert_eq!(voice_name("alloy"), None);
    }
}
