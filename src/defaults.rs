//! Default configuration constants for forensic-sonar.
//!
//! Shared by the configuration types, the collaborators and the masker so the
//! analysis frame width and sample rates stay consistent across stages.

/// Width of one classifier analysis frame, in seconds.
///
/// The event classifier emits one detection per frame at this hop, and the
/// masker paints exactly one frame of audio per event.
pub const CLIP_DURATION_SECS: f64 = 0.975;

/// Sample rate the source-separation model expects, in Hz.
pub const SEPARATOR_SAMPLE_RATE: u32 = 44100;

/// Sample rate the event classifier expects, in Hz.
pub const CLASSIFIER_SAMPLE_RATE: u32 = 16000;

/// Default separator executable.
pub const SEPARATOR_COMMAND: &str = "demucs";

/// Default separator model. Also names the output sub-directory for its stems.
pub const SEPARATOR_MODEL: &str = "htdemucs";

/// Default transcoder executable.
pub const FFMPEG_COMMAND: &str = "ffmpeg";

/// Public URL prefix under which the output directory is served.
pub const URL_PREFIX: &str = "/separated_audio";

/// Sub-directory (below the output directory) holding masked stems.
pub const GENERATED_DIR: &str = "generated";

/// Default timeout for the transcoder, in seconds.
pub const TRANSCODE_TIMEOUT_SECS: u64 = 120;

/// Default timeout for the separator. Demucs on CPU is slow.
pub const SEPARATOR_TIMEOUT_SECS: u64 = 600;

/// Default timeout for an external classifier, in seconds.
pub const CLASSIFIER_TIMEOUT_SECS: u64 = 300;

/// Lowest level reported by the classification front-end, in dB.
///
/// A detection with score `s` is reported at `DECIBEL_FLOOR + s * -DECIBEL_FLOOR`.
pub const DECIBEL_FLOOR: f64 = -60.0;

/// Application directory name used for the config path.
pub const APP_NAME: &str = "forensic-sonar";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration_is_yamnet_hop() {
        assert_eq!(CLIP_DURATION_SECS, 0.975);
    }

    #[test]
    fn separator_expects_cd_rate() {
        assert_eq!(SEPARATOR_SAMPLE_RATE, 44100);
    }
}
