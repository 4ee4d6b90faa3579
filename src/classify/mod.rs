//! Acoustic event classification.
//!
//! A [`Classifies`] backend labels fixed-width frames of 16 kHz mono audio.
//! [`detect_events`] is the front-end: it prepares the input, runs the
//! backend and turns detections into [`SoundEvent`]s with display labels.

pub mod command;
pub mod heuristic;

use crate::audio::Waveform;
use crate::debug_log::DebugLog;
use crate::defaults;
use crate::error::{ForensicError, Result};
use crate::events::{SoundEvent, display_label};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use command::CommandClassifier;
pub use heuristic::HeuristicClassifier;

/// Top label for one analysis frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "frame")]
    pub frame_index: usize,
    pub label: String,
    pub score: f32,
}

impl Detection {
    pub fn new(frame_index: usize, label: impl Into<String>, score: f32) -> Self {
        Self {
            frame_index,
            label: label.into(),
            score,
        }
    }
}

/// Trait for audio event classification.
///
/// Input is always mono at [`defaults::CLASSIFIER_SAMPLE_RATE`]; frame `i`
/// starts at `i * CLIP_DURATION_SECS`.
#[async_trait]
pub trait Classifies: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn classify(&self, audio: &Waveform) -> Result<Vec<Detection>>;
}

/// Mono at the classifier rate.
pub fn prepare_for_classifier(waveform: &Waveform) -> Waveform {
    waveform
        .downmix_mono()
        .resample(defaults::CLASSIFIER_SAMPLE_RATE)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Convert one detection into a display-labelled event.
pub fn to_sound_event(detection: &Detection) -> SoundEvent {
    let score = detection.score as f64;
    SoundEvent {
        time: round_to(detection.frame_index as f64 * defaults::CLIP_DURATION_SECS, 2),
        label: display_label(&detection.label),
        confidence: Some(round_to(score, 4)),
        decibels: Some(round_to(
            defaults::DECIBEL_FLOOR - score * defaults::DECIBEL_FLOOR,
            1,
        )),
    }
}

/// Run `classifier` on `waveform` and return display-labelled events in
/// frame order.
///
/// # Errors
/// Propagates the backend's error.
pub async fn detect_events(
    classifier: &dyn Classifies,
    waveform: &Waveform,
    log: &mut DebugLog,
) -> Result<Vec<SoundEvent>> {
    let prepared = prepare_for_classifier(waveform);
    log.push(format!(
        "Running classifier {} on {:.2}s of audio",
        classifier.name(),
        prepared.duration_secs()
    ));

    let mut detections = match classifier.classify(&prepared).await {
        Ok(detections) => detections,
        Err(e) => {
            log.push(format!("Classification error: {}", e));
            return Err(e);
        }
    };
    detections.sort_by_key(|d| d.frame_index);

    let events: Vec<SoundEvent> = detections.iter().map(to_sound_event).collect();
    for event in &events {
        tracing::debug!(
            time = event.time,
            label = %event.label,
            confidence = event.confidence,
            "detected"
        );
    }
    log.push(format!("Classifier produced {} sound events.", events.len()));
    Ok(events)
}

/// Mock classifier for testing
#[derive(Debug, Clone, Default)]
pub struct MockClassifier {
    detections: Vec<Detection>,
    should_fail: bool,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to return these detections
    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    /// Configure the mock to fail on classify
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

#[async_trait]
impl Classifies for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, _audio: &Waveform) -> Result<Vec<Detection>> {
        if self.should_fail {
            return Err(ForensicError::Inference {
                stage: "Classifier".to_string(),
                message: "mock classifier failure".to_string(),
            });
        }
        Ok(self.detections.clone())
    }
}
