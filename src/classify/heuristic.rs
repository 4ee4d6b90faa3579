//! Spectral heuristic classifier.
//!
//! No model required. Each frame is summarized by RMS energy, zero-crossing
//! rate and spectral centroid. Frames louder than 1.5x the clip's mean energy
//! are labelled by where the centroid and ZCR fall; the rest are `Silence`.
//!
//! | centroid (Hz)   | ZCR          | label          |
//! |-----------------|--------------|----------------|
//! | 300..2800       | < 0.12       | `HUMAN SPEECH` |
//! | 800..2200       | 0.10..0.22   | `CAT MEOW`     |
//! | > 2800          | > 0.22       | `DOG/SHOUT`    |
//! | anything else   |              | `AMBIENT`      |

use super::{Classifies, Detection};
use crate::audio::Waveform;
use crate::defaults;
use crate::error::Result;
use async_trait::async_trait;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

/// Energy multiple of the mean a frame must exceed to be labelled.
const PEAK_FACTOR: f32 = 1.5;

/// FFT size for the centroid estimate.
const FFT_SIZE: usize = 2048;

pub const SPEECH: &str = "HUMAN SPEECH";
pub const CAT: &str = "CAT MEOW";
pub const DOG_OR_SHOUT: &str = "DOG/SHOUT";
pub const AMBIENT: &str = "AMBIENT";
pub const SILENCE: &str = "Silence";

/// Per-frame signal summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    pub rms: f32,
    pub zero_crossing_rate: f32,
    pub centroid_hz: f32,
}

/// Label a loud frame from its spectral shape.
pub fn label_for(centroid_hz: f32, zcr: f32) -> &'static str {
    if centroid_hz > 300.0 && centroid_hz < 2800.0 && zcr < 0.12 {
        SPEECH
    } else if centroid_hz > 800.0 && centroid_hz < 2200.0 && zcr > 0.1 && zcr < 0.22 {
        CAT
    } else if centroid_hz > 2800.0 && zcr > 0.22 {
        DOG_OR_SHOUT
    } else {
        AMBIENT
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    hop_secs: f64,
    window: Vec<f32>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        // Hann window
        let window = (0..FFT_SIZE)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / FFT_SIZE as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();
        Self {
            hop_secs: defaults::CLIP_DURATION_SECS,
            window,
        }
    }

    /// Summarize every frame of mono `samples` at `sample_rate`.
    ///
    /// The last frame may be shorter than the hop.
    pub fn features(&self, samples: &[f32], sample_rate: u32) -> Vec<FrameFeatures> {
        let frame_len = ((self.hop_secs * sample_rate as f64).round() as usize).max(1);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];

        samples
            .chunks(frame_len)
            .map(|frame| {
                let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
                let zero_crossing_rate = zero_crossing_rate(frame);

                // Average magnitude spectrum over half-overlapping windows.
                let bins = FFT_SIZE / 2 + 1;
                let mut magnitude = vec![0.0f32; bins];
                let mut start = 0;
                loop {
                    for (i, slot) in buffer.iter_mut().enumerate() {
                        let s = frame.get(start + i).copied().unwrap_or(0.0);
                        *slot = Complex::new(s * self.window[i], 0.0);
                    }
                    fft.process(&mut buffer);
                    for (m, c) in magnitude.iter_mut().zip(&buffer) {
                        *m += c.norm();
                    }
                    start += FFT_SIZE / 2;
                    if start + FFT_SIZE > frame.len() {
                        break;
                    }
                }

                FrameFeatures {
                    rms,
                    zero_crossing_rate,
                    centroid_hz: centroid(&magnitude, sample_rate),
                }
            })
            .collect()
    }
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

fn centroid(magnitude: &[f32], sample_rate: u32) -> f32 {
    let bin_hz = sample_rate as f32 / FFT_SIZE as f32;
    let (weighted, total) = magnitude
        .iter()
        .enumerate()
        .fold((0.0f32, 0.0f32), |(w, t), (i, &m)| {
            (w + i as f32 * bin_hz * m, t + m)
        });
    if total > 1e-10 { weighted / total } else { 0.0 }
}

#[async_trait]
impl Classifies for HeuristicClassifier {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn classify(&self, audio: &Waveform) -> Result<Vec<Detection>> {
        let mono = audio.downmix_mono();
        let features = self.features(mono.samples(), mono.sample_rate());
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let mean = features.iter().map(|f| f.rms).sum::<f32>() / features.len() as f32;
        let loudest = features.iter().fold(0.0f32, |m, f| m.max(f.rms));
        let threshold = mean * PEAK_FACTOR;

        let detections = features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if loudest > 0.0 && f.rms > threshold {
                    Detection::new(
                        i,
                        label_for(f.centroid_hz, f.zero_crossing_rate),
                        (f.rms / loudest).clamp(0.0, 1.0),
                    )
                } else {
                    let quietness = if threshold > 0.0 {
                        1.0 - (f.rms / threshold).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    Detection::new(i, SILENCE, quietness)
                }
            })
            .collect();
        Ok(detections)
    }
}
