//! In-memory waveform types.
//!
//! Two orientations exist and conversions between them are explicit:
//! - [`Waveform`]: frame-major interleaved samples, `(samples[, channels])`.
//!   This is what the store reads and writes and what the masker operates on.
//! - [`PlanarAudio`]: channel-major, `(channels, samples)`. Only used at the
//!   separator boundary.

use crate::error::{ForensicError, Result};

/// Normalized PCM audio, samples in [-1, 1], interleaved by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl Waveform {
    /// Build a waveform from interleaved samples.
    ///
    /// # Errors
    /// Returns `InvalidAudio` if the rate or channel count is zero, or if the
    /// sample count is not a whole number of frames.
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ForensicError::InvalidAudio {
                message: "sample rate must be positive".to_string(),
            });
        }
        if channels == 0 {
            return Err(ForensicError::InvalidAudio {
                message: "channel count must be positive".to_string(),
            });
        }
        if samples.len() % channels as usize != 0 {
            return Err(ForensicError::InvalidAudio {
                message: format!(
                    "{} samples is not a whole number of {}-channel frames",
                    samples.len(),
                    channels
                ),
            });
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Build a single-channel waveform.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, 1, samples)
    }

    /// All-zero waveform with the same rate, channels and length as `self`.
    pub fn silent_like(&self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: vec![0.0; self.samples.len()],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// `(frames, channels)`, the shape reported in debug transcripts.
    pub fn shape(&self) -> (usize, u16) {
        (self.frame_count(), self.channels)
    }

    /// Peak absolute amplitude. Zero for an empty or silent waveform.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Interleaved samples of frames `[start, end)`.
    ///
    /// # Panics
    /// Panics if the range is out of bounds; callers clamp first.
    pub fn frames(&self, start: usize, end: usize) -> &[f32] {
        let ch = self.channels as usize;
        &self.samples[start * ch..end * ch]
    }

    /// Overwrite frames `[start, end)` with the same frames of `source`.
    ///
    /// # Errors
    /// Returns `InvalidAudio` if the layouts differ or the range is out of
    /// bounds for either waveform.
    pub fn copy_frames_from(&mut self, source: &Waveform, start: usize, end: usize) -> Result<()> {
        if source.channels != self.channels || source.sample_rate != self.sample_rate {
            return Err(ForensicError::InvalidAudio {
                message: format!(
                    "layout mismatch: {} Hz x{} into {} Hz x{}",
                    source.sample_rate, source.channels, self.sample_rate, self.channels
                ),
            });
        }
        if start > end || end > self.frame_count() || end > source.frame_count() {
            return Err(ForensicError::InvalidAudio {
                message: format!(
                    "frame range {}..{} out of bounds ({} frames)",
                    start,
                    end,
                    self.frame_count().min(source.frame_count())
                ),
            });
        }
        let ch = self.channels as usize;
        self.samples[start * ch..end * ch].copy_from_slice(source.frames(start, end));
        Ok(())
    }

    /// Average all channels into one.
    pub fn downmix_mono(&self) -> Waveform {
        if self.channels == 1 {
            return self.clone();
        }
        let ch = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect();
        Waveform {
            sample_rate: self.sample_rate,
            channels: 1,
            samples,
        }
    }

    /// Two-channel copy: mono is duplicated, stereo is kept, wider layouts
    /// keep their first two channels.
    pub fn to_stereo(&self) -> Waveform {
        let samples = match self.channels {
            2 => self.samples.clone(),
            1 => self.samples.iter().flat_map(|&s| [s, s]).collect(),
            n => self
                .samples
                .chunks_exact(n as usize)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };
        Waveform {
            sample_rate: self.sample_rate,
            channels: 2,
            samples,
        }
    }

    /// Linear-interpolation resample of every channel to `to_rate`.
    pub fn resample(&self, to_rate: u32) -> Waveform {
        if to_rate == self.sample_rate || to_rate == 0 {
            return self.clone();
        }
        let planar = self.to_planar();
        let channels = planar
            .channels
            .iter()
            .map(|c| resample_channel(c, self.sample_rate, to_rate))
            .collect();
        PlanarAudio {
            sample_rate: to_rate,
            channels,
        }
        .into_waveform()
    }

    /// Convert to channel-major orientation.
    pub fn to_planar(&self) -> PlanarAudio {
        let ch = self.channels as usize;
        let frames = self.frame_count();
        let mut channels = vec![Vec::with_capacity(frames); ch];
        for frame in self.samples.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                channels[c].push(s);
            }
        }
        PlanarAudio {
            sample_rate: self.sample_rate,
            channels,
        }
    }
}

/// Channel-major audio, `(channels, samples)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlanarAudio {
    /// # Errors
    /// Returns `InvalidAudio` if there are no channels, the rate is zero, the
    /// channel count does not fit in `u16`, or the channels differ in length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ForensicError::InvalidAudio {
                message: "sample rate must be positive".to_string(),
            });
        }
        let Some(first) = channels.first() else {
            return Err(ForensicError::InvalidAudio {
                message: "planar audio needs at least one channel".to_string(),
            });
        };
        if u16::try_from(channels.len()).is_err() {
            return Err(ForensicError::InvalidAudio {
                message: format!("{} channels is too many", channels.len()),
            });
        }
        let len = first.len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(ForensicError::InvalidAudio {
                message: "planar channels differ in length".to_string(),
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Convert back to frame-major orientation.
    pub fn into_waveform(self) -> Waveform {
        let ch = self.channels.len();
        let len = self.len();
        let mut samples = Vec::with_capacity(len * ch);
        for i in 0..len {
            for channel in &self.channels {
                samples.push(channel[i]);
            }
        }
        Waveform {
            sample_rate: self.sample_rate,
            channels: ch as u16,
            samples,
        }
    }
}

/// Simple linear interpolation resampling.
fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}
