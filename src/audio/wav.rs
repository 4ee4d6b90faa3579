//! WAV loading and writing (the waveform store).
//!
//! Integer PCM is normalized to [-1, 1] by dividing by `2^(bits-1)`:
//! 16-bit by 32768, 24-bit by 2^23, 32-bit by 2^31. hound presents unsigned
//! 8-bit data already re-centred on zero, so it is divided by 128, which is
//! the same as `(x - 128) / 128` on the raw byte. Float data passes through.

use crate::audio::waveform::Waveform;
use crate::error::{ForensicError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Sample encoding used when writing stems.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputSampleFormat {
    /// 32-bit IEEE float, bit-exact for masked copies.
    #[default]
    Float32,
    /// 16-bit signed PCM.
    Int16,
}

/// Reads and writes waveforms as WAV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveformStore {
    output_format: OutputSampleFormat,
}

impl WaveformStore {
    pub fn new(output_format: OutputSampleFormat) -> Self {
        Self { output_format }
    }

    /// Load and normalize a WAV file.
    ///
    /// # Errors
    /// Returns `UnreadableAudio` if the file cannot be opened or is not a WAV
    /// container hound can parse. Callers retry through the transcoder.
    pub fn load(&self, path: &Path) -> Result<Waveform> {
        let file = File::open(path).map_err(|e| ForensicError::UnreadableAudio {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::read_from(BufReader::new(file), &path.display().to_string())
    }

    /// Parse WAV data from any reader. `label` names the source in errors.
    pub fn read_from<R: Read>(reader: R, label: &str) -> Result<Waveform> {
        let unreadable = |message: String| ForensicError::UnreadableAudio {
            path: label.to_string(),
            message,
        };

        let mut wav_reader = hound::WavReader::new(reader)
            .map_err(|e| unreadable(format!("Failed to parse WAV file: {}", e)))?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(unreadable("WAV header declares zero channels".to_string()));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| unreadable(format!("Failed to read WAV samples: {}", e)))?,
            hound::SampleFormat::Int => {
                let scale = int_scale(spec.bits_per_sample).ok_or_else(|| {
                    unreadable(format!(
                        "unsupported integer bit depth {}",
                        spec.bits_per_sample
                    ))
                })?;
                wav_reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v as f64 / scale) as f32))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| unreadable(format!("Failed to read WAV samples: {}", e)))?
            }
        };

        // A truncated data chunk can leave a partial trailing frame.
        let whole = samples.len() - samples.len() % spec.channels as usize;
        let mut samples = samples;
        samples.truncate(whole);

        Waveform::new(spec.sample_rate, spec.channels, samples)
            .map_err(|e| unreadable(e.to_string()))
    }

    /// Write a waveform at its native sample rate, creating parent directories.
    ///
    /// # Errors
    /// Returns `AudioWrite` if the directory or file cannot be created or the
    /// encoder fails.
    pub fn write(&self, path: &Path, waveform: &Waveform) -> Result<()> {
        let write_err = |message: String| ForensicError::AudioWrite {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }

        let spec = match self.output_format {
            OutputSampleFormat::Float32 => hound::WavSpec {
                channels: waveform.channels(),
                sample_rate: waveform.sample_rate(),
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
            OutputSampleFormat::Int16 => hound::WavSpec {
                channels: waveform.channels(),
                sample_rate: waveform.sample_rate(),
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        };

        let mut writer =
            hound::WavWriter::create(path, spec).map_err(|e| write_err(e.to_string()))?;
        match self.output_format {
            OutputSampleFormat::Float32 => {
                for &s in waveform.samples() {
                    writer
                        .write_sample(s)
                        .map_err(|e| write_err(e.to_string()))?;
                }
            }
            OutputSampleFormat::Int16 => {
                for &s in waveform.samples() {
                    writer
                        .write_sample(to_i16(s))
                        .map_err(|e| write_err(e.to_string()))?;
                }
            }
        }
        writer.finalize().map_err(|e| write_err(e.to_string()))
    }
}

/// Divisor that maps a signed integer sample of `bits` onto [-1, 1).
fn int_scale(bits: u16) -> Option<f64> {
    match bits {
        8 | 16 | 24 | 32 => Some((1u64 << (bits - 1)) as f64),
        _ => None,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample as f64 * 32768.0)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
