pub mod transcode;
pub mod wav;
pub mod waveform;

pub use transcode::{FfmpegTranscoder, LoadedAudio, TranscodeTarget, Transcodes, load_or_transcode};
pub use wav::{OutputSampleFormat, WaveformStore};
pub use waveform::{PlanarAudio, Waveform};
