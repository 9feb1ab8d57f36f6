// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    any::Any,
    fmt, fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use tracing::{info, warn};

use super::error::SamplerError;
use crate::audio::sample_source::{
    AudioSampleSource, MemorySampleSource, SampleSource, SampleSourceError,
};

/// Frames decoded per chunk while loading a sample.
const DECODE_CHUNK_FRAMES: usize = 4096;

static SAMPLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A fully decoded sample. Cloning is cheap: the frames are shared.
#[derive(Clone)]
pub struct Sample {
    id: u64,
    /// Interleaved frames.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
    frames: usize,
}

impl Sample {
    /// Decodes raw audio bytes. The extension is only a hint for format detection.
    /// Malformed input is an error, even where the decoder panics on it.
    pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<Sample, SamplerError> {
        catch_decoder_panic(|| Self::decode_frames(bytes, extension))
    }

    fn decode_frames(bytes: Vec<u8>, extension: Option<&str>) -> Result<Sample, SamplerError> {
        let mut source = AudioSampleSource::from_bytes(bytes, extension)?;
        let channel_count = source.channel_count();
        let sample_rate = source.sample_rate();
        let channels = channel_count as usize;

        let mut data = Vec::new();
        let mut chunk = vec![Vec::with_capacity(DECODE_CHUNK_FRAMES); channels];
        loop {
            let frames = source.next_chunk(&mut chunk, DECODE_CHUNK_FRAMES)?;
            if frames == 0 {
                break;
            }
            data.reserve(frames * channels);
            for frame in 0..frames {
                for channel in &chunk {
                    data.push(channel[frame]);
                }
            }
        }

        let frames = if channels == 0 { 0 } else { data.len() / channels };
        if frames == 0 {
            return Err(SampleSourceError::UnsupportedFormat(
                "audio stream contains no frames".to_string(),
            )
            .into());
        }

        Ok(Sample {
            id: SAMPLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: Arc::new(data),
            channel_count,
            sample_rate,
            frames,
        })
    }

    /// Builds a sample directly from interleaved frames.
    #[cfg(test)]
    pub fn from_frames(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Sample {
        let frames = data.len() / channel_count as usize;
        Sample {
            id: SAMPLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: Arc::new(data),
            channel_count,
            sample_rate,
            frames,
        }
    }

    /// Unique for every decoded sample.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// A source playing this sample at its natural speed.
    pub fn source(&self) -> MemorySampleSource {
        MemorySampleSource::from_shared(self.data.clone(), self.channel_count, self.sample_rate)
    }
}

/// Runs a decode, turning a panic inside the decoder into a decode error.
fn catch_decoder_panic<T>(
    decode: impl FnOnce() -> Result<T, SamplerError>,
) -> Result<T, SamplerError> {
    panic::catch_unwind(AssertUnwindSafe(decode)).unwrap_or_else(|payload| {
        Err(SampleSourceError::DecoderPanicked(panic_message(payload.as_ref())).into())
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.id)
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames)
            .finish()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channel(s), {} Hz, {:.2}s",
            self.channel_count,
            self.sample_rate,
            self.duration().as_secs_f64()
        )
    }
}

/// Holds the one loaded sample. A successful upload replaces it wholesale; a failed
/// one leaves it alone.
#[derive(Default)]
pub struct SampleStore {
    current: RwLock<Option<Sample>>,
}

impl SampleStore {
    pub fn new() -> SampleStore {
        Self::default()
    }

    /// Decodes the bytes and, on success, makes them the current sample.
    pub fn upload(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Sample, SamplerError> {
        let sample = match Sample::decode(bytes, extension) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(err = %e, "Unable to decode sample, keeping the current one");
                return Err(e);
            }
        };

        info!(
            sample_id = sample.id(),
            frames = sample.frames(),
            sample = %sample,
            "Sample loaded"
        );
        *self.current.write() = Some(sample.clone());
        Ok(sample)
    }

    /// Reads a file and uploads it, using its extension as the format hint.
    pub fn load_file(&self, path: &Path) -> Result<Sample, SamplerError> {
        let bytes = fs::read(path).map_err(|source| {
            warn!(path = %path.display(), err = %source, "Unable to read sample file");
            SamplerError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let extension = path.extension().and_then(|ext| ext.to_str());
        self.upload(bytes, extension)
    }

    /// Replaces the current sample without decoding.
    #[cfg(test)]
    pub fn set(&self, sample: Sample) {
        *self.current.write() = Some(sample);
    }

    /// Returns the current sample, if one has been loaded.
    pub fn current(&self) -> Option<Sample> {
        self.current.read().clone()
    }

    /// Forgets the current sample.
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}
