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
// Core audio mixing logic shared by the cpal device and the mock device.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::audio::analyser::Analyser;
use crate::audio::sample_source::SampleSource;
use crate::playsync::CancelHandle;

/// Channel used to hand new sources to the mixer without taking its lock.
pub type SourceSender = Sender<ActiveSource>;

/// Mixes active sources into interleaved output frames.
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Sending side for new sources
    source_tx: Sender<ActiveSource>,
    /// Receiving side, drained at the start of every block
    source_rx: Receiver<ActiveSource>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

/// Represents an active audio source in the mixer. The signal path is
/// source -> gain -> optional analyser tap -> output.
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// The sample source
    source: Box<dyn SampleSource>,
    /// Linear gain applied to every sample
    gain: f32,
    /// Analyser fed with the post-gain signal
    tap: Option<Arc<Analyser>>,
    /// Whether this source has finished playing
    is_finished: Arc<AtomicBool>,
    /// Cancel handle for this source
    cancel_handle: CancelHandle,
    /// Planar scratch buffers, one per source channel
    scratch: Vec<Vec<f32>>,
    /// Mono post-gain scratch for the tap
    mono: Vec<f32>,
}

impl ActiveSource {
    /// Creates a new active source.
    pub fn new(
        id: u64,
        source: Box<dyn SampleSource>,
        gain: f32,
        tap: Option<Arc<Analyser>>,
        cancel_handle: CancelHandle,
    ) -> Self {
        let channels = source.channel_count() as usize;
        Self {
            id,
            source,
            gain,
            tap,
            is_finished: Arc::new(AtomicBool::new(false)),
            cancel_handle,
            scratch: vec![Vec::new(); channels],
            mono: Vec::new(),
        }
    }

    /// Returns the flag the mixer sets once the source reaches its end.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.is_finished.clone()
    }

    fn finish(&self) {
        self.is_finished.store(true, Ordering::Relaxed);
        self.cancel_handle.notify();
    }

    /// Mixes up to `num_frames` frames into `output`. Returns false once the source is
    /// exhausted.
    fn mix_into(&mut self, output: &mut [f32], num_channels: usize, num_frames: usize) -> bool {
        let frames = match self.source.next_chunk(&mut self.scratch, num_frames) {
            Ok(frames) => frames,
            Err(e) => {
                error!(source_id = self.id, err = %e, "Error reading source, dropping it");
                return false;
            }
        };

        let source_channels = self.scratch.len();
        if source_channels == 0 {
            return false;
        }

        self.mono.clear();
        for frame in 0..frames {
            let sum: f32 = self.scratch.iter().map(|ch| ch[frame]).sum();
            let mono = sum / source_channels as f32 * self.gain;

            let out = &mut output[frame * num_channels..(frame + 1) * num_channels];
            if source_channels == 1 || num_channels == 1 {
                // Mono sources are spread across every output channel and a mono output
                // gets the downmix.
                out.iter_mut().for_each(|sample| *sample += mono);
            } else {
                for (sample, channel) in out.iter_mut().zip(&self.scratch) {
                    *sample += channel[frame] * self.gain;
                }
            }

            if self.tap.is_some() {
                self.mono.push(mono);
            }
        }

        if let Some(tap) = &self.tap {
            tap.push_samples(&self.mono);
        }

        frames == num_frames
    }
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            source_tx,
            source_rx,
            num_channels,
            sample_rate,
        }
    }

    /// Returns a sender for adding sources from other threads.
    pub fn sender(&self) -> SourceSender {
        self.source_tx.clone()
    }

    /// Adds a new audio source to the mixer directly.
    #[cfg(test)]
    pub fn add_source(&self, source: ActiveSource) {
        self.active_sources.lock().push(source);
    }

    /// Mixes `num_frames` interleaved frames into `output`, replacing its contents.
    /// Sources that end during the block are mixed up to their end and then removed.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let num_channels = self.num_channels as usize;
        let len = (num_frames * num_channels).min(output.len());
        let output = &mut output[..len];
        output.fill(0.0);
        let num_frames = len / num_channels.max(1);

        let mut sources = self.active_sources.lock();
        while let Ok(new_source) = self.source_rx.try_recv() {
            sources.push(new_source);
        }

        sources.retain_mut(|active_source| {
            if active_source.cancel_handle.is_cancelled() {
                debug!(source_id = active_source.id, "Source cancelled");
                return false;
            }

            if active_source.mix_into(output, num_channels, num_frames) {
                true
            } else {
                debug!(source_id = active_source.id, "Source finished");
                active_source.finish();
                false
            }
        });
    }

    /// Processes multiple frames of audio mixing
    #[cfg(test)]
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Returns the number of sources currently mixed, including ones waiting in the channel.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.active_sources.lock().len() + self.source_rx.len()
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
