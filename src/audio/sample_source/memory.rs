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
use std::sync::Arc;
use std::time::Duration;

use super::error::SampleSourceError;
use super::traits::SampleSource;

#[cfg(test)]
use super::traits::SampleSourceTestExt;

/// A sample source that plays interleaved samples held in memory, optionally at a
/// different playback rate. Output is produced in planar format.
///
/// Rate shifting walks a fractional read position through the source frames and
/// linearly interpolates between neighbouring frames. Playing at rate 2.0 reads every
/// other frame (an octave up, half the duration); rate 0.5 reads every frame twice.
pub struct MemorySampleSource {
    /// Interleaved sample storage, shared with every other voice playing the same sample.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    /// Rate of the produced frames.
    sample_rate: u32,
    /// Current read position in source frames.
    position: f64,
    /// Source frames advanced per produced frame.
    step: f64,
}

impl MemorySampleSource {
    /// Creates a new memory sample source from interleaved samples.
    #[cfg(test)]
    pub fn new(interleaved_samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self::from_shared(Arc::new(interleaved_samples), channel_count, sample_rate)
    }

    /// Creates a memory sample source over shared interleaved data, played at its
    /// natural rate.
    pub fn from_shared(data: Arc<Vec<f32>>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            data,
            channel_count,
            sample_rate,
            position: 0.0,
            step: 1.0,
        }
    }

    /// Plays the source at `rate` times its natural speed, producing frames at
    /// `output_rate`. The sample rate conversion to the output is folded into the step.
    pub fn resampled(mut self, rate: f64, output_rate: u32) -> Self {
        debug_assert!(rate > 0.0, "playback rate must be positive");
        debug_assert!(output_rate > 0, "output rate must be positive");
        self.step = rate * self.sample_rate as f64 / output_rate as f64;
        self.sample_rate = output_rate;
        self
    }

    /// Returns the number of source frames advanced per produced frame.
    #[cfg(test)]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Returns the total number of source frames.
    fn total_frames(&self) -> usize {
        match self.channel_count {
            0 => 0,
            channels => self.data.len() / channels as usize,
        }
    }
}

impl SampleSource for MemorySampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let channels = self.channel_count as usize;

        if output.len() != channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Output has {} channels, expected {}",
                output.len(),
                channels
            )));
        }

        for ch in output.iter_mut() {
            ch.clear();
        }

        let total_frames = self.total_frames();
        let mut written = 0;
        while written < max_frames && self.position < total_frames as f64 {
            let frame = self.position.floor() as usize;
            let frac = (self.position - frame as f64) as f32;

            for (ch, out_ch) in output.iter_mut().enumerate() {
                let s0 = self.data[frame * channels + ch];
                let s1 = self
                    .data
                    .get((frame + 1) * channels + ch)
                    .copied()
                    .unwrap_or(s0);
                out_ch.push(s0 + (s1 - s0) * frac);
            }

            self.position += self.step;
            written += 1;
        }

        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        if self.sample_rate == 0 || self.step <= 0.0 {
            return None;
        }
        let produced_frames = self.total_frames() as f64 / self.step;
        Some(Duration::from_secs_f64(
            produced_frames / self.sample_rate as f64,
        ))
    }
}

#[cfg(test)]
impl SampleSourceTestExt for MemorySampleSource {
    fn is_finished(&self) -> bool {
        self.position >= self.total_frames() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &mut MemorySampleSource) -> Vec<Vec<f32>> {
        let channels = source.channel_count() as usize;
        let mut all = vec![Vec::new(); channels];
        let mut chunk = vec![Vec::new(); channels];
        while source.next_chunk(&mut chunk, 3).unwrap() > 0 {
            for (all_ch, chunk_ch) in all.iter_mut().zip(chunk.iter()) {
                all_ch.extend_from_slice(chunk_ch);
            }
        }
        all
    }

    #[test]
    fn test_natural_rate_is_planar_copy() {
        let mut source = MemorySampleSource::new(vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 44100);

        let planar = read_all(&mut source);
        assert_eq!(planar[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(planar[1], vec![-0.1, -0.2, -0.3]);
        assert!(source.is_finished());
    }

    #[test]
    fn test_double_rate_halves_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut source = MemorySampleSource::new(samples, 1, 44100).resampled(2.0, 44100);

        let planar = read_all(&mut source);
        assert_eq!(planar[0].len(), 50);
        assert_eq!(planar[0][1], 2.0);
        assert_eq!(planar[0][49], 98.0);
    }

    #[test]
    fn test_half_rate_interpolates() {
        let mut source = MemorySampleSource::new(vec![0.0, 1.0], 1, 44100).resampled(0.5, 44100);

        let planar = read_all(&mut source);
        // The last frame has no right neighbour and holds its value.
        assert_eq!(planar[0], vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_output_rate_folds_into_step() {
        let source = MemorySampleSource::new(vec![0.0; 48000], 1, 48000).resampled(1.0, 24000);
        assert_eq!(source.step(), 2.0);
        assert_eq!(source.sample_rate(), 24000);
        assert_eq!(source.duration(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_duration_stereo() {
        let source = MemorySampleSource::new(vec![0.0; 88200], 2, 44100);
        assert_eq!(source.duration(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_channel_mismatch() {
        let mut source = MemorySampleSource::new(vec![0.0; 4], 2, 44100);
        let mut output = vec![Vec::new()];
        assert!(source.next_chunk(&mut output, 4).is_err());
    }
}
