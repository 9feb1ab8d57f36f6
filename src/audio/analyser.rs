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

//! Time-domain signal tap for visualization.
//!
//! The analyser sits after a voice's gain stage and keeps the most recent
//! `fft_size` mono samples so a visualizer can read them each frame.

use parking_lot::Mutex;

/// Default analysis window, in samples.
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Keeps a sliding window of the most recent output samples.
pub struct Analyser {
    window: Mutex<Window>,
    fft_size: usize,
}

struct Window {
    samples: Vec<f32>,
    /// Index of the oldest sample, which is also the next write position.
    write_pos: usize,
}

impl Analyser {
    /// Creates a new analyser. The window size must be a power of two.
    pub fn new(fft_size: usize) -> Self {
        debug_assert!(fft_size.is_power_of_two(), "fft size must be a power of two");
        Self {
            window: Mutex::new(Window {
                samples: vec![0.0; fft_size],
                write_pos: 0,
            }),
            fft_size,
        }
    }

    /// Returns the number of samples in the analysis window.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Pushes samples into the window, overwriting the oldest ones.
    pub fn push_samples(&self, samples: &[f32]) {
        let mut window = self.window.lock();
        for &sample in samples {
            let pos = window.write_pos;
            window.samples[pos] = sample;
            window.write_pos = (pos + 1) & (self.fft_size - 1);
        }
    }

    /// Copies the window, oldest sample first, into `output` as f32 samples.
    #[cfg(test)]
    pub fn float_time_domain_data(&self, output: &mut [f32]) {
        let window = self.window.lock();
        for (i, out) in output.iter_mut().take(self.fft_size).enumerate() {
            *out = window.samples[(window.write_pos + i) & (self.fft_size - 1)];
        }
    }

    /// Copies the window, oldest sample first, into `output` as unsigned bytes centered
    /// at 128. A sample of -1.0 maps to 0, silence to 128 and 1.0 and above to 255.
    pub fn byte_time_domain_data(&self, output: &mut [u8]) {
        let window = self.window.lock();
        for (i, out) in output.iter_mut().take(self.fft_size).enumerate() {
            let sample = window.samples[(window.write_pos + i) & (self.fft_size - 1)];
            *out = to_byte(sample);
        }
    }

    /// Resets the window to silence.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.samples.fill(0.0);
        window.write_pos = 0;
    }
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .finish()
    }
}

#[inline]
fn to_byte(sample: f32) -> u8 {
    (128.0 * (sample + 1.0)).floor().clamp(0.0, 255.0) as u8
}
