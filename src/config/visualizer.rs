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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::analyser::DEFAULT_FFT_SIZE;

const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 200;
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// A YAML representation of the waveform visualizer.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Visualizer {
    /// Whether to draw at all. Unset follows the keyboard layout.
    enabled: Option<bool>,

    /// Canvas width in pixels (default: 800).
    width: Option<u32>,

    /// Canvas height in pixels (default: 200).
    height: Option<u32>,

    /// Number of samples drawn per frame. Must be a power of two (default: 2048).
    fft_size: Option<usize>,

    /// Time between frames, e.g. "16ms".
    frame_interval: Option<String>,
}

impl Visualizer {
    /// Whether the visualizer runs, falling back to the layout's default.
    pub fn enabled(&self, layout_default: bool) -> bool {
        self.enabled.unwrap_or(layout_default)
    }

    pub fn width(&self) -> u32 {
        self.width.unwrap_or(DEFAULT_WIDTH)
    }

    pub fn height(&self) -> u32 {
        self.height.unwrap_or(DEFAULT_HEIGHT)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size.unwrap_or(DEFAULT_FFT_SIZE)
    }

    /// Returns the time between frames.
    pub fn frame_interval(&self) -> Result<Duration, ConfigError> {
        match &self.frame_interval {
            Some(interval) => Ok(DurationString::from_string(interval.clone())
                .map_err(|e| {
                    ConfigError::Invalid(format!("frame_interval {}: {}", interval, e))
                })?
                .into()),
            None => Ok(DEFAULT_FRAME_INTERVAL),
        }
    }

    /// Checks the canvas dimensions, window size and frame interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width() == 0 || self.height() == 0 {
            return Err(ConfigError::Invalid(format!(
                "visualizer canvas must not be empty, got {}x{}",
                self.width(),
                self.height()
            )));
        }
        if !self.fft_size().is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "visualizer fft_size must be a power of two, got {}",
                self.fft_size()
            )));
        }
        if self.frame_interval()?.is_zero() {
            return Err(ConfigError::Invalid(
                "visualizer frame_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
