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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::{audio::Audio, error::ConfigError, visualizer::Visualizer};
use crate::notes::{KeyboardLayout, Layout};

/// A YAML representation of the sampler.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Sampler {
    /// The audio output.
    #[serde(default)]
    audio: Audio,

    /// The keyboard layout (default: single-octave).
    #[serde(default)]
    keyboard: Layout,

    /// Overrides the layout's base frequency.
    base_frequency: Option<f64>,

    /// A sample to load at start.
    sample: Option<PathBuf>,

    /// The waveform visualizer.
    #[serde(default)]
    visualizer: Visualizer,
}

impl Sampler {
    /// Creates a sampler configuration with default visualizer settings.
    pub fn new(audio: Audio, keyboard: Layout) -> Sampler {
        Sampler {
            audio,
            keyboard,
            ..Default::default()
        }
    }

    /// Parses and validates a sampler configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Sampler, ConfigError> {
        let mut sampler = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Sampler>()?;

        // Relative sample paths are relative to the config file.
        if let (Some(sample), Some(parent)) = (&sampler.sample, path.parent()) {
            if sample.is_relative() {
                sampler.sample = Some(parent.join(sample));
            }
        }

        sampler.validate()?;
        Ok(sampler)
    }

    /// Checks values that deserialization alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keyboard()?;
        self.visualizer.validate()
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Builds the keyboard layout with any base frequency override applied.
    pub fn keyboard(&self) -> Result<KeyboardLayout, ConfigError> {
        let keyboard = self.keyboard.keyboard();
        match self.base_frequency {
            Some(base_frequency) => keyboard
                .with_base_frequency(base_frequency)
                .map_err(ConfigError::Invalid),
            None => Ok(keyboard),
        }
    }

    /// The sample to load at start, if any.
    pub fn sample(&self) -> Option<&Path> {
        self.sample.as_deref()
    }

    pub fn visualizer(&self) -> &Visualizer {
        &self.visualizer
    }

    /// Whether the visualizer runs with this configuration.
    pub fn visualizer_enabled(&self) -> bool {
        self.visualizer
            .enabled(self.keyboard.keyboard().visualizer_default())
    }
}
