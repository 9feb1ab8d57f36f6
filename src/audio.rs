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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::config;

pub mod analyser;
pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod sample_source;

pub use analyser::Analyser;
pub use mixer::{ActiveSource, AudioMixer};

/// Global atomic counter for generating unique source IDs.
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a new unique source ID.
pub fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An audio output that mixes sources handed to it.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts playing the given source immediately.
    fn play_source(&self, source: ActiveSource) -> Result<(), Box<dyn Error>>;

    /// The rate the device consumes frames at.
    fn sample_rate(&self) -> u32;

    /// The number of output channels.
    fn num_channels(&self) -> u16;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn fmt::Display>>, Box<dyn Error>> {
    Ok(cpal::Device::list()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn fmt::Display> = Box::new(device);
            device
        })
        .collect())
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.sample_rate().unwrap_or(mock::DEFAULT_SAMPLE_RATE),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
