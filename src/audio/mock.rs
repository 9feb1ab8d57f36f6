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
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{info, span, Level};

use super::mixer::{ActiveSource, AudioMixer};

/// Sample rate used by mock devices unless configured otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Number of frames rendered per pump iteration.
const PUMP_FRAMES: usize = 512;

/// A mock device. It mixes sources like a real device but discards the output. When
/// created with `get` a pump thread consumes frames in real time; a manual device only
/// advances when `render` is called.
pub struct Device {
    name: String,
    mixer: AudioMixer,
    running: Arc<AtomicBool>,
    pump: Option<thread::JoinHandle<()>>,
}

impl Device {
    /// Gets the given mock device, consuming audio at wall-clock pace.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        let mixer = AudioMixer::new(2, sample_rate);
        let running = Arc::new(AtomicBool::new(true));

        let pump = {
            let mixer = mixer.clone();
            let running = running.clone();
            let name = name.to_string();
            thread::spawn(move || {
                let span = span!(Level::INFO, "mock pump", device = %name);
                let _enter = span.enter();

                let block = Duration::from_secs_f64(PUMP_FRAMES as f64 / sample_rate as f64);
                let mut scratch = vec![0.0f32; PUMP_FRAMES * mixer.num_channels() as usize];
                while running.load(Ordering::Relaxed) {
                    mixer.process_into_output(&mut scratch, PUMP_FRAMES);
                    spin_sleep::sleep(block);
                }
            })
        };

        info!(device = name, sample_rate, "Mock device started");
        Device {
            name: name.to_string(),
            mixer,
            running,
            pump: Some(pump),
        }
    }

    /// Creates a mock device that only advances when `render` is called.
    #[cfg(test)]
    pub fn manual(num_channels: u16, sample_rate: u32) -> Device {
        Device {
            name: "mock-manual".to_string(),
            mixer: AudioMixer::new(num_channels, sample_rate),
            running: Arc::new(AtomicBool::new(false)),
            pump: None,
        }
    }

    /// Renders the given number of frames and returns them interleaved.
    #[cfg(test)]
    pub fn render(&self, num_frames: usize) -> Vec<f32> {
        self.mixer.process_frames(num_frames)
    }

    /// Returns the number of sources the mixer is playing.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.mixer.active_count()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl super::Device for Device {
    fn play_source(&self, source: ActiveSource) -> Result<(), Box<dyn Error>> {
        self.mixer.sender().send(source)?;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    fn num_channels(&self) -> u16 {
        self.mixer.num_channels()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;
    use crate::audio::Device as _;
    use crate::playsync::CancelHandle;
    use crate::testutil::eventually;

    #[test]
    fn test_pump_consumes_sources() {
        let device = Device::get("mock-pump", 44100);
        let source = ActiveSource::new(
            1,
            Box::new(MemorySampleSource::new(vec![0.1; 64], 1, 44100)),
            1.0,
            None,
            CancelHandle::new(),
        );
        let finished = source.finished_flag();
        device.play_source(source).unwrap();

        eventually(
            || finished.load(Ordering::Relaxed),
            "Mock pump never finished the source",
        );
        assert_eq!(device.to_string(), "mock-pump (Mock)");
    }
}
