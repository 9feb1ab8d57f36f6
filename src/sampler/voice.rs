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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{error::SamplerError, store::Sample};
use crate::{
    audio::{self, ActiveSource, Analyser},
    playsync::CancelHandle,
};

/// Observes one voice. Clones observe the same voice.
#[derive(Clone)]
pub struct VoiceHandle {
    id: u64,
    cancel_handle: CancelHandle,
    finished: Arc<AtomicBool>,
}

impl VoiceHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True until the voice is stopped or reaches the end of its sample.
    pub fn is_active(&self) -> bool {
        !self.cancel_handle.is_cancelled() && !self.finished.load(Ordering::Relaxed)
    }

    /// Blocks until the voice is no longer active.
    pub fn wait(&self) {
        self.cancel_handle.wait(self.finished.clone());
    }

    fn stop(&self) {
        self.cancel_handle.cancel();
    }
}

struct Voice {
    handle: VoiceHandle,
    rate: f64,
}

/// Owns the single voice slot. Starting a voice stops whatever is playing first.
#[derive(Default)]
pub struct VoiceController {
    slot: Mutex<Option<Voice>>,
}

impl VoiceController {
    pub fn new() -> VoiceController {
        Self::default()
    }

    /// Stops the active voice, then starts `sample` at `rate` on the device. The
    /// signal path is rate shift -> gain -> tap -> output.
    pub fn play(
        &self,
        sample: &Sample,
        rate: f64,
        gain: f32,
        tap: Option<Arc<Analyser>>,
        device: &dyn audio::Device,
    ) -> Result<VoiceHandle, SamplerError> {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.take() {
            debug!(voice_id = previous.handle.id, "Stopping previous voice");
            previous.handle.stop();
        }

        let id = audio::next_source_id();
        let cancel_handle = CancelHandle::new();
        let source = sample.source().resampled(rate, device.sample_rate());
        let active_source =
            ActiveSource::new(id, Box::new(source), gain, tap, cancel_handle.clone());
        let handle = VoiceHandle {
            id,
            cancel_handle,
            finished: active_source.finished_flag(),
        };

        device
            .play_source(active_source)
            .map_err(|e| SamplerError::Device(e.to_string()))?;

        debug!(voice_id = id, sample_id = sample.id(), rate, "Voice started");
        *slot = Some(Voice {
            handle: handle.clone(),
            rate,
        });
        Ok(handle)
    }

    /// Halts the active voice immediately. Does nothing when idle.
    pub fn stop(&self) {
        if let Some(voice) = self.slot.lock().take() {
            debug!(voice_id = voice.handle.id, rate = voice.rate, "Voice stopped");
            voice.handle.stop();
        }
    }

    /// True while the slot holds a voice that is still playing. A voice that has
    /// ended is released from the slot by id, so a voice started in the meantime stays.
    pub fn is_active(&self) -> bool {
        let ended = match self.slot.lock().as_ref() {
            Some(voice) if voice.handle.is_active() => return true,
            Some(voice) => voice.handle.id,
            None => return false,
        };

        if self.release(ended) {
            debug!(voice_id = ended, "Voice ended");
            false
        } else {
            self.is_active()
        }
    }

    /// Clears the slot only if it still holds the voice with the given id.
    pub fn release(&self, voice_id: u64) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(voice) if voice.handle.id == voice_id => {
                voice.handle.stop();
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// The active voice's handle and playback rate.
    #[cfg(test)]
    pub fn current(&self) -> Option<(VoiceHandle, f64)> {
        self.slot
            .lock()
            .as_ref()
            .map(|voice| (voice.handle.clone(), voice.rate))
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fmt};

    use super::*;
    use crate::audio::mock;

    fn sample(frames: usize, value: f32) -> Sample {
        Sample::from_frames(vec![value; frames], 1, 44100)
    }

    #[test]
    fn test_single_voice() {
        let device = mock::Device::manual(1, 44100);
        let voices = VoiceController::new();
        let sample = sample(44100, 0.5);

        let first = voices.play(&sample, 1.0, 0.5, None, &device).unwrap();
        let second = voices.play(&sample, 2.0, 0.5, None, &device).unwrap();

        assert!(!first.is_active());
        assert!(second.is_active());
        assert!(voices.is_active());
        assert_eq!(voices.current().map(|(h, r)| (h.id(), r)), Some((second.id(), 2.0)));

        // The cancelled source is dropped on the next block, so only one voice sounds.
        let output = device.render(16);
        assert_eq!(device.active_count(), 1);
        assert!(output.iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let device = mock::Device::manual(1, 44100);
        let voices = VoiceController::new();
        voices.stop();
        assert!(!voices.is_active());

        let handle = voices.play(&sample(1000, 0.5), 1.0, 0.5, None, &device).unwrap();
        voices.stop();
        voices.stop();
        assert!(!handle.is_active());
        assert!(!voices.is_active());

        device.render(16);
        assert_eq!(device.active_count(), 0);
    }

    #[test]
    fn test_natural_end() {
        let device = mock::Device::manual(1, 44100);
        let voices = VoiceController::new();
        let handle = voices.play(&sample(10, 0.5), 1.0, 0.5, None, &device).unwrap();
        assert!(handle.is_active());

        let output = device.render(32);
        assert!(output[..10].iter().all(|s| *s == 0.25));
        assert!(output[10..].iter().all(|s| *s == 0.0));

        assert!(!handle.is_active());
        handle.wait();
        assert!(!voices.is_active());
        assert!(voices.current().is_none());
    }

    #[test]
    fn test_release_compares_id() {
        let device = mock::Device::manual(1, 44100);
        let voices = VoiceController::new();
        let first = voices.play(&sample(1000, 0.5), 1.0, 0.5, None, &device).unwrap();
        let second = voices.play(&sample(1000, 0.5), 1.0, 0.5, None, &device).unwrap();

        assert!(!voices.release(first.id()));
        assert!(voices.is_active());
        assert!(second.is_active());

        assert!(voices.release(second.id()));
        assert!(!voices.is_active());
        assert!(!second.is_active());
        assert!(!voices.release(second.id()));
    }

    #[test]
    fn test_wait_returns_on_stop() {
        let device = mock::Device::manual(1, 44100);
        let voices = Arc::new(VoiceController::new());
        let handle = voices.play(&sample(1000, 0.5), 1.0, 0.5, None, &device).unwrap();

        let join = {
            let handle = handle.clone();
            std::thread::spawn(move || handle.wait())
        };
        voices.stop();
        assert!(join.join().is_ok());
    }

    struct BrokenDevice;

    impl fmt::Display for BrokenDevice {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "broken")
        }
    }

    impl audio::Device for BrokenDevice {
        fn play_source(&self, _: ActiveSource) -> Result<(), Box<dyn Error>> {
            Err("device went away".into())
        }

        fn sample_rate(&self) -> u32 {
            44100
        }

        fn num_channels(&self) -> u16 {
            2
        }
    }

    #[test]
    fn test_device_failure() {
        let voices = VoiceController::new();
        let result = voices.play(&sample(10, 0.5), 1.0, 0.5, None, &BrokenDevice);
        assert!(matches!(result, Err(SamplerError::Device(_))));
        assert!(!voices.is_active());
    }
}
