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
use std::{error::Error, path::Path, sync::Arc};

use tracing::{debug, error, info, span, Level};

use crate::{
    audio::{self, Analyser},
    config,
    notes::KeyboardLayout,
};

mod error;
pub mod pitch;
mod store;
mod voice;

pub use self::error::SamplerError;
pub use self::store::{Sample, SampleStore};
pub use self::voice::{VoiceController, VoiceHandle};

/// Every voice is played at this fixed linear gain.
pub const VOICE_GAIN: f32 = 0.5;

/// The sampler owns the loaded sample, the voice slot, the output device and, when
/// the waveform is drawn, the analyser every voice is routed through.
pub struct Sampler {
    keyboard: KeyboardLayout,
    store: SampleStore,
    voices: VoiceController,
    device: Arc<dyn audio::Device>,
    analyser: Option<Arc<Analyser>>,
}

impl Sampler {
    /// Creates a new sampler with no sample loaded.
    pub fn new(
        keyboard: KeyboardLayout,
        device: Arc<dyn audio::Device>,
        analyser: Option<Arc<Analyser>>,
    ) -> Sampler {
        Sampler {
            keyboard,
            store: SampleStore::new(),
            voices: VoiceController::new(),
            device,
            analyser,
        }
    }

    /// Creates a sampler from configuration, opening the audio device and loading the
    /// configured sample. A sample that fails to load is logged and skipped.
    pub fn from_config(config: &config::Sampler) -> Result<Sampler, Box<dyn Error>> {
        let keyboard = config.keyboard()?;
        let device = audio::get_device(config.audio())?;
        let analyser = config
            .visualizer_enabled()
            .then(|| Arc::new(Analyser::new(config.visualizer().fft_size())));

        info!(
            device = %device,
            base_frequency = keyboard.base_frequency(),
            keys = keyboard.notes().len(),
            visualizer = analyser.is_some(),
            "Sampler ready"
        );

        let sampler = Sampler::new(keyboard, device, analyser);
        if let Some(sample) = config.sample() {
            if let Err(e) = sampler.load_file(sample) {
                error!(path = %sample.display(), err = %e, "Unable to load configured sample");
            }
        }
        Ok(sampler)
    }

    pub fn keyboard(&self) -> &KeyboardLayout {
        &self.keyboard
    }

    /// The analyser voices feed, present only when the waveform is drawn.
    pub fn analyser(&self) -> Option<Arc<Analyser>> {
        self.analyser.clone()
    }

    /// Decodes raw audio bytes into the current sample. On failure the previous sample
    /// stays loaded.
    pub fn upload(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Sample, SamplerError> {
        self.store.upload(bytes, extension)
    }

    /// Loads an audio file into the current sample.
    pub fn load_file(&self, path: &Path) -> Result<Sample, SamplerError> {
        self.store.load_file(path)
    }

    pub fn sample(&self) -> Option<Sample> {
        self.store.current()
    }

    /// Plays the key with the given label. Returns `Ok(None)` when no sample is loaded.
    pub fn play_note(&self, label: &str) -> Result<Option<VoiceHandle>, SamplerError> {
        let note = self
            .keyboard
            .find(label)
            .ok_or_else(|| SamplerError::UnknownNote(label.to_string()))?;

        let span = span!(Level::DEBUG, "play note", note = note.label());
        let _enter = span.enter();
        self.play_frequency(note.frequency())
    }

    /// Plays the sample pitched to the given frequency. Returns `Ok(None)` when no
    /// sample is loaded.
    pub fn play_frequency(&self, frequency: f64) -> Result<Option<VoiceHandle>, SamplerError> {
        let Some(sample) = self.store.current() else {
            debug!(frequency, "No sample loaded, ignoring");
            return Ok(None);
        };

        let rate = pitch::rate_for(frequency, self.keyboard.base_frequency());
        if let Some(analyser) = &self.analyser {
            analyser.reset();
        }
        self.voices
            .play(
                &sample,
                rate,
                VOICE_GAIN,
                self.analyser.clone(),
                self.device.as_ref(),
            )
            .map(Some)
    }

    /// Stops the active voice, if any.
    pub fn stop(&self) {
        self.voices.stop();
    }

    /// True while a voice is playing.
    pub fn is_playing(&self) -> bool {
        self.voices.is_active()
    }

    /// Stops the active voice and forgets the current sample.
    pub fn unload(&self) {
        self.voices.stop();
        self.store.clear();
        info!("Sample unloaded");
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.voices.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::mock, notes::Layout, testutil::wav_bytes};

    fn sampler(layout: Layout, analyser: Option<Arc<Analyser>>) -> (Sampler, Arc<mock::Device>) {
        let device = Arc::new(mock::Device::manual(1, 44100));
        let sampler = Sampler::new(layout.keyboard(), device.clone(), analyser);
        (sampler, device)
    }

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32 / frames as f32).collect()
    }

    #[test]
    fn test_play_without_sample_is_ignored() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        assert!(sampler.play_note("A4").unwrap().is_none());
        assert!(!sampler.is_playing());
        assert_eq!(device.active_count(), 0);
    }

    #[test]
    fn test_unknown_note() {
        let (sampler, _device) = sampler(Layout::SingleOctave, None);
        sampler
            .upload(wav_bytes(&[vec![0.5; 10]], 44100), Some("wav"))
            .unwrap();
        assert!(matches!(
            sampler.play_note("C2"),
            Err(SamplerError::UnknownNote(_))
        ));
        assert!(!sampler.is_playing());
    }

    #[test]
    fn test_natural_rate() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        let frames = ramp(64);
        sampler
            .upload(wav_bytes(&[frames.clone()], 44100), Some("wav"))
            .unwrap();

        let handle = sampler.play_note("a4").unwrap().unwrap();
        let output = device.render(64);
        for (out, expected) in output.iter().zip(frames.iter()) {
            assert_eq!(*out, expected * VOICE_GAIN);
        }
        assert!(handle.is_active());
        device.render(1);
        assert!(!handle.is_active());
        assert!(!sampler.is_playing());
    }

    #[test]
    fn test_octave_up_halves_duration() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        let frames = ramp(64);
        sampler
            .upload(wav_bytes(&[frames.clone()], 44100), Some("wav"))
            .unwrap();

        let handle = sampler.play_frequency(880.0).unwrap().unwrap();
        let output = device.render(64);
        for i in 0..32 {
            assert_eq!(output[i], frames[i * 2] * VOICE_GAIN);
        }
        assert!(output[32..].iter().all(|s| *s == 0.0));
        assert!(!handle.is_active());
    }

    #[test]
    fn test_sample_rate_follows_device() {
        let device = Arc::new(mock::Device::manual(1, 22050));
        let sampler = Sampler::new(Layout::SingleOctave.keyboard(), device.clone(), None);
        sampler
            .upload(wav_bytes(&[ramp(64)], 44100), Some("wav"))
            .unwrap();

        // A 44.1 kHz sample on a 22.05 kHz device at rate 1.0 lasts 32 output frames.
        sampler.play_note("A4").unwrap();
        let output = device.render(64);
        assert!(output[..32].iter().skip(1).all(|s| *s > 0.0));
        assert!(output[32..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_new_note_replaces_voice() {
        let (sampler, device) = sampler(Layout::TwoOctave, None);
        sampler
            .upload(wav_bytes(&[vec![0.5; 44100]], 44100), Some("wav"))
            .unwrap();

        let first = sampler.play_note("C2").unwrap().unwrap();
        let second = sampler.play_note("C4").unwrap().unwrap();
        assert!(!first.is_active());
        assert!(second.is_active());

        device.render(8);
        assert_eq!(device.active_count(), 1);
        assert!(!first.is_active());
        assert!(sampler.is_playing());
    }

    #[test]
    fn test_upload_replaces_sample_for_new_voices() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        sampler
            .upload(wav_bytes(&[vec![0.2; 1000]], 44100), Some("wav"))
            .unwrap();
        sampler
            .upload(wav_bytes(&[vec![0.8; 1000]], 44100), Some("wav"))
            .unwrap();

        sampler.play_note("A4").unwrap();
        let output = device.render(16);
        assert!(output.iter().all(|s| *s == 0.4));
    }

    #[test]
    fn test_failed_upload_keeps_playing_sample() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        sampler
            .upload(wav_bytes(&[vec![0.2; 1000]], 44100), Some("wav"))
            .unwrap();
        assert!(sampler.upload(b"garbage".repeat(64), Some("wav")).is_err());

        sampler.play_note("A4").unwrap();
        let output = device.render(16);
        assert!(output.iter().all(|s| (*s - 0.1).abs() < 1e-7));
    }

    #[test]
    fn test_stop() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        sampler.stop();
        sampler
            .upload(wav_bytes(&[vec![0.5; 1000]], 44100), Some("wav"))
            .unwrap();
        let handle = sampler.play_note("C4").unwrap().unwrap();
        sampler.stop();
        sampler.stop();
        assert!(!handle.is_active());
        assert!(!sampler.is_playing());
        assert!(device.render(16).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_analyser_sees_post_gain_signal() {
        let analyser = Arc::new(Analyser::new(32));
        let (sampler, device) = sampler(Layout::SingleOctave, Some(analyser.clone()));
        sampler
            .upload(wav_bytes(&[vec![0.5; 1000]], 44100), Some("wav"))
            .unwrap();
        sampler.play_note("A4").unwrap();
        device.render(64);

        let mut data = vec![0.0; 32];
        analyser.float_time_domain_data(&mut data);
        assert!(data.iter().all(|s| *s == 0.25));

        let mut bytes = vec![0; 32];
        analyser.byte_time_domain_data(&mut bytes);
        assert!(bytes.iter().all(|b| *b == 160));
    }

    #[test]
    fn test_new_voice_resets_analyser() {
        let analyser = Arc::new(Analyser::new(32));
        let (sampler, device) = sampler(Layout::SingleOctave, Some(analyser.clone()));
        sampler
            .upload(wav_bytes(&[vec![0.5; 1000]], 44100), Some("wav"))
            .unwrap();
        sampler.play_note("A4").unwrap();
        device.render(64);

        sampler.play_note("C4").unwrap();
        let mut bytes = vec![0; 32];
        analyser.byte_time_domain_data(&mut bytes);
        assert!(bytes.iter().all(|b| *b == 128));
    }

    #[test]
    fn test_unload() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        sampler.unload();
        sampler
            .upload(wav_bytes(&[vec![0.5; 1000]], 44100), Some("wav"))
            .unwrap();
        let handle = sampler.play_note("A4").unwrap().unwrap();

        sampler.unload();
        assert!(!handle.is_active());
        assert!(sampler.sample().is_none());
        assert!(sampler.play_note("A4").unwrap().is_none());
        device.render(1);
        assert_eq!(device.active_count(), 0);
    }

    #[test]
    fn test_drop_stops_voice() {
        let (sampler, device) = sampler(Layout::SingleOctave, None);
        sampler
            .upload(wav_bytes(&[vec![0.5; 1000]], 44100), Some("wav"))
            .unwrap();
        let handle = sampler.play_note("A4").unwrap().unwrap();
        drop(sampler);
        assert!(!handle.is_active());
        device.render(1);
        assert_eq!(device.active_count(), 0);
    }
}
