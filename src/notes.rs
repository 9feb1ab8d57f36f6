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

//! Keyboard layouts: fixed note tables and the base frequency samples are assumed
//! to be recorded at.

use std::fmt;

use serde::Deserialize;

use crate::sampler::pitch;

/// A key on the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    label: &'static str,
    frequency: f64,
}

impl Note {
    const fn new(label: &'static str, frequency: f64) -> Note {
        Note { label, frequency }
    }

    /// The key's label, e.g. "C4".
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The key's frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2} Hz)", self.label, self.frequency)
    }
}

/// One octave of white keys from C4 to C5.
const SINGLE_OCTAVE: [Note; 8] = [
    Note::new("C4", 261.63),
    Note::new("D4", 293.66),
    Note::new("E4", 329.63),
    Note::new("F4", 349.23),
    Note::new("G4", 392.0),
    Note::new("A4", 440.0),
    Note::new("B4", 493.88),
    Note::new("C5", 523.25),
];

/// Two octaves of white keys from C2 to C4.
const TWO_OCTAVE: [Note; 15] = [
    Note::new("C2", 65.41),
    Note::new("D2", 73.42),
    Note::new("E2", 82.41),
    Note::new("F2", 87.31),
    Note::new("G2", 98.0),
    Note::new("A2", 110.0),
    Note::new("B2", 123.47),
    Note::new("C3", 130.81),
    Note::new("D3", 146.83),
    Note::new("E3", 164.81),
    Note::new("F3", 174.61),
    Note::new("G3", 196.0),
    Note::new("A3", 220.0),
    Note::new("B3", 246.94),
    Note::new("C4", 261.63),
];

/// A4, the assumed pitch of samples played on the single octave keyboard.
pub const A4_HZ: f64 = 440.0;

/// C3, the assumed pitch of samples played on the two octave keyboard.
pub const C3_HZ: f64 = 130.81;

/// The built-in keyboards.
#[derive(Deserialize, clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// C4 to C5, samples assumed at A4, visualizer on.
    #[default]
    SingleOctave,
    /// C2 to C4, samples assumed at C3, no visualizer.
    TwoOctave,
}

impl Layout {
    /// Builds the keyboard for this layout.
    pub fn keyboard(self) -> KeyboardLayout {
        match self {
            Layout::SingleOctave => KeyboardLayout {
                notes: &SINGLE_OCTAVE,
                base_frequency: A4_HZ,
                key_style: KeyStyle::Button,
                visualizer: true,
            },
            Layout::TwoOctave => KeyboardLayout {
                notes: &TWO_OCTAVE,
                base_frequency: C3_HZ,
                key_style: KeyStyle::WhiteKey,
                visualizer: false,
            },
        }
    }
}

/// How keys are drawn when the keyboard is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// Rounded piano buttons: `( C4 )`.
    Button,
    /// Plain white keys: `|C2 |`.
    WhiteKey,
}

/// A note table together with the base frequency and presentation defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardLayout {
    notes: &'static [Note],
    base_frequency: f64,
    key_style: KeyStyle,
    visualizer: bool,
}

impl KeyboardLayout {
    /// Overrides the base frequency. It must be positive and finite.
    pub fn with_base_frequency(mut self, base_frequency: f64) -> Result<Self, String> {
        if !(base_frequency.is_finite() && base_frequency > 0.0) {
            return Err(format!(
                "base frequency must be a positive number of Hz, got {}",
                base_frequency
            ));
        }
        self.base_frequency = base_frequency;
        Ok(self)
    }

    /// The keys, lowest first.
    pub fn notes(&self) -> &'static [Note] {
        self.notes
    }

    /// The assumed natural pitch of any loaded sample.
    pub fn base_frequency(&self) -> f64 {
        self.base_frequency
    }

    pub fn key_style(&self) -> KeyStyle {
        self.key_style
    }

    /// Whether this layout shows the visualizer unless configured otherwise.
    pub fn visualizer_default(&self) -> bool {
        self.visualizer
    }

    /// Finds a key by label, ignoring case.
    pub fn find(&self, label: &str) -> Option<&'static Note> {
        let label = label.trim();
        self.notes
            .iter()
            .find(|note| note.label.eq_ignore_ascii_case(label))
    }

    /// The playback rate for the given key.
    pub fn rate_for(&self, note: &Note) -> f64 {
        pitch::rate_for(note.frequency, self.base_frequency)
    }
}

impl fmt::Display for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in self.notes {
            match self.key_style {
                KeyStyle::Button => write!(f, "( {} )", note.label)?,
                KeyStyle::WhiteKey => write!(f, "|{:<3}", note.label)?,
            }
        }
        if self.key_style == KeyStyle::WhiteKey {
            write!(f, "|")?;
        }
        Ok(())
    }
}
