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
use std::path::PathBuf;

use crate::audio::sample_source::SampleSourceError;

/// Errors from loading samples and playing notes.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Unable to decode sample: {0}")]
    Decode(#[from] SampleSourceError),

    #[error("Unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown note: {0}")]
    UnknownNote(String),

    #[error("Audio device error: {0}")]
    Device(String),
}
