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

/// Returns the playback rate that turns a sample recorded at `base_frequency` into
/// `note_frequency`. An octave up is 2.0, an octave down 0.5.
#[inline]
pub fn rate_for(note_frequency: f64, base_frequency: f64) -> f64 {
    debug_assert!(base_frequency > 0.0, "base frequency must be positive");
    note_frequency / base_frequency
}
