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
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use parking_lot::Mutex;
use tracing::{debug, error, span, Level};

use crate::{audio::Analyser, config};

mod canvas;
mod clock;

pub use self::canvas::{Canvas, Color, RasterCanvas, TerminalCanvas};
pub use self::clock::{FrameClock, IntervalClock};

/// Canvas background.
pub const BACKGROUND: Color = Color::rgb(0x22, 0x22, 0x22);

/// Waveform stroke color.
pub const WAVEFORM: Color = Color::rgb(0x00, 0xff, 0x00);

/// Waveform stroke width in pixels.
pub const LINE_WIDTH: f64 = 2.0;

/// Pixels per terminal column and row when drawing to the terminal.
const CELL_WIDTH: u32 = 10;
const CELL_HEIGHT: u32 = 20;

/// Maps byte time-domain samples to canvas points. Sample `i` lands at
/// `x = i * width / n` and 128 (silence) on the vertical centre. The line is closed
/// at the right edge on the centre line.
pub fn waveform_points(bytes: &[u8], width: f64, height: f64) -> Vec<(f64, f64)> {
    let slice_width = if bytes.is_empty() {
        0.0
    } else {
        width / bytes.len() as f64
    };

    let mut points = Vec::with_capacity(bytes.len() + 1);
    for (i, byte) in bytes.iter().enumerate() {
        let v = *byte as f64 / 128.0;
        let y = (v - 1.0) * height / 2.0 + height / 2.0;
        points.push((i as f64 * slice_width, y));
    }
    points.push((width, height / 2.0));
    points
}

struct Surface {
    canvas: Box<dyn Canvas>,
    bytes: Vec<u8>,
}

/// Draws the analyser's waveform while a voice plays. At most one draw loop runs at a
/// time.
pub struct Visualizer {
    analyser: Arc<Analyser>,
    surface: Mutex<Surface>,
    clock: Box<dyn FrameClock>,
    running: AtomicBool,
}

impl Visualizer {
    pub fn new(
        analyser: Arc<Analyser>,
        canvas: Box<dyn Canvas>,
        clock: Box<dyn FrameClock>,
    ) -> Visualizer {
        let bytes = vec![0; analyser.fft_size()];
        Visualizer {
            analyser,
            surface: Mutex::new(Surface { canvas, bytes }),
            clock,
            running: AtomicBool::new(false),
        }
    }

    /// Creates a visualizer that draws to the terminal.
    pub fn from_config(
        config: &config::Visualizer,
        analyser: Arc<Analyser>,
    ) -> Result<Visualizer, config::ConfigError> {
        let width = config.width();
        let height = config.height();
        let canvas = TerminalCanvas::new(
            width,
            height,
            width / CELL_WIDTH,
            height / CELL_HEIGHT,
            io::stdout(),
        );
        let clock = IntervalClock::new(config.frame_interval()?);
        Ok(Visualizer::new(analyser, Box::new(canvas), Box::new(clock)))
    }

    /// Draws one frame of the current waveform.
    pub fn draw_frame(&self) -> io::Result<()> {
        let mut surface = self.surface.lock();
        let Surface { canvas, bytes } = &mut *surface;

        self.analyser.byte_time_domain_data(bytes);
        let points = waveform_points(bytes, canvas.width() as f64, canvas.height() as f64);

        canvas.clear();
        canvas.fill(BACKGROUND);
        canvas.stroke_polyline(&points, WAVEFORM, LINE_WIDTH);
        canvas.present()
    }

    /// Draws frames for as long as `is_active` holds, waiting on the clock between
    /// frames. Returns the number of frames drawn.
    pub fn run_while<F>(&self, is_active: F) -> usize
    where
        F: Fn() -> bool,
    {
        let mut frames = 0;
        while is_active() {
            if let Err(e) = self.draw_frame() {
                error!(err = %e, "Unable to draw frame");
                break;
            }
            frames += 1;
            self.clock.wait();
        }
        frames
    }

    /// True while a draw loop is running.
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the draw loop on its own thread unless one is already running. Returns
    /// true if a new loop was started.
    pub fn start<F>(self: &Arc<Self>, is_active: F) -> bool
    where
        F: Fn() -> bool + Send + 'static,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let visualizer = self.clone();
        thread::spawn(move || {
            let span = span!(Level::INFO, "visualizer");
            let _enter = span.enter();

            loop {
                let frames = visualizer.run_while(&is_active);
                debug!(frames, "Draw loop ended");
                visualizer.running.store(false, Ordering::Release);

                // A voice may have started after the last check, while the loop was
                // still marked as running.
                if !is_active()
                    || visualizer
                        .running
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    break;
                }
            }
        });
        true
    }
}
