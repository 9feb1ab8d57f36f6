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
use std::io::{self, Write};

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }
}

/// What a cleared canvas holds before anything is filled.
pub const CLEARED: Color = Color::rgb(0, 0, 0);

/// A fixed-size 2D drawing surface.
pub trait Canvas: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Erases everything drawn.
    fn clear(&mut self);

    /// Paints the whole canvas with one color.
    fn fill(&mut self, color: Color);

    /// Strokes straight segments between consecutive points.
    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color, line_width: f64);

    /// Shows the current frame.
    fn present(&mut self) -> io::Result<()>;
}

/// An in-memory RGB raster.
pub struct RasterCanvas {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> RasterCanvas {
        RasterCanvas {
            width,
            height,
            pixels: vec![CLEARED; width as usize * height as usize],
        }
    }

    /// Returns the pixel at the given position, or None outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// Returns the pixels row by row.
    #[cfg(test)]
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    fn set(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.pixels[index] = color;
    }

    /// Paints a square brush of the given width centred on the point.
    fn stamp(&mut self, x: i64, y: i64, color: Color, line_width: i64) {
        let low = -(line_width / 2);
        let high = low + line_width.max(1);
        for dy in low..high {
            for dx in low..high {
                self.set(x + dx, y + dy, color);
            }
        }
    }

    /// Bresenham between two pixel positions.
    fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Color, line_width: i64) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.stamp(x, y, color, line_width);
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl Canvas for RasterCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.pixels.fill(CLEARED);
    }

    fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color, line_width: f64) {
        let line_width = line_width.round().max(1.0) as i64;
        let to_pixel = |(x, y): (f64, f64)| (x.floor() as i64, y.floor() as i64);

        match points {
            [] => {}
            [point] => {
                let (x, y) = to_pixel(*point);
                self.stamp(x, y, color, line_width);
            }
            _ => {
                for pair in points.windows(2) {
                    self.line(to_pixel(pair[0]), to_pixel(pair[1]), color, line_width);
                }
            }
        }
    }

    fn present(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Draws onto a raster and shows it as a character grid, redrawn in place on every
/// frame.
pub struct TerminalCanvas<W: Write + Send> {
    raster: RasterCanvas,
    writer: W,
    columns: u32,
    rows: u32,
    // Last color the whole raster was painted with.
    background: Color,
    presented: bool,
}

impl<W: Write + Send> TerminalCanvas<W> {
    /// Creates a terminal canvas that draws a `width` x `height` raster in a grid of
    /// `columns` x `rows` characters.
    pub fn new(width: u32, height: u32, columns: u32, rows: u32, writer: W) -> Self {
        TerminalCanvas {
            raster: RasterCanvas::new(width, height),
            writer,
            columns: columns.clamp(1, width.max(1)),
            rows: rows.clamp(1, height.max(1)),
            background: CLEARED,
            presented: false,
        }
    }

    /// Renders the raster as lines of characters. A cell shows a mark when any of its
    /// pixels differs from the background.
    pub fn grid(&self) -> Vec<String> {
        let width = self.raster.width;
        let height = self.raster.height;
        (0..self.rows)
            .map(|row| {
                let y0 = row * height / self.rows;
                let y1 = ((row + 1) * height / self.rows).max(y0 + 1);
                (0..self.columns)
                    .map(|column| {
                        let x0 = column * width / self.columns;
                        let x1 = ((column + 1) * width / self.columns).max(x0 + 1);
                        let marked = (y0..y1).any(|y| {
                            (x0..x1).any(|x| {
                                self.raster.pixel(x, y).is_some_and(|p| p != self.background)
                            })
                        });
                        if marked {
                            '*'
                        } else {
                            ' '
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[cfg(test)]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W: Write + Send> Canvas for TerminalCanvas<W> {
    fn width(&self) -> u32 {
        self.raster.width()
    }

    fn height(&self) -> u32 {
        self.raster.height()
    }

    fn clear(&mut self) {
        self.raster.clear();
        self.background = CLEARED;
    }

    fn fill(&mut self, color: Color) {
        self.raster.fill(color);
        self.background = color;
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color, line_width: f64) {
        self.raster.stroke_polyline(points, color, line_width);
    }

    fn present(&mut self) -> io::Result<()> {
        let grid = self.grid();
        if self.presented {
            // Move back to the top of the previous frame.
            write!(self.writer, "\x1b[{}A", self.rows)?;
        }
        for line in grid {
            writeln!(self.writer, "\r{}", line)?;
        }
        self.writer.flush()?;
        self.presented = true;
        Ok(())
    }
}
