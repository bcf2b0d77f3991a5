//! PNG rendering of report tables.
//!
//! Text is drawn with the 8x8 bitmap glyphs from `font8x8`, scaled up by
//! `SCALE`. Only ASCII is drawn; any other character becomes `?`.

use crate::error::{FormatError, FormatResult};
use font8x8::legacy::BASIC_LEGACY;

const SCALE: u32 = 2;
const GLYPH: u32 = 8 * SCALE;
const PADDING: u32 = 24;
const ROW_HEIGHT: u32 = GLYPH + 12;
/// Blank characters between columns.
const COLUMN_GAP: usize = 3;

type Rgb = [u8; 3];

const BACKGROUND: Rgb = [255, 255, 255];
const INK: Rgb = [33, 37, 41];
const MUTED: Rgb = [108, 117, 125];
const HEADER_FILL: Rgb = [222, 226, 230];
const STRIPE_FILL: Rgb = [244, 245, 247];
const RULE: Rgb = [173, 181, 189];
const RISE: Rgb = [25, 135, 84];
const FALL: Rgb = [200, 35, 51];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A titled text table.
///
/// Cells after the first column that start with `+` or `-` are drawn in
/// green or red.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableImage {
    pub title: String,
    pub columns: Vec<(String, Align)>,
    pub rows: Vec<Vec<String>>,
    pub footer: Vec<String>,
}

impl TableImage {
    fn column_widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, (header, _))| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn content_chars(&self, widths: &[usize]) -> usize {
        let table = widths.iter().sum::<usize>() + COLUMN_GAP * widths.len().saturating_sub(1);
        self.footer
            .iter()
            .map(|line| line.chars().count())
            .chain([table, self.title.chars().count()])
            .max()
            .unwrap_or(0)
    }

    /// Pixel size of the rendered image.
    pub fn dimensions(&self) -> (u32, u32) {
        let chars = self.content_chars(&self.column_widths()) as u32;
        let width = PADDING * 2 + chars * GLYPH;
        // title, gap, header, rows, gap, footer
        let rows = self.rows.len() as u32 + self.footer.len() as u32 + 2;
        let height = PADDING * 2 + rows * ROW_HEIGHT + ROW_HEIGHT;
        (width, height)
    }

    pub fn to_png(&self) -> FormatResult<Vec<u8>> {
        let widths = self.column_widths();
        let (width, height) = self.dimensions();
        let table_width = (widths.iter().sum::<usize>()
            + COLUMN_GAP * widths.len().saturating_sub(1)) as u32
            * GLYPH;
        let mut canvas = Canvas::new(width, height, BACKGROUND);
        let text_offset = (ROW_HEIGHT - GLYPH) / 2;

        let mut y = PADDING;
        canvas.draw_text(PADDING, y + text_offset, &self.title, INK);
        y += ROW_HEIGHT + ROW_HEIGHT / 2;

        canvas.fill_rect(PADDING - 6, y, table_width + 12, ROW_HEIGHT, HEADER_FILL);
        let headers: Vec<&str> = self.columns.iter().map(|(h, _)| h.as_str()).collect();
        self.draw_row(&mut canvas, &widths, &headers, y + text_offset, true);
        y += ROW_HEIGHT;

        for (i, row) in self.rows.iter().enumerate() {
            if i % 2 == 1 {
                canvas.fill_rect(PADDING - 6, y, table_width + 12, ROW_HEIGHT, STRIPE_FILL);
            }
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            self.draw_row(&mut canvas, &widths, &cells, y + text_offset, false);
            y += ROW_HEIGHT;
        }
        canvas.fill_rect(PADDING - 6, y, table_width + 12, 2, RULE);
        y += ROW_HEIGHT / 2;

        for line in &self.footer {
            canvas.draw_text(PADDING, y + text_offset, line, MUTED);
            y += ROW_HEIGHT;
        }

        canvas.encode_png()
    }

    fn draw_row(&self, canvas: &mut Canvas, widths: &[usize], cells: &[&str], y: u32, header: bool) {
        let mut x = PADDING;
        for (i, (width, (_, align))) in widths.iter().zip(&self.columns).enumerate() {
            let cell = cells.get(i).copied().unwrap_or("");
            let len = cell.chars().count();
            let cell_x = match align {
                Align::Left => x,
                Align::Right => x + width.saturating_sub(len) as u32 * GLYPH,
            };
            let color = match cell.chars().next() {
                Some('+') if i > 0 && !header => RISE,
                Some('-') if i > 0 && !header => FALL,
                _ => INK,
            };
            canvas.draw_text(cell_x, y, cell, color);
            x += (*width + COLUMN_GAP) as u32 * GLYPH;
        }
    }
}

/// RGB8 pixel buffer.
struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32, fill: Rgb) -> Self {
        let pixels = fill
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                let idx = (py as usize * self.width as usize + px as usize) * 3;
                self.pixels[idx..idx + 3].copy_from_slice(&color);
            }
        }
    }

    fn draw_text(&mut self, x: u32, y: u32, text: &str, color: Rgb) {
        for (i, ch) in text.chars().enumerate() {
            let origin = x + i as u32 * GLYPH;
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..8u32 {
                    // Bit 0 is the leftmost pixel.
                    if bits & (1 << col) != 0 {
                        self.fill_rect(origin + col * SCALE, y + row as u32 * SCALE, SCALE, SCALE, color);
                    }
                }
            }
        }
    }

    fn encode_png(&self) -> FormatResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| FormatError::Image(format!("PNG header: {e}")))?;
        writer
            .write_image_data(&self.pixels)
            .map_err(|e| FormatError::Image(format!("PNG data: {e}")))?;
        writer
            .finish()
            .map_err(|e| FormatError::Image(format!("PNG finish: {e}")))?;
        Ok(out)
    }
}

fn glyph(ch: char) -> [u8; 8] {
    let index = if ch.is_ascii() { ch as usize } else { '?' as usize };
    BASIC_LEGACY[index]
}
