//! Text dumps and the comparison panel.
//!
//! Nothing downstream reads these artifacts, so callers treat a
//! [`ReportError`] as a warning rather than a failed run.

use std::convert::Infallible;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_7X13};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Text};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use thiserror::Error;

use crate::source::{ImageBuffer, HEIGHT, WIDTH};
use crate::verify::Comparison;

pub const TX_FILE: &str = "tx_image.txt";
pub const RX_FILE: &str = "rx_image.txt";
pub const EXPECTED_FILE: &str = "expected_image.txt";
pub const PANEL_FILE: &str = "inversion_result.png";

const CELL: u32 = 280;
const MARGIN: u32 = 20;
const TITLE_HEIGHT: u32 = 40;
const CAPTION_HEIGHT: u32 = 20;
const PANEL_WIDTH: u32 = 2 * CELL + 3 * MARGIN;
const PANEL_HEIGHT: u32 = TITLE_HEIGHT + MARGIN + 2 * (CAPTION_HEIGHT + CELL + MARGIN);

const PASS_COLOR: Rgb888 = Rgb888::new(0, 128, 0);
const FAIL_COLOR: Rgb888 = Rgb888::new(200, 0, 0);

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save {}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to launch image viewer")]
    Viewer(#[source] std::io::Error),
}

/// Formats a payload as 28 lines of space-separated decimal values.
pub fn format_grid(image: &ImageBuffer) -> String {
    let mut out = String::with_capacity(HEIGHT * WIDTH * 4);
    for row in image.rows() {
        let line: Vec<String> = row.iter().map(u8::to_string).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

pub struct Reporter {
    dir: PathBuf,
}

impl Reporter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_grid(&self, name: &str, image: &ImageBuffer) -> Result<PathBuf, ReportError> {
        let path = self.path(name);
        let write = || -> std::io::Result<()> {
            let mut file = BufWriter::new(File::create(&path)?);
            file.write_all(format_grid(image).as_bytes())?;
            file.flush()
        };
        write().map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Writes the transmitted, received and expected grids.
    pub fn write_grids(
        &self,
        sent: &ImageBuffer,
        received: &ImageBuffer,
        expected: &ImageBuffer,
    ) -> Result<Vec<PathBuf>, ReportError> {
        Ok(vec![
            self.write_grid(TX_FILE, sent)?,
            self.write_grid(RX_FILE, received)?,
            self.write_grid(EXPECTED_FILE, expected)?,
        ])
    }

    pub fn save_panel(&self, panel: &RgbImage) -> Result<PathBuf, ReportError> {
        let path = self.path(PANEL_FILE);
        panel.save(&path).map_err(|source| ReportError::Image {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }
}

/// Opens `path` in the platform's default image viewer without waiting for it.
pub fn show(path: &Path) -> Result<(), ReportError> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    command.arg(path).spawn().map_err(ReportError::Viewer)?;
    Ok(())
}

/// Renders the 2x2 comparison: original, transmitted, received, expected.
pub fn render_panel(
    original: &GrayImage,
    sent: &ImageBuffer,
    received: &ImageBuffer,
    comparison: &Comparison,
) -> RgbImage {
    let mut panel = RgbImage::from_pixel(PANEL_WIDTH, PANEL_HEIGHT, Rgb([255, 255, 255]));

    let original_caption = format!(
        "Original Image ({}x{})",
        original.width(),
        original.height()
    );
    let cells = [
        (original_caption, fit_to_cell(&stretch_contrast(original))),
        (format!("Transmitted ({}x{})", WIDTH, HEIGHT), grid_cell(sent)),
        ("Received from FPGA".to_owned(), grid_cell(received)),
        ("Expected Inverted".to_owned(), grid_cell(comparison.expected())),
    ];

    for (i, (caption, cell)) in cells.iter().enumerate() {
        let col = i as u32 % 2;
        let row = i as u32 / 2;
        let left = MARGIN + col * (CELL + MARGIN);
        let top = TITLE_HEIGHT + MARGIN + row * (CAPTION_HEIGHT + CELL + MARGIN);

        let x = left + (CELL - cell.width()) / 2;
        let y = top + CAPTION_HEIGHT + (CELL - cell.height()) / 2;
        imageops::overlay(&mut panel, cell, x as i64, y as i64);

        let caption_style = MonoTextStyle::new(&FONT_7X13, Rgb888::BLACK);
        let anchor = Point::new((left + CELL / 2) as i32, (top + CAPTION_HEIGHT - 6) as i32);
        draw_text(&mut panel, caption, anchor, caption_style);
    }

    let color = if comparison.is_match() {
        PASS_COLOR
    } else {
        FAIL_COLOR
    };
    let title_style = MonoTextStyle::new(&FONT_10X20, color);
    let anchor = Point::new((PANEL_WIDTH / 2) as i32, (TITLE_HEIGHT - 8) as i32);
    draw_text(&mut panel, &comparison.summary(), anchor, title_style);

    panel
}

fn draw_text(panel: &mut RgbImage, text: &str, anchor: Point, style: MonoTextStyle<'_, Rgb888>) {
    Text::with_alignment(text, anchor, style, Alignment::Center)
        .draw(&mut Canvas(panel))
        .unwrap_or_else(|never| match never {});
}

/// A 28x28 grid scaled up with fixed [0, 255] intensity.
fn grid_cell(image: &ImageBuffer) -> RgbImage {
    let scaled = imageops::resize(&image.to_gray_image(), CELL, CELL, FilterType::Nearest);
    DynamicImage::ImageLuma8(scaled).to_rgb8()
}

/// Scales an arbitrary image to fit inside one cell, keeping its aspect ratio.
fn fit_to_cell(image: &GrayImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = f64::min(CELL as f64 / w as f64, CELL as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, CELL);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, CELL);
    let filter = if scale >= 1.0 {
        FilterType::Nearest
    } else {
        FilterType::Lanczos3
    };
    let scaled = imageops::resize(image, new_w, new_h, filter);
    DynamicImage::ImageLuma8(scaled).to_rgb8()
}

/// Maps the image's own min..max onto 0..255.
fn stretch_contrast(image: &GrayImage) -> GrayImage {
    let (lo, hi) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    let mut out = image.clone();
    if hi > lo {
        let span = (hi - lo) as u32;
        for p in out.pixels_mut() {
            p[0] = ((p[0] - lo) as u32 * 255 / span) as u8;
        }
    }
    out
}

/// Lets `embedded-graphics` draw text onto an [`RgbImage`].
struct Canvas<'a>(&'a mut RgbImage);

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) {
                if x < width && y < height {
                    self.0.put_pixel(x, y, Rgb([color.r(), color.g(), color.b()]));
                }
            }
        }
        Ok(())
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        let (width, height) = self.0.dimensions();
        Size::new(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_pattern;
    use crate::verify::verify;

    #[test]
    fn grid_format() {
        let text = format_grid(&test_pattern());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), HEIGHT);
        assert!(lines.iter().all(|l| l.split(' ').count() == WIDTH));
        assert_eq!(lines[0], vec!["0"; WIDTH].join(" "));
        assert!(lines[5].starts_with("0 0 0 0 0 0 255 255"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn panel_layout() {
        let sent = test_pattern();
        let received = sent.complement();
        let comparison = verify(&sent, &received);
        let panel = render_panel(&sent.to_gray_image(), &sent, &received, &comparison);
        assert_eq!(panel.dimensions(), (PANEL_WIDTH, PANEL_HEIGHT));

        // Top-left of the "received" cell: complement of a black pixel.
        let left = MARGIN;
        let top = TITLE_HEIGHT + MARGIN + CAPTION_HEIGHT + CELL + MARGIN + CAPTION_HEIGHT;
        assert_eq!(panel.get_pixel(left, top), &Rgb([255, 255, 255]));
        // Top-left of the "transmitted" cell is black.
        let left = 2 * MARGIN + CELL;
        let top = TITLE_HEIGHT + MARGIN + CAPTION_HEIGHT;
        assert_eq!(panel.get_pixel(left, top), &Rgb([0, 0, 0]));
    }

    #[test]
    fn title_color_follows_verdict() {
        let sent = ImageBuffer::filled(0);
        let title_has = |panel: &RgbImage, color: Rgb888| {
            let want = Rgb([color.r(), color.g(), color.b()]);
            (0..PANEL_WIDTH).any(|x| (0..TITLE_HEIGHT).any(|y| panel.get_pixel(x, y) == &want))
        };

        let pass = verify(&sent, &ImageBuffer::filled(255));
        let panel = render_panel(&sent.to_gray_image(), &sent, &ImageBuffer::filled(255), &pass);
        assert!(title_has(&panel, PASS_COLOR));
        assert!(!title_has(&panel, FAIL_COLOR));

        let fail = verify(&sent, &sent);
        let panel = render_panel(&sent.to_gray_image(), &sent, &sent, &fail);
        assert!(title_has(&panel, FAIL_COLOR));
    }

    #[test]
    fn contrast_stretch() {
        let ramp = GrayImage::from_fn(4, 1, |x, _| image::Luma([100 + x as u8 * 10]));
        let stretched = stretch_contrast(&ramp);
        assert_eq!(stretched.as_raw(), &vec![0, 85, 170, 255]);

        let flat = GrayImage::from_pixel(3, 3, image::Luma([42]));
        assert_eq!(stretch_contrast(&flat), flat);
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        let wide = GrayImage::new(560, 140);
        assert_eq!(fit_to_cell(&wide).dimensions(), (CELL, 70));
        let tiny = GrayImage::new(28, 14);
        assert_eq!(fit_to_cell(&tiny).dimensions(), (CELL, 140));
    }
}
