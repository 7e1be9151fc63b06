use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::GrayImage;
use thiserror::Error;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;

/// Number of bytes in one image on the wire.
pub const PAYLOAD_LEN: usize = WIDTH * HEIGHT;

#[derive(Debug, Error)]
#[error("failed to load image {}: {source}", .path.display())]
pub struct LoadError {
    path: PathBuf,
    #[source]
    source: image::ImageError,
}

impl LoadError {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A 28x28 grayscale image, row-major, one byte per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pixels: [u8; PAYLOAD_LEN],
}

impl ImageBuffer {
    pub fn new(pixels: [u8; PAYLOAD_LEN]) -> Self {
        Self { pixels }
    }

    pub fn filled(value: u8) -> Self {
        Self::new([value; PAYLOAD_LEN])
    }

    /// Returns `None` unless `bytes` is exactly one payload long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let pixels = <[u8; PAYLOAD_LEN]>::try_from(bytes).ok()?;
        Some(Self::new(pixels))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * WIDTH + col]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.pixels.chunks_exact(WIDTH)
    }

    /// The response the inverter is expected to produce: `255 - x` per pixel.
    pub fn complement(&self) -> Self {
        let mut pixels = self.pixels;
        for p in pixels.iter_mut() {
            *p = u8::MAX - *p;
        }
        Self::new(pixels)
    }

    pub fn value_range(&self) -> (u8, u8) {
        self.pixels
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)))
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(WIDTH as u32, HEIGHT as u32, |x, y| {
            image::Luma([self.get(y as usize, x as usize)])
        })
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.value_range();
        f.debug_struct("ImageBuffer")
            .field("len", &PAYLOAD_LEN)
            .field("range", &(lo..=hi))
            .finish()
    }
}

/// Where the transmitted image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    TestPattern,
}

impl Source {
    pub fn from_arg(arg: Option<impl Into<PathBuf>>) -> Self {
        match arg {
            Some(path) => Self::File(path.into()),
            None => Self::TestPattern,
        }
    }
}

/// The payload plus the unresized grayscale image it was derived from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub original: GrayImage,
    pub payload: ImageBuffer,
}

pub fn load(source: &Source) -> Result<LoadedImage, LoadError> {
    match source {
        Source::File(path) => load_file(path),
        Source::TestPattern => {
            let payload = test_pattern();
            Ok(LoadedImage {
                original: payload.to_gray_image(),
                payload,
            })
        }
    }
}

fn load_file(path: &Path) -> Result<LoadedImage, LoadError> {
    let original = image::open(path)
        .map_err(|source| LoadError {
            path: path.to_owned(),
            source,
        })?
        .to_luma8();
    let payload = downsample(&original);

    let (lo, hi) = payload.value_range();
    log::info!("loaded image: {}", path.display());
    log::info!(
        "original size: {}x{}, resized to {}x{}, value range [{}, {}]",
        original.width(),
        original.height(),
        WIDTH,
        HEIGHT,
        lo,
        hi
    );

    Ok(LoadedImage { original, payload })
}

/// Resamples an arbitrary grayscale image to the payload dimensions.
pub fn downsample(original: &GrayImage) -> ImageBuffer {
    let resized = image::imageops::resize(
        original,
        WIDTH as u32,
        HEIGHT as u32,
        FilterType::Lanczos3,
    );
    let mut pixels = [0u8; PAYLOAD_LEN];
    pixels.copy_from_slice(resized.as_raw());
    ImageBuffer::new(pixels)
}

/// A white letter "C" on black, used when no image is supplied.
pub fn test_pattern() -> ImageBuffer {
    // (rows, cols), half-open
    const STROKES: [((usize, usize), (usize, usize)); 3] = [
        ((5, 23), (6, 12)),  // left bar
        ((5, 11), (6, 18)),  // top bar
        ((17, 23), (6, 18)), // bottom bar
    ];

    let mut pixels = [0u8; PAYLOAD_LEN];
    for ((row_start, row_end), (col_start, col_end)) in STROKES {
        for row in row_start..row_end {
            pixels[row * WIDTH + col_start..row * WIDTH + col_end].fill(u8::MAX);
        }
    }
    ImageBuffer::new(pixels)
}
