//! # Pixels Module
//!
//! Read-only pixel containers for slides and tiles.
//!
//! A [`PixelArray`] stores samples row-major as `u16` (8-bit sources are
//! widened) together with an explicit [`ChannelLayout`] tag determined once at
//! load time. Nothing mutates an array in place: cropping, downsampling and
//! extraction all produce new arrays.

mod loader;

pub use loader::{ImageSlideLoader, SlideLoader};

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Luminance weights applied to the first three channels
pub const LUMINANCE_WEIGHTS: [f64; 3] = [0.2989, 0.5870, 0.1140];

/// Channel layout of a pixel array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Single intensity channel, shape `(H, W)`
    Grayscale,
    /// Interleaved channels, shape `(H, W, C)`
    MultiChannel(usize),
}

impl ChannelLayout {
    /// Number of samples per pixel
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Grayscale => 1,
            ChannelLayout::MultiChannel(count) => *count,
        }
    }
}

/// Bit depth of the source the samples were decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Largest representable sample value
    pub fn max_value(&self) -> u16 {
        match self {
            BitDepth::Eight => u8::MAX as u16,
            BitDepth::Sixteen => u16::MAX,
        }
    }
}

/// Row-major image samples with an explicit channel layout
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    height: usize,
    width: usize,
    layout: ChannelLayout,
    depth: BitDepth,
    data: Vec<u16>,
}

impl PixelArray {
    /// Create an array, checking the buffer length against the shape
    pub fn new(
        height: usize,
        width: usize,
        layout: ChannelLayout,
        depth: BitDepth,
        data: Vec<u16>,
    ) -> Result<Self, LoadError> {
        let channels = layout.channels();
        if data.len() != height * width * channels {
            return Err(LoadError::ShapeMismatch {
                height,
                width,
                channels,
                actual: data.len(),
            });
        }

        Ok(Self {
            height,
            width,
            layout,
            depth,
            data,
        })
    }

    /// Build an 8-bit grayscale array from a per-pixel function of `(y, x)`
    pub fn gray_from_fn(height: usize, width: usize, f: impl Fn(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(height * width);
        for y in 0..height {
            for x in 0..width {
                data.push(u16::from(f(y, x)));
            }
        }
        Self {
            height,
            width,
            layout: ChannelLayout::Grayscale,
            depth: BitDepth::Eight,
            data,
        }
    }

    /// Build an 8-bit RGB array from a per-pixel function of `(y, x)`
    pub fn rgb_from_fn(height: usize, width: usize, f: impl Fn(usize, usize) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(height * width * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend(f(y, x).iter().map(|&v| u16::from(v)));
            }
        }
        Self {
            height,
            width,
            layout: ChannelLayout::MultiChannel(3),
            depth: BitDepth::Eight,
            data,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// Raw row-major samples
    pub fn samples(&self) -> &[u16] {
        &self.data
    }

    /// Shape as `(height, width, channels)`
    pub fn shape(&self) -> Shape {
        Shape {
            height: self.height,
            width: self.width,
            layout: self.layout,
        }
    }

    /// Sample at row `y`, column `x`, channel `c`
    pub fn sample(&self, y: usize, x: usize, c: usize) -> u16 {
        self.data[(y * self.width + x) * self.channels() + c]
    }

    /// Copy a rectangular region. Callers guarantee it is in bounds.
    pub(crate) fn region(&self, x: usize, y: usize, width: usize, height: usize) -> PixelArray {
        let channels = self.channels();
        let row_len = width * channels;
        let mut data = Vec::with_capacity(height * row_len);

        for row in y..y + height {
            let start = (row * self.width + x) * channels;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        PixelArray {
            height,
            width,
            layout: self.layout,
            depth: self.depth,
            data,
        }
    }

    /// Keep the top-left `height x width` corner (clamped to the current extent)
    pub fn clip(&self, height: usize, width: usize) -> PixelArray {
        let height = height.min(self.height);
        let width = width.min(self.width);
        if height == self.height && width == self.width {
            return self.clone();
        }
        self.region(0, 0, width, height)
    }

    /// Stride-subsample both axes, keeping every `factor`-th row and column
    pub fn downsample(&self, factor: usize) -> Result<PixelArray, LoadError> {
        if factor == 0 {
            return Err(LoadError::InvalidDownsample);
        }
        if factor == 1 {
            return Ok(self.clone());
        }

        let channels = self.channels();
        let height = self.height.div_ceil(factor);
        let width = self.width.div_ceil(factor);
        let mut data = Vec::with_capacity(height * width * channels);

        for y in (0..self.height).step_by(factor) {
            for x in (0..self.width).step_by(factor) {
                let start = (y * self.width + x) * channels;
                data.extend_from_slice(&self.data[start..start + channels]);
            }
        }

        Ok(PixelArray {
            height,
            width,
            layout: self.layout,
            depth: self.depth,
            data,
        })
    }

    /// Reduce to a single intensity channel.
    ///
    /// Three or more channels use the luminance weights on the first three;
    /// a two-channel array keeps its first channel.
    pub fn intensity(&self) -> Vec<f64> {
        match self.layout {
            ChannelLayout::Grayscale => self.data.iter().map(|&v| f64::from(v)).collect(),
            ChannelLayout::MultiChannel(channels) if channels >= 3 => self
                .data
                .chunks_exact(channels)
                .map(|px| {
                    LUMINANCE_WEIGHTS[0] * f64::from(px[0])
                        + LUMINANCE_WEIGHTS[1] * f64::from(px[1])
                        + LUMINANCE_WEIGHTS[2] * f64::from(px[2])
                })
                .collect(),
            ChannelLayout::MultiChannel(channels) => self
                .data
                .chunks_exact(channels.max(1))
                .map(|px| f64::from(px[0]))
                .collect(),
        }
    }
}

/// Shape of a pixel array, displayed numpy-style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub layout: ChannelLayout,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            ChannelLayout::Grayscale => write!(f, "({}, {})", self.height, self.width),
            ChannelLayout::MultiChannel(c) => write!(f, "({}, {}, {})", self.height, self.width, c),
        }
    }
}

/// Extents of two co-registered images that disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMismatch {
    pub reference: (usize, usize),
    pub marker: (usize, usize),
    pub common: (usize, usize),
}

/// Two arrays clipped to their common extent
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub reference: PixelArray,
    pub marker: PixelArray,
    /// Present when the inputs had different extents and were clipped
    pub mismatch: Option<DimensionMismatch>,
}

/// Clip both arrays to their common minimum extent.
///
/// Differing extents are not an error: both sides are cropped from the
/// top-left corner and the mismatch is reported alongside the result.
pub fn align_extents(reference: &PixelArray, marker: &PixelArray) -> AlignedPair {
    let height = reference.height().min(marker.height());
    let width = reference.width().min(marker.width());

    let mismatch = if (reference.height(), reference.width()) != (marker.height(), marker.width())
    {
        let mismatch = DimensionMismatch {
            reference: (reference.height(), reference.width()),
            marker: (marker.height(), marker.width()),
            common: (height, width),
        };
        tracing::warn!(
            reference = ?mismatch.reference,
            marker = ?mismatch.marker,
            "Slides have different dimensions; clipping both to {}x{}",
            height,
            width
        );
        Some(mismatch)
    } else {
        None
    };

    AlignedPair {
        reference: reference.clip(height, width),
        marker: marker.clip(height, width),
        mismatch,
    }
}
