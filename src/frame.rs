use std::fmt;
use std::io::Read;

use image::{Rgb, RgbImage};

use crate::channels::{nearest_index, ChannelSet, PALETTE};
use crate::error::{Error, Result};

/// Size of the record header on the raw frame side channel:
/// channel count (u8), width (u16 LE), height (u16 LE).
pub const RAW_HEADER_LEN: usize = 5;

/// Pixels kept around the active display area after cropping.
pub const CROP_MARGIN: u32 = 2;

/// Raw emulator frame sizes with the `(left, top, right, bottom)` bounds of
/// their active display area.
const KNOWN_DISPLAY_AREAS: [((u32, u32), (u32, u32, u32, u32)); 2] = [
    ((334, 278), (6, 10, 326, 260)),
    ((490, 278), (4, 10, 484, 260)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrameHeader {
    pub channels: ChannelSet,
    pub width: u16,
    pub height: u16,
}

impl RawFrameHeader {
    pub fn parse(bytes: &[u8; RAW_HEADER_LEN]) -> Result<Self> {
        Ok(Self {
            channels: ChannelSet::from_raw_count(bytes[0])?,
            width: u16::from_le_bytes([bytes[1], bytes[2]]),
            height: u16::from_le_bytes([bytes[3], bytes[4]]),
        })
    }

    /// Number of BGRA pixel bytes following the header.
    pub fn data_len(&self) -> usize {
        4 * self.width as usize * self.height as usize
    }
}

/// Reads one raw frame record, returning the advertised channels and the
/// cropped RGB picture.
pub fn read_raw_frame<R: Read>(reader: &mut R) -> Result<(ChannelSet, RgbImage)> {
    let mut header = [0u8; RAW_HEADER_LEN];
    reader.read_exact(&mut header)?;
    let header = RawFrameHeader::parse(&header)?;
    // Reject unknown sizes before reading (or allocating) the pixel data.
    let rect = crop_rect(header.width.into(), header.height.into())?;

    let mut data = vec![0u8; header.data_len()];
    reader.read_exact(&mut data)?;

    let full = decode_bgra(header.width.into(), header.height.into(), &data)?;
    Ok((header.channels, crop_to(&full, rect)))
}

/// Converts packed BGRA bytes to an RGB image, dropping alpha.
pub fn decode_bgra(width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    let expected = 4 * width as usize * height as usize;
    if data.len() != expected {
        return Err(Error::FrameDataLength {
            expected,
            actual: data.len(),
        });
    }
    let mut image = RgbImage::new(width, height);
    for (pixel, bgra) in image.pixels_mut().zip(data.chunks_exact(4)) {
        *pixel = Rgb([bgra[2], bgra[1], bgra[0]]);
    }
    Ok(image)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop rectangle for a raw frame of the given size. Sizes without a known
/// display area are rejected instead of guessed.
pub fn crop_rect(width: u32, height: u32) -> Result<CropRect> {
    let (_, (left, top, right, bottom)) = KNOWN_DISPLAY_AREAS
        .iter()
        .find(|(size, _)| *size == (width, height))
        .ok_or(Error::UnknownFrameSize { width, height })?;
    Ok(CropRect {
        x: left - CROP_MARGIN,
        y: top - CROP_MARGIN,
        width: right - left + 2 * CROP_MARGIN,
        height: bottom - top + 2 * CROP_MARGIN,
    })
}

/// Strips the device border, leaving [`CROP_MARGIN`] pixels on each side.
fn crop_to(image: &RgbImage, rect: CropRect) -> RgbImage {
    image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// A picture quantized to [`PALETTE`]: every pixel holds the channel set it
/// shows, so masking a channel out is a bitwise AND.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, indices: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if indices.len() != expected {
            return Err(Error::FrameDataLength {
                expected,
                actual: indices.len(),
            });
        }
        Ok(Self {
            width,
            height,
            indices: indices.into_iter().map(|i| i & 0x0F).collect(),
        })
    }

    /// Quantizes an RGB picture without dithering.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let mut last: Option<([u8; 3], u8)> = None;
        let indices = image
            .pixels()
            .map(|pixel| {
                // Consecutive pixels usually share a color.
                match last {
                    Some((rgb, index)) if rgb == pixel.0 => index,
                    _ => {
                        let index = nearest_index(pixel.0);
                        last = Some((pixel.0, index));
                        index
                    }
                }
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            indices,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    pub fn channels_at(&self, x: u32, y: u32) -> ChannelSet {
        ChannelSet::from_index(self.indices[(y * self.width + x) as usize])
    }

    /// A copy keeping only the channels in `mask`.
    pub fn masked(&self, mask: ChannelSet) -> Frame {
        let bits = mask.bits();
        Frame {
            width: self.width,
            height: self.height,
            indices: self.indices.iter().map(|i| i & bits).collect(),
        }
    }

    /// Pixel-wise equality restricted to `mask`. Frames of different sizes
    /// never compare equal.
    pub fn equals_masked(&self, other: &Frame, mask: ChannelSet) -> bool {
        let bits = mask.bits();
        self.size() == other.size()
            && self
                .indices
                .iter()
                .zip(other.indices.iter())
                .all(|(a, b)| a & bits == b & bits)
    }

    /// Expands palette indices back to RGB.
    pub fn to_rgb(&self) -> RgbImage {
        let mut image = RgbImage::new(self.width, self.height);
        for (pixel, &index) in image.pixels_mut().zip(self.indices.iter()) {
            *pixel = Rgb(PALETTE[index as usize]);
        }
        image
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({}x{})", self.width, self.height)
    }
}
