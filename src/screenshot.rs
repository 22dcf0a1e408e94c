use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;

use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};

use crate::channels::{palette_bytes, ChannelSet};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::matcher::ScreenshotMatcher;

/// Display time of each frame in a saved animation, in milliseconds.
pub const FRAME_DURATION_MS: u16 = 500;

/// A static or animated screenshot, in which only some channels are known.
///
/// Animated screenshots assume every frame is displayed for the same time.
#[derive(Clone)]
pub struct Screenshot {
    frames: Vec<Frame>,
    channels: ChannelSet,
}

impl Screenshot {
    pub fn new(frames: Vec<Frame>, channels: ChannelSet) -> Result<Self> {
        let first = frames.first().ok_or(Error::EmptyScreenshot)?;
        if let Some(odd) = frames.iter().find(|f| f.size() != first.size()) {
            return Err(Error::FrameSizeMismatch {
                expected: first.size(),
                actual: odd.size(),
            });
        }
        Ok(Self { frames, channels })
    }

    pub fn from_rgb_images(images: &[RgbImage], channels: ChannelSet) -> Result<Self> {
        Self::new(images.iter().map(Frame::from_rgb).collect(), channels)
    }

    /// Loads a still or animated screenshot from a PNG file. All the channels
    /// are assumed to be valid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Self::from_png_reader(file, ChannelSet::RGBI)
    }

    pub fn from_png_bytes(bytes: &[u8], channels: ChannelSet) -> Result<Self> {
        Self::from_png_reader(Cursor::new(bytes), channels)
    }

    fn from_png_reader<R: Read>(reader: R, channels: ChannelSet) -> Result<Self> {
        let decoder = PngDecoder::new(reader)?;
        let images = if decoder.is_apng() {
            decoder
                .apng()
                .into_frames()
                .collect_frames()?
                .into_iter()
                .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8())
                .collect()
        } else {
            vec![DynamicImage::from_decoder(decoder)?.to_rgb8()]
        };
        Self::from_rgb_images(&images, channels)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::io::BufWriter::new(File::create(path)?);
        self.write_png(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_png(&mut buf)?;
        Ok(buf)
    }

    /// Writes an indexed PNG using the channel palette; more than one frame
    /// makes a looping APNG.
    fn write_png<W: Write>(&self, w: W) -> Result<()> {
        let mut encoder = png::Encoder::new(w, self.width(), self.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette_bytes());
        if self.n_frames() > 1 {
            encoder.set_animated(self.n_frames() as u32, 0)?;
            encoder.set_frame_delay(FRAME_DURATION_MS, 1000)?;
        }
        let mut writer = encoder.write_header()?;
        for frame in &self.frames {
            writer.write_image_data(frame.indices())?;
        }
        writer.finish()?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.frames[0].width()
    }

    pub fn height(&self) -> u32 {
        self.frames[0].height()
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    pub fn to_rgb_frames(&self) -> Vec<RgbImage> {
        self.frames.iter().map(Frame::to_rgb).collect()
    }

    /// Builds a matcher comparing live frames to this screenshot on `channels`
    /// only.
    pub fn create_matcher(&self, channels: ChannelSet) -> ScreenshotMatcher {
        ScreenshotMatcher::new(&self.frames, channels)
    }
}

impl fmt::Display for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Screenshot({}#{} {}x{})",
            self.channels,
            self.n_frames(),
            self.width(),
            self.height()
        )
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
