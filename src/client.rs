use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::channels::ChannelSet;
use crate::chip::{Addressing, ChipCommand};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::models::VideoChipType;
use crate::protocol::{decode_screenshot_payload, format_request};
use crate::screenshot::Screenshot;

/// Busy flag in the direct R0 status register.
pub const STATUS_BUSY: u8 = 0x80;

/// How live screenshots are sampled while waiting for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: usize,
    /// Delay before the first sample.
    pub settle: Duration,
    /// Delay between later samples.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            settle: Duration::from_millis(1000),
            interval: Duration::from_millis(100),
        }
    }
}

/// Everything captured during a verification that never matched.
#[derive(Debug)]
pub struct VerificationFailure {
    pub reference: String,
    pub channels: ChannelSet,
    pub captured: Vec<Screenshot>,
}

impl VerificationFailure {
    /// Saves the captured frames as one animation for inspection.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let frames: Vec<Frame> = self
            .captured
            .iter()
            .flat_map(|s| s.frames().iter().cloned())
            .collect();
        let channels = self
            .captured
            .iter()
            .fold(ChannelSet::RGBI, |acc, s| acc & s.channels());
        Screenshot::new(frames, channels)?.save(path)
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} not matched on channels {} after {} captures",
            self.reference,
            self.channels,
            self.captured.len()
        )
    }
}

/// Samples live screenshots through `capture` until `reference` has been
/// seen in full on `channels`, or the poll budget runs out.
///
/// `capture` returns `None` while no frame is available yet.
pub fn verify_screenshots<F>(
    reference: &Screenshot,
    channels: ChannelSet,
    policy: PollPolicy,
    mut capture: F,
) -> Result<()>
where
    F: FnMut() -> Result<Option<Screenshot>>,
{
    let mut matcher = reference.create_matcher(channels);
    let mut captured = Vec::new();
    for attempt in 0..policy.attempts {
        let delay = if attempt == 0 {
            policy.settle
        } else {
            policy.interval
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let Some(live) = capture()? else {
            continue;
        };
        for frame in live.frames() {
            if matcher.advance(frame, live.channels())? {
                debug!("{reference} matched after {} captures", attempt + 1);
                return Ok(());
            }
        }
        captured.push(live);
    }
    Err(Error::ScreenshotMismatch(Box::new(VerificationFailure {
        reference: reference.to_string(),
        channels,
        captured,
    })))
}

/// Client side of the bridge line protocol.
pub struct VideoChip {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl VideoChip {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub fn chip_type(&mut self) -> Result<VideoChipType> {
        self.send("TYPE?\n")?;
        self.read_line()?.parse()
    }

    pub fn read_register(&mut self, register: u8, addressing: Addressing) -> Result<u8> {
        let command = ChipCommand::read(register, addressing)?;
        self.send(&format_request(&command))?;
        let reply = self.read_line()?;
        u8::from_str_radix(reply.trim(), 16).map_err(|_| Error::BadReply(reply))
    }

    pub fn write_register(&mut self, register: u8, value: u8, addressing: Addressing) -> Result<()> {
        let command = ChipCommand::write(register, addressing, value)?;
        self.send(&format_request(&command))
    }

    /// Polls R0 until the busy flag clears.
    pub fn wait_not_busy(&mut self) -> Result<()> {
        while self.read_register(0, Addressing::Direct)? & STATUS_BUSY != 0 {}
        Ok(())
    }

    /// Latest frame captured by the bridge, `None` if none arrived yet.
    pub fn screenshot(&mut self) -> Result<Option<Screenshot>> {
        self.send("SCREENSHOT?\n")?;
        let tag = self.read_line()?;
        let payload = self.read_line()?;
        if tag.is_empty() {
            return Ok(None);
        }
        let channels: ChannelSet = tag.parse()?;
        let png = decode_screenshot_payload(&payload)?;
        Ok(Some(Screenshot::from_png_bytes(&png, channels)?))
    }

    pub fn expect_screenshot(&mut self, reference: &Screenshot, channels: ChannelSet) -> Result<()> {
        self.expect_screenshot_with(reference, channels, PollPolicy::default())
    }

    pub fn expect_screenshot_with(
        &mut self,
        reference: &Screenshot,
        channels: ChannelSet,
        policy: PollPolicy,
    ) -> Result<()> {
        verify_screenshots(reference, channels, policy, || self.screenshot())
    }
}
