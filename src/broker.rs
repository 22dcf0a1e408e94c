use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::sync::ShardedLock;
use crossbeam_channel::Sender;
use log::{error, info, trace};

use crate::channels::ChannelSet;
use crate::error::{Error, Result};
use crate::frame::{read_raw_frame, Frame};
use crate::screenshot::Screenshot;

/// The most recent frame received from the emulator, already encoded for
/// the `SCREENSHOT?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub channels: ChannelSet,
    pub png: Vec<u8>,
}

impl CapturedFrame {
    pub fn encode(frame: Frame, channels: ChannelSet) -> Result<Self> {
        let png = Screenshot::new(vec![frame], channels)?.encode_png()?;
        Ok(Self { channels, png })
    }

    /// Tag sent in front of the image: the valid channels.
    pub fn tag(&self) -> String {
        self.channels.to_string()
    }
}

/// Fatal conditions reported by background threads to the supervisor.
#[derive(Debug)]
pub enum BridgeEvent {
    FrameStreamEnded(Error),
    ChipLinkLost(String),
    EmulatorExited(String),
    ListenerFailed(String),
}

/// Owns the latest-frame slot. Clones share the same slot.
///
/// The slot is replaced as a whole, so readers see either the previous or the
/// new frame, never a mix.
#[derive(Clone, Default)]
pub struct ScreenshotBroker {
    latest: Arc<ShardedLock<Option<Arc<CapturedFrame>>>>,
}

impl ScreenshotBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the ingestion thread. When the stream ends or delivers a bad
    /// record the thread reports it on `events` and stops.
    pub fn spawn<R: Read + Send + 'static>(
        &self,
        mut reader: R,
        events: Sender<BridgeEvent>,
    ) -> io::Result<JoinHandle<()>> {
        let broker = self.clone();
        thread::Builder::new()
            .name("screenshot-ingest".to_string())
            .spawn(move || {
                let err = broker.ingest(&mut reader);
                error!("screenshot stream stopped: {err}");
                let _ = events.send(BridgeEvent::FrameStreamEnded(err));
            })
    }

    /// Decodes and publishes records until the stream fails, returning the
    /// failure.
    pub fn ingest<R: Read>(&self, reader: &mut R) -> Error {
        let mut count: u64 = 0;
        loop {
            match self.ingest_one(reader) {
                Ok(channels) => {
                    count += 1;
                    if count == 1 {
                        info!("first screenshot received ({channels})");
                    }
                    trace!("screenshot #{count} published ({channels})");
                }
                Err(err) => return err,
            }
        }
    }

    /// Reads, decodes and publishes a single record.
    pub fn ingest_one<R: Read>(&self, reader: &mut R) -> Result<ChannelSet> {
        let (channels, image) = read_raw_frame(reader)?;
        let captured = CapturedFrame::encode(Frame::from_rgb(&image), channels)?;
        self.publish(captured);
        Ok(channels)
    }

    pub fn publish(&self, frame: CapturedFrame) {
        let frame = Arc::new(frame);
        match self.latest.write() {
            Ok(mut slot) => *slot = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    /// Latest captured frame, or `None` before the first one arrives. Never
    /// waits for a new frame.
    pub fn latest(&self) -> Option<Arc<CapturedFrame>> {
        match self.latest.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The `(tag, png)` pair served to clients; both empty before the first
    /// frame.
    pub fn latest_image(&self) -> (String, Vec<u8>) {
        match self.latest() {
            Some(frame) => (frame.tag(), frame.png.clone()),
            None => (String::new(), Vec::new()),
        }
    }
}
