use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::broker::{BridgeEvent, ScreenshotBroker};
use crate::chip::ChipBus;
use crate::error::Result;
use crate::models::VideoChipType;
use crate::protocol::{format_read_reply, format_screenshot_reply, Request, INVALID_REQUEST_REPLY};

/// Serves the line protocol to test clients, one thread per connection.
///
/// Register transactions go through the shared [`ChipBus`] lock; `TYPE?` and
/// `SCREENSHOT?` never touch it.
#[derive(Clone)]
pub struct BridgeServer {
    chip_type: VideoChipType,
    bus: Arc<ChipBus>,
    broker: ScreenshotBroker,
    events: Sender<BridgeEvent>,
}

impl BridgeServer {
    pub fn new(
        chip_type: VideoChipType,
        bus: ChipBus,
        broker: ScreenshotBroker,
        events: Sender<BridgeEvent>,
    ) -> Self {
        Self {
            chip_type,
            bus: Arc::new(bus),
            broker,
            events,
        }
    }

    /// Accepts clients forever.
    pub fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!("serving clients on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    self.spawn_client(stream)?;
                }
                Err(e) => warn!("failed to accept client: {e}"),
            }
        }
        Ok(())
    }

    /// Runs [`BridgeServer::serve`] on a background thread.
    pub fn spawn(&self, listener: TcpListener) -> io::Result<JoinHandle<()>> {
        let server = self.clone();
        thread::Builder::new()
            .name("bridge-accept".to_string())
            .spawn(move || {
                if let Err(e) = server.serve(listener) {
                    server.listener_failed(e);
                }
            })
    }

    /// Without a listener no client can reach the chip anymore.
    fn listener_failed(&self, err: io::Error) {
        error!("client listener failed: {err}");
        let _ = self
            .events
            .send(BridgeEvent::ListenerFailed(err.to_string()));
    }

    fn spawn_client(&self, stream: TcpStream) -> io::Result<JoinHandle<()>> {
        let server = self.clone();
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        thread::Builder::new()
            .name(format!("client-{peer}"))
            .spawn(move || {
                debug!("client {peer} connected");
                match server.handle_client(stream) {
                    Ok(()) => debug!("client {peer} disconnected"),
                    Err(e) => warn!("client {peer} dropped: {e}"),
                }
            })
    }

    /// Answers requests line by line until the client hangs up.
    pub fn handle_client(&self, stream: TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            let response = self.respond(&String::from_utf8_lossy(&line))?;
            if !response.is_empty() {
                writer.write_all(response.as_bytes())?;
                writer.flush()?;
            }
        }
    }

    /// Executes one request line and returns the reply text, possibly empty.
    /// An error means the chip can no longer be driven.
    pub fn respond(&self, line: &str) -> Result<String> {
        let response = match Request::parse(line) {
            Request::Type => format!("{}\n", self.chip_type),
            Request::Screenshot => {
                let (tag, png) = self.broker.latest_image();
                format_screenshot_reply(&tag, &png)
            }
            Request::Register(command) => match self.bus.transact(command) {
                Ok(Some(value)) => format_read_reply(value),
                Ok(None) => String::new(),
                Err(e) => {
                    error!("register transaction failed: {e}");
                    let _ = self.events.send(BridgeEvent::ChipLinkLost(e.to_string()));
                    return Err(e);
                }
            },
            Request::Invalid => {
                warn!("invalid request {:?}", line.trim());
                INVALID_REQUEST_REPLY.to_string()
            }
        };
        Ok(response)
    }
}
