use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{select, Sender};
use log::{error, info};

use chipbridge::broker::{BridgeEvent, ScreenshotBroker};
use chipbridge::chip::{ChipBus, StreamPort};
use chipbridge::config::{BridgeConfig, READY_MARKER, SCREENSHOT_PORT_ENV, SERIAL_PORT_ENV};
use chipbridge::server::BridgeServer;

type ChipStream = StreamPort<TcpStream>;

fn main() -> Result<()> {
    env_logger::init();
    let config = BridgeConfig::parse();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    // The emulator connects to these two before the firmware starts running.
    let serial_listener = TcpListener::bind(("127.0.0.1", config.serial_port))
        .context("failed to bind the serial port listener")?;
    let screenshot_listener = TcpListener::bind(("127.0.0.1", config.screenshot_port))
        .context("failed to bind the screenshot port listener")?;
    let serial_port = serial_listener.local_addr()?.port();
    let screenshot_port = screenshot_listener.local_addr()?.port();
    info!("waiting for the emulator: serial on port {serial_port}, screenshots on port {screenshot_port}");

    if !config.emulator.is_empty() {
        spawn_emulator(&config.emulator, serial_port, screenshot_port, events_tx.clone())?;
    }

    let broker = ScreenshotBroker::new();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    {
        let broker = broker.clone();
        let events = events_tx.clone();
        let wait_ready = !config.no_ready_wait;
        thread::Builder::new()
            .name("emulator-connect".to_string())
            .spawn(move || {
                let result = connect_emulator(
                    serial_listener,
                    screenshot_listener,
                    &broker,
                    events,
                    wait_ready,
                );
                let _ = ready_tx.send(result);
            })?;
    }

    // The emulator may die before it ever connects.
    let port = select! {
        recv(ready_rx) -> result => result.context("emulator connection thread died")??,
        recv(events_rx) -> event => bail!("emulator never became ready: {:?}", event?),
    };

    let listener = TcpListener::bind(&config.listen)
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    let server = BridgeServer::new(config.chip_type, ChipBus::new(port), broker, events_tx);
    server.spawn(listener)?;

    // Nothing can be done once the chip or the emulator is gone.
    let event = events_rx.recv()?;
    error!("shutting down: {event:?}");
    match event {
        BridgeEvent::ChipLinkLost(reason) => bail!("chip byte stream lost: {reason}"),
        BridgeEvent::FrameStreamEnded(err) => bail!("screenshot stream ended: {err}"),
        BridgeEvent::EmulatorExited(status) => bail!("emulator stopped ({status})"),
        BridgeEvent::ListenerFailed(reason) => bail!("client listener failed: {reason}"),
    }
}

/// Accepts exactly one connection on each emulator listener, starts the
/// screenshot broker and optionally waits for the firmware to be ready.
fn connect_emulator(
    serial_listener: TcpListener,
    screenshot_listener: TcpListener,
    broker: &ScreenshotBroker,
    events: Sender<BridgeEvent>,
    wait_ready: bool,
) -> Result<ChipStream> {
    let (serial, peer) = serial_listener.accept()?;
    info!("serial stream connected from {peer}");
    let (screenshots, peer) = screenshot_listener.accept()?;
    info!("screenshot stream connected from {peer}");
    drop(serial_listener);
    drop(screenshot_listener);

    broker.spawn(screenshots, events)?;

    serial.set_nodelay(true)?;
    let mut port = StreamPort::new(serial);
    if wait_ready {
        info!("waiting for the firmware to signal readiness");
        port.wait_for(READY_MARKER)
            .context("serial stream closed before the firmware was ready")?;
    }
    Ok(port)
}

fn spawn_emulator(
    command: &[String],
    serial_port: u16,
    screenshot_port: u16,
    events: Sender<BridgeEvent>,
) -> Result<()> {
    let (program, args) = command.split_first().context("empty emulator command")?;
    let mut child = Command::new(program)
        .args(args)
        .env(SERIAL_PORT_ENV, serial_port.to_string())
        .env(SCREENSHOT_PORT_ENV, screenshot_port.to_string())
        .spawn()
        .with_context(|| format!("failed to start emulator {program:?}"))?;
    info!("emulator started (pid {})", child.id());

    thread::Builder::new()
        .name("emulator-watch".to_string())
        .spawn(move || {
            let status = match child.wait() {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };
            let _ = events.send(BridgeEvent::EmulatorExited(status));
        })?;
    Ok(())
}
