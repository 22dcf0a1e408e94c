use std::io::{self, Read, Write};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Number of registers per addressing bank.
pub const REGISTER_COUNT: u8 = 8;

const READ_BASE: u8 = 0x10;
const WRITE_BASE: u8 = 0x20;
const EXECUTE_OFFSET: u8 = 0x08;

/// Register addressing mode. `Execute` accesses also trigger the chip's
/// command execution logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addressing {
    Direct,
    Execute,
}

impl Addressing {
    fn offset(self) -> u8 {
        match self {
            Addressing::Direct => 0,
            Addressing::Execute => EXECUTE_OFFSET,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Addressing::Direct => "",
            Addressing::Execute => "E",
        }
    }
}

/// A single register transaction on the chip byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipCommand {
    Read {
        register: u8,
        addressing: Addressing,
    },
    Write {
        register: u8,
        addressing: Addressing,
        value: u8,
    },
}

impl ChipCommand {
    pub fn read(register: u8, addressing: Addressing) -> Result<Self> {
        check_register(register)?;
        Ok(ChipCommand::Read {
            register,
            addressing,
        })
    }

    pub fn write(register: u8, addressing: Addressing, value: u8) -> Result<Self> {
        check_register(register)?;
        Ok(ChipCommand::Write {
            register,
            addressing,
            value,
        })
    }

    /// Wire bytes: `0x10|0x18 + reg` for reads, `0x20|0x28 + reg, value` for
    /// writes.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ChipCommand::Read {
                register,
                addressing,
            } => vec![READ_BASE + addressing.offset() + register],
            ChipCommand::Write {
                register,
                addressing,
                value,
            } => vec![WRITE_BASE + addressing.offset() + register, value],
        }
    }

    pub fn expects_reply(&self) -> bool {
        matches!(self, ChipCommand::Read { .. })
    }
}

fn check_register(register: u8) -> Result<()> {
    if register < REGISTER_COUNT {
        Ok(())
    } else {
        Err(Error::BadRegister(register))
    }
}

/// The byte stream connected to the chip.
pub trait ChipPort: Send {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Blocks until the chip sends one byte.
    fn receive(&mut self) -> io::Result<u8>;
}

/// A chip port over any bidirectional stream, usually the emulator's serial
/// TCP connection.
pub struct StreamPort<S> {
    stream: S,
}

impl<S: Read + Write + Send> StreamPort<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Discards incoming bytes up to and including `marker`, which the
    /// firmware sends once it is ready to take commands.
    pub fn wait_for(&mut self, marker: u8) -> io::Result<()> {
        loop {
            if self.receive()? == marker {
                return Ok(());
            }
        }
    }
}

impl<S: Read + Write + Send> ChipPort for StreamPort<S> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn receive(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte)?;
        Ok(byte[0])
    }
}

/// An in-memory chip whose registers simply hold the last value written, with
/// separate direct and execute banks.
#[derive(Debug, Default)]
pub struct EmulatedChip {
    direct: [u8; REGISTER_COUNT as usize],
    execute: [u8; REGISTER_COUNT as usize],
    pending_write: Option<u8>,
    replies: Vec<u8>,
}

impl EmulatedChip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, register: u8, addressing: Addressing) -> u8 {
        match addressing {
            Addressing::Direct => self.direct[register as usize],
            Addressing::Execute => self.execute[register as usize],
        }
    }

    fn bank_mut(&mut self, command: u8) -> &mut [u8; REGISTER_COUNT as usize] {
        if command & EXECUTE_OFFSET != 0 {
            &mut self.execute
        } else {
            &mut self.direct
        }
    }

    fn accept(&mut self, byte: u8) -> io::Result<()> {
        if let Some(command) = self.pending_write.take() {
            let register = (command & 0x07) as usize;
            self.bank_mut(command)[register] = byte;
            return Ok(());
        }
        match byte & 0xF0 {
            READ_BASE => {
                let register = (byte & 0x07) as usize;
                let value = self.bank_mut(byte)[register];
                self.replies.push(value);
            }
            WRITE_BASE => self.pending_write = Some(byte),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown command byte {byte:#04x}"),
                ))
            }
        }
        Ok(())
    }
}

impl ChipPort for EmulatedChip {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        bytes.iter().try_for_each(|&b| self.accept(b))
    }

    fn receive(&mut self) -> io::Result<u8> {
        if self.replies.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "no reply pending",
            ));
        }
        Ok(self.replies.remove(0))
    }
}

/// Serializes register transactions from any number of clients onto one chip
/// port. A transaction holds the lock from the command write until its reply
/// byte (if any) has been read.
pub struct ChipBus {
    port: Mutex<Box<dyn ChipPort>>,
}

impl ChipBus {
    pub fn new<P: ChipPort + 'static>(port: P) -> Self {
        Self {
            port: Mutex::new(Box::new(port)),
        }
    }

    /// Runs one transaction, returning the reply byte for reads. Any failure
    /// means the chip can no longer be driven.
    pub fn transact(&self, command: ChipCommand) -> Result<Option<u8>> {
        let mut port = self
            .port
            .lock()
            .map_err(|_| Error::ChipLinkLost("transaction lock poisoned".to_string()))?;

        #[cfg(feature = "debug_logs")]
        log::trace!("chip <- {:02x?}", command.encode());

        port.send(&command.encode())
            .map_err(|e| Error::ChipLinkLost(e.to_string()))?;
        if !command.expects_reply() {
            return Ok(None);
        }
        let reply = port
            .receive()
            .map_err(|e| Error::ChipLinkLost(e.to_string()))?;

        #[cfg(feature = "debug_logs")]
        log::trace!("chip -> {reply:02x}");

        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_encoding() {
        let read = ChipCommand::read(3, Addressing::Direct).unwrap();
        assert_eq!(read.encode(), vec![0x13]);
        let exec_read = ChipCommand::read(0, Addressing::Execute).unwrap();
        assert_eq!(exec_read.encode(), vec![0x18]);
        let write = ChipCommand::write(7, Addressing::Direct, 0xAB).unwrap();
        assert_eq!(write.encode(), vec![0x27, 0xAB]);
        let exec_write = ChipCommand::write(1, Addressing::Execute, 0x41).unwrap();
        assert_eq!(exec_write.encode(), vec![0x29, 0x41]);
        assert!(read.expects_reply());
        assert!(!write.expects_reply());
    }

    #[test]
    fn register_index_is_bounded() {
        assert!(matches!(
            ChipCommand::read(8, Addressing::Direct),
            Err(Error::BadRegister(8))
        ));
    }

    #[test]
    fn emulated_chip_keeps_banks_apart() {
        let bus = ChipBus::new(EmulatedChip::new());
        bus.transact(ChipCommand::write(2, Addressing::Direct, 0x55).unwrap())
            .unwrap();
        bus.transact(ChipCommand::write(2, Addressing::Execute, 0x99).unwrap())
            .unwrap();
        let direct = bus
            .transact(ChipCommand::read(2, Addressing::Direct).unwrap())
            .unwrap();
        let execute = bus
            .transact(ChipCommand::read(2, Addressing::Execute).unwrap())
            .unwrap();
        assert_eq!(direct, Some(0x55));
        assert_eq!(execute, Some(0x99));
    }

    #[test]
    fn stream_port_waits_for_ready_marker() {
        let stream = std::io::Cursor::new(b"boot...!\x42".to_vec());
        let mut port = StreamPort::new(stream);
        port.wait_for(b'!').unwrap();
        assert_eq!(port.receive().unwrap(), 0x42);
    }

    #[test]
    fn failed_reply_is_a_lost_link() {
        struct Deaf;
        impl ChipPort for Deaf {
            fn send(&mut self, _bytes: &[u8]) -> io::Result<()> {
                Ok(())
            }
            fn receive(&mut self) -> io::Result<u8> {
                Err(io::ErrorKind::UnexpectedEof.into())
            }
        }
        let bus = ChipBus::new(Deaf);
        let err = bus
            .transact(ChipCommand::read(0, Addressing::Direct).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::ChipLinkLost(_)));
    }
}
