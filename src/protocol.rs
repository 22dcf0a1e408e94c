//! The line protocol spoken between test clients and the bridge.
//!
//! Requests are newline-terminated and case-sensitive:
//!
//! * `TYPE?` answers the chip variant.
//! * `SCREENSHOT?` answers two lines: the valid channels (empty when no frame
//!   has been captured yet) and the base64-encoded PNG.
//! * `R<n>?` / `ER<n>?` read a register and answer two lowercase hex digits.
//! * `R<n>=<XX>` / `ER<n>=<XX>` write a register (uppercase hex) and answer
//!   nothing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::chip::{Addressing, ChipCommand, REGISTER_COUNT};

pub const INVALID_REQUEST_REPLY: &str = "Invalid request, ignoring\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Type,
    Screenshot,
    Register(ChipCommand),
    Invalid,
}

impl Request {
    /// Parses one request line; surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Request {
        match line.trim() {
            "TYPE?" => Request::Type,
            "SCREENSHOT?" => Request::Screenshot,
            other => parse_register(other).map_or(Request::Invalid, Request::Register),
        }
    }
}

fn parse_register(text: &str) -> Option<ChipCommand> {
    let (addressing, rest) = match text.strip_prefix('E') {
        Some(rest) => (Addressing::Execute, rest),
        None => (Addressing::Direct, text),
    };
    let rest = rest.strip_prefix('R')?;
    let mut chars = rest.chars();
    let register = chars.next()?.to_digit(10)? as u8;
    if register >= REGISTER_COUNT {
        return None;
    }
    let tail = chars.as_str();
    if tail == "?" {
        return ChipCommand::read(register, addressing).ok();
    }
    let value = parse_hex_byte(tail.strip_prefix('=')?)?;
    ChipCommand::write(register, addressing, value).ok()
}

/// Exactly two uppercase hex digits.
fn parse_hex_byte(text: &str) -> Option<u8> {
    let valid = text.len() == 2
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
    if !valid {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

/// Formats a request line for `command`, as clients send it.
pub fn format_request(command: &ChipCommand) -> String {
    match *command {
        ChipCommand::Read {
            register,
            addressing,
        } => format!("{}R{}?\n", addressing.prefix(), register),
        ChipCommand::Write {
            register,
            addressing,
            value,
        } => format!("{}R{}={:02X}\n", addressing.prefix(), register, value),
    }
}

pub fn format_read_reply(value: u8) -> String {
    format!("{value:02x}\n")
}

pub fn format_screenshot_reply(tag: &str, png: &[u8]) -> String {
    format!("{}\n{}\n", tag, STANDARD.encode(png))
}

pub fn decode_screenshot_payload(line: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_queries() {
        assert_eq!(Request::parse("TYPE?\n"), Request::Type);
        assert_eq!(Request::parse("SCREENSHOT?"), Request::Screenshot);
        assert_eq!(Request::parse("type?"), Request::Invalid);
    }

    #[test]
    fn parses_register_reads() {
        assert_eq!(
            Request::parse("R3?"),
            Request::Register(ChipCommand::read(3, Addressing::Direct).unwrap())
        );
        assert_eq!(
            Request::parse("ER0?\r\n"),
            Request::Register(ChipCommand::read(0, Addressing::Execute).unwrap())
        );
    }

    #[test]
    fn parses_register_writes() {
        assert_eq!(
            Request::parse("R3=1F"),
            Request::Register(ChipCommand::write(3, Addressing::Direct, 0x1F).unwrap())
        );
        assert_eq!(
            Request::parse("ER1=A0"),
            Request::Register(ChipCommand::write(1, Addressing::Execute, 0xA0).unwrap())
        );
    }

    #[test]
    fn rejects_malformed_register_requests() {
        for line in [
            "R8?", "R?", "R3", "R3=1f", "R3=1", "R3=123", "EER0?", "ER0?x", "X0?", "R3=+1", "",
        ] {
            assert_eq!(Request::parse(line), Request::Invalid, "{line:?}");
        }
    }

    #[test]
    fn request_lines_parse_back() {
        for command in [
            ChipCommand::read(5, Addressing::Execute).unwrap(),
            ChipCommand::write(6, Addressing::Direct, 0x0C).unwrap(),
        ] {
            let line = format_request(&command);
            assert_eq!(Request::parse(&line), Request::Register(command));
        }
    }

    #[test]
    fn replies() {
        assert_eq!(format_read_reply(0x1F), "1f\n");
        assert_eq!(format_screenshot_reply("", &[]), "\n\n");
        assert_eq!(format_screenshot_reply("RGB", b"hi"), "RGB\naGk=\n");
        assert_eq!(decode_screenshot_payload("aGk=\n").unwrap(), b"hi");
    }
}
