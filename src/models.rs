// src/models.rs

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The two video chip variants sharing the register-level protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(clippy::upper_case_acronyms)]
pub enum VideoChipType {
    EF9345,
    #[default]
    TS9347,
}

impl VideoChipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoChipType::EF9345 => "EF9345",
            VideoChipType::TS9347 => "TS9347",
        }
    }
}

impl fmt::Display for VideoChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoChipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EF9345" => Ok(VideoChipType::EF9345),
            "TS9347" => Ok(VideoChipType::TS9347),
            other => Err(Error::UnknownChipType(other.to_string())),
        }
    }
}
