use std::fmt;
use std::str::FromStr;

use crate::error::Error;

bitflags::bitflags! {
    /// A set of channels among R (red), G (green), B (blue) and I (insert).
    ///
    /// The bit layout is `0bRGBI`, which is also the index of the matching
    /// color in [`PALETTE`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ChannelSet: u8 {
        const I = 0b0001;
        const B = 0b0010;
        const G = 0b0100;
        const R = 0b1000;
        const RGB = 0b1110;
        const RGBI = 0b1111;
    }
}

impl ChannelSet {
    pub const NONE: ChannelSet = ChannelSet::empty();

    /// Maps any palette index (or raw 4-bit value) to its channel set.
    pub const fn from_index(index: u8) -> Self {
        Self::from_bits_truncate(index)
    }

    /// Channels advertised by a raw frame header carrying `count` channels.
    pub fn from_raw_count(count: u8) -> Result<Self, Error> {
        match count {
            3 => Ok(Self::RGB),
            4 => Ok(Self::RGBI),
            other => Err(Error::BadChannelCount(other)),
        }
    }

    pub fn name(&self) -> String {
        if self.is_empty() {
            return "NONE".to_string();
        }
        [(Self::R, 'R'), (Self::G, 'G'), (Self::B, 'B'), (Self::I, 'I')]
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, letter)| *letter)
            .collect()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ChannelSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "NONE" {
            return Ok(Self::NONE);
        }
        if s.is_empty() {
            return Err(Error::BadChannelName(s.to_string()));
        }
        // Letters must appear in canonical RGBI order, each at most once.
        let mut set = Self::NONE;
        let mut last = 0usize;
        for letter in s.chars() {
            let (rank, flag) = match letter {
                'R' => (1, Self::R),
                'G' => (2, Self::G),
                'B' => (3, Self::B),
                'I' => (4, Self::I),
                _ => return Err(Error::BadChannelName(s.to_string())),
            };
            if rank <= last {
                return Err(Error::BadChannelName(s.to_string()));
            }
            last = rank;
            set |= flag;
        }
        Ok(set)
    }
}

/// Every possible channel combination as an RGB color, indexed by the
/// combination's bit value. Colors with the insert bit set are brighter.
pub const PALETTE: [[u8; 3]; 16] = build_palette();

const fn build_palette() -> [[u8; 3]; 16] {
    let mut palette = [[0u8; 3]; 16];
    let mut i = 0;
    while i < 16 {
        let (bright, dark) = if i & 0b0001 != 0 {
            (0xFF, 0x00)
        } else {
            (0xCC, 0x44)
        };
        let r = if i & 0b1000 != 0 { bright } else { dark };
        let g = if i & 0b0100 != 0 { bright } else { dark };
        let b = if i & 0b0010 != 0 { bright } else { dark };
        palette[i] = [r, g, b];
        i += 1;
    }
    palette
}

/// Palette entries flattened as `RGBRGB...`, the layout PNG `PLTE` expects.
pub fn palette_bytes() -> Vec<u8> {
    PALETTE.iter().flatten().copied().collect()
}

/// Returns the index of the palette color closest to `rgb`.
///
/// Ties resolve to the lowest index.
pub fn nearest_index(rgb: [u8; 3]) -> u8 {
    let mut best = 0u8;
    let mut best_distance = u32::MAX;
    for (index, color) in PALETTE.iter().enumerate() {
        let distance: u32 = color
            .iter()
            .zip(rgb.iter())
            .map(|(&a, &b)| {
                let d = a as i32 - b as i32;
                (d * d) as u32
            })
            .sum();
        if distance < best_distance {
            best = index as u8;
            best_distance = distance;
            if distance == 0 {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_entries_follow_insert_brightness() {
        assert_eq!(PALETTE[0b0000], [0x44, 0x44, 0x44]);
        assert_eq!(PALETTE[0b0001], [0x00, 0x00, 0x00]);
        assert_eq!(PALETTE[0b1000], [0xCC, 0x44, 0x44]);
        assert_eq!(PALETTE[0b1001], [0xFF, 0x00, 0x00]);
        assert_eq!(PALETTE[0b0110], [0x44, 0xCC, 0xCC]);
        assert_eq!(PALETTE[0b1111], [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn palette_colors_quantize_to_their_own_index() {
        for (index, color) in PALETTE.iter().enumerate() {
            assert_eq!(nearest_index(*color) as usize, index);
        }
    }

    #[test]
    fn off_palette_colors_snap_to_nearest() {
        assert_eq!(nearest_index([0xF0, 0x08, 0x10]), 0b1001);
        assert_eq!(nearest_index([0x40, 0x48, 0x40]), 0b0000);
    }

    #[test]
    fn names_round_trip() {
        for index in 0..16u8 {
            let set = ChannelSet::from_index(index);
            assert_eq!(set.name().parse::<ChannelSet>().unwrap(), set);
        }
        assert_eq!(ChannelSet::NONE.to_string(), "NONE");
        assert_eq!((ChannelSet::R | ChannelSet::B | ChannelSet::I).to_string(), "RBI");
    }

    #[test]
    fn rejects_malformed_names() {
        assert!("".parse::<ChannelSet>().is_err());
        assert!("GR".parse::<ChannelSet>().is_err());
        assert!("RR".parse::<ChannelSet>().is_err());
        assert!("RGBX".parse::<ChannelSet>().is_err());
    }

    #[test]
    fn raw_channel_counts() {
        assert_eq!(ChannelSet::from_raw_count(3).unwrap(), ChannelSet::RGB);
        assert_eq!(ChannelSet::from_raw_count(4).unwrap(), ChannelSet::RGBI);
        assert!(ChannelSet::from_raw_count(5).is_err());
    }
}
