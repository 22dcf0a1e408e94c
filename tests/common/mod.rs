#![allow(dead_code)]

use chipbridge::frame::Frame;

pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 3;

/// A frame whose pixels cycle through palette indices starting at `seed`.
pub fn pattern(seed: u8) -> Frame {
    let indices = (0..WIDTH * HEIGHT)
        .map(|i| (seed.wrapping_add(i as u8)) & 0x0F)
        .collect();
    Frame::new(WIDTH, HEIGHT, indices).unwrap()
}

/// Same as `pattern`, with the insert bit of every pixel flipped.
pub fn pattern_flipped_insert(seed: u8) -> Frame {
    let base = pattern(seed);
    let indices = base.indices().iter().map(|i| i ^ 0b0001).collect();
    Frame::new(WIDTH, HEIGHT, indices).unwrap()
}

/// Scratch path under `target/tmp`, created on demand.
pub fn tmp_path(name: &str) -> std::path::PathBuf {
    let dir = std::path::Path::new(env!("CARGO_TARGET_TMPDIR")).join("chipbridge-tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

/// One raw side-channel record filled with a single BGRA color.
pub fn raw_record(count: u8, width: u16, height: u16, bgra: [u8; 4]) -> Vec<u8> {
    let mut record = vec![count];
    record.extend_from_slice(&width.to_le_bytes());
    record.extend_from_slice(&height.to_le_bytes());
    for _ in 0..(width as usize * height as usize) {
        record.extend_from_slice(&bgra);
    }
    record
}
