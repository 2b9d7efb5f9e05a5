//! WS2812 status LED driven through SPI.
//!
//! Each pair of colour bits becomes one SPI byte whose nibbles shape the
//! WS2812 high/low pulses. Sixteen-bit SPI frames carry two bytes each; the
//! trailing zero frames hold the line low for the latch.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

pub const WS2812_FRAMES: usize = 8;

const fn bit_pair(bits: u8) -> u8 {
    match bits & 0x3 {
        0b11 => 0xEE,
        0b01 => 0x8E,
        0b10 => 0xE8,
        _ => 0x88,
    }
}

fn push_color(out: &mut [u8], value: u8) {
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = bit_pair(value >> (6 - 2 * i));
    }
}

/// SPI frames for one LED, colour order G, R, B, most significant bit first.
pub fn encode_ws2812(color: Rgb) -> [u16; WS2812_FRAMES] {
    let mut bytes = [0u8; WS2812_FRAMES * 2];
    push_color(&mut bytes[0..4], color.g);
    push_color(&mut bytes[4..8], color.r);
    push_color(&mut bytes[8..12], color.b);

    let mut frames = [0u16; WS2812_FRAMES];
    for (frame, pair) in frames.iter_mut().zip(bytes.chunks_exact(2)) {
        *frame = (pair[0] as u16) << 8 | pair[1] as u16;
    }
    frames
}
