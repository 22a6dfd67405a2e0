//! SMPTE timecode helpers
//!
//! Camera EXRs carry the `TimeCode` attribute as a packed BCD word
//! (exiftool prints it as a plain integer). Video containers report an
//! already formatted `HH:MM:SS:FF` string. Both end up as [`Timecode`].

use std::fmt;

/// Highest frame base a timecode frame field holds; faster footage counts at this base
pub const MAX_RATE: u32 = 120;

fn frame_base(rate: u32) -> u64 {
    rate.clamp(1, MAX_RATE) as u64
}

/// Hours/minutes/seconds/frames, non-drop-frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self { hours, minutes, seconds, frames }
    }

    /// Decode the SMPTE 12M packed BCD time word.
    ///
    /// Layout (LSB first): frame units (4), frame tens (2), 2 flag bits,
    /// second units (4), second tens (3), 1 flag, minute units (4),
    /// minute tens (3), 1 flag, hour units (4), hour tens (2), 2 flags.
    pub fn decode_bcd(raw: u32) -> Self {
        let digit = |shift: u32, mask: u32| ((raw >> shift) & mask) as u8;

        let frames = digit(4, 0x03) * 10 + digit(0, 0x0F);
        let seconds = digit(12, 0x07) * 10 + digit(8, 0x0F);
        let minutes = digit(20, 0x07) * 10 + digit(16, 0x0F);
        let hours = digit(28, 0x03) * 10 + digit(24, 0x0F);

        Self { hours, minutes, seconds, frames }
    }

    /// Parse `HH:MM:SS:FF` (`;` accepted as drop-frame separator)
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split([':', ';']).collect();
        if parts.len() != 4 {
            return None;
        }
        let mut nums = [0u8; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.trim().parse().ok()?;
        }
        let tc = Self::new(nums[0], nums[1], nums[2], nums[3]);
        (tc.minutes < 60 && tc.seconds < 60).then_some(tc)
    }

    /// Interpret an exiftool `TimeCode` value: formatted string or raw BCD word
    /// (e.g. `"287454020"` or `"287454020 0"`).
    pub fn from_exif(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value.contains(':') {
            return Self::parse(value);
        }
        let raw = value.split_whitespace().next()?.parse::<u32>().ok()?;
        Some(Self::decode_bcd(raw))
    }

    /// Total frame count from midnight at the given nominal rate
    pub fn to_frames(&self, rate: u32) -> u64 {
        let rate = frame_base(rate);
        let secs = self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64;
        secs * rate + self.frames as u64
    }

    /// Inverse of [`Timecode::to_frames`], wrapping at 24h
    pub fn from_frames(total: u64, rate: u32) -> Self {
        let rate = frame_base(rate);
        let total = total % (24 * 3600 * rate);
        let frames = (total % rate) as u8;
        let secs = total / rate;
        Self {
            hours: (secs / 3600) as u8,
            minutes: ((secs / 60) % 60) as u8,
            seconds: (secs % 60) as u8,
            frames,
        }
    }

    /// Timecode `frames` later
    pub fn offset(&self, frames: u64, rate: u32) -> Self {
        Self::from_frames(self.to_frames(rate) + frames, rate)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Integer timecode base for a (possibly fractional) frame rate: 23.976 -> 24
///
/// Capped at [`MAX_RATE`]; metadata claiming more is taken at the cap.
pub fn nominal_rate(fps: f64) -> u32 {
    if fps.is_finite() && fps >= 1.0 {
        fps.round().min(MAX_RATE as f64) as u32
    } else {
        24
    }
}
