//! PCM sample and frame-layout description.
//!
//! A negotiated format is `(bit_format, sample_bits, sample_rate,
//! channels, position)`. Frames are interleaved by channel in native host
//! endianness; `position[i]` names the speaker the *i*-th sample of a
//! frame belongs to.

use crate::Error;

/// Maximum number of channels in a frame, equal to the number of defined
/// speaker positions.
pub const CHANNEL_MAX: usize = 18;

/// PCM sample encoding family, combined with a bit count to describe a
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitFormat {
    /// Not a valid wire format; rejected (or rewritten) at negotiation.
    #[default]
    None,
    /// Two's-complement signed integer.
    IntegerSigned,
    /// Unsigned integer.
    IntegerUnsigned,
    /// IEEE 754 float.
    Float,
}

/// Speaker position bitmask.
///
/// The discriminants are single bits so positions can be combined into
/// device masks, but a [`FluxConfig`](crate::FluxConfig) carries one
/// position per interleaved channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
#[allow(missing_docs)] // position names are self-describing
pub enum ChannelPosition {
    /// Unassigned.
    #[default]
    None = 0,
    FrontLeft = 1 << 0,
    FrontRight = 1 << 1,
    FrontCenter = 1 << 2,
    LowFrequency = 1 << 3,
    RearLeft = 1 << 4,
    RearRight = 1 << 5,
    FrontLeftCenter = 1 << 6,
    FrontRightCenter = 1 << 7,
    RearCenter = 1 << 8,
    SideLeft = 1 << 9,
    SideRight = 1 << 10,
    TopCenter = 1 << 11,
    TopFrontLeft = 1 << 12,
    TopFrontCenter = 1 << 13,
    TopFrontRight = 1 << 14,
    TopRearLeft = 1 << 15,
    TopRearCenter = 1 << 16,
    TopRearRight = 1 << 17,
}

impl ChannelPosition {
    /// Conventional layout for the given channel count, used when a
    /// backend rewrites a config during negotiation. Unused slots are
    /// `None`.
    #[must_use]
    pub fn default_map(channels: u8) -> [ChannelPosition; CHANNEL_MAX] {
        use ChannelPosition::*;

        let layout: &[ChannelPosition] = match channels {
            1 => &[FrontCenter],
            2 => &[FrontLeft, FrontRight],
            3 => &[FrontLeft, FrontRight, FrontCenter],
            4 => &[FrontLeft, FrontRight, RearLeft, RearRight],
            5 => &[FrontLeft, FrontRight, FrontCenter, RearLeft, RearRight],
            6 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                LowFrequency,
                RearLeft,
                RearRight,
            ],
            7 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                LowFrequency,
                RearCenter,
                SideLeft,
                SideRight,
            ],
            8 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                LowFrequency,
                RearLeft,
                RearRight,
                SideLeft,
                SideRight,
            ],
            _ => &[],
        };

        let mut map = [ChannelPosition::None; CHANNEL_MAX];
        map[..layout.len()].copy_from_slice(layout);
        map
    }
}

/// Byte layout of one sample.
///
/// `valid_bits` is the precision of the encoding; `container_bytes` is the
/// storage each sample occupies on the wire. They differ for formats such
/// as 24-bit-in-4-bytes; a backend using packed 24-bit would construct the
/// layout with a 3-byte container instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    /// Precision in bits (8, 16, 24, 32 or 64).
    pub valid_bits: u8,
    /// Bytes of storage per sample.
    pub container_bytes: u8,
}

impl SampleLayout {
    /// Layout for a format/bits pair where samples live in a
    /// power-of-two-sized container, which is what every shipped backend
    /// uses. Returns `Generic` for combinations no backend can express.
    pub fn padded(format: BitFormat, valid_bits: u8) -> Result<Self, Error> {
        let supported = match format {
            BitFormat::IntegerSigned => matches!(valid_bits, 8 | 16 | 24 | 32),
            BitFormat::IntegerUnsigned => matches!(valid_bits, 8 | 16 | 24 | 32),
            BitFormat::Float => matches!(valid_bits, 32 | 64),
            BitFormat::None => false,
        };
        if !supported {
            return Err(Error::Generic);
        }

        Ok(Self {
            valid_bits,
            container_bytes: (valid_bits.next_power_of_two().max(8)) / 8,
        })
    }

    /// Layout with an explicit container size (packed formats).
    #[must_use]
    pub fn packed(valid_bits: u8, container_bytes: u8) -> Self {
        Self {
            valid_bits,
            container_bytes,
        }
    }

    /// Bytes per interleaved frame for the given channel count.
    #[must_use]
    pub fn frame_bytes(&self, channels: u8) -> usize {
        usize::from(self.container_bytes) * usize::from(channels)
    }
}
