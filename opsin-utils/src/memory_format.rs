use serde::{Deserialize, Serialize};

/// Describes the formats the image data can have.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemoryFormat {
    B8g8r8a8Premultiplied = 0,
    A8r8g8b8Premultiplied = 1,
    R8g8b8a8Premultiplied = 2,
    B8g8r8a8 = 3,
    A8r8g8b8 = 4,
    R8g8b8a8 = 5,
    A8b8g8r8 = 6,
    R8g8b8 = 7,
    B8g8r8 = 8,
    R16g16b16 = 9,
    R16g16b16a16Premultiplied = 10,
    R16g16b16a16 = 11,
    R16g16b16Float = 12,
    R16g16b16a16Float = 13,
    R32g32b32Float = 14,
    R32g32b32a32FloatPremultiplied = 15,
    R32g32b32a32Float = 16,
    G8a8Premultiplied = 17,
    G8a8 = 18,
    G8 = 19,
    G16a16Premultiplied = 20,
    G16a16 = 21,
    G16 = 22,
}

impl MemoryFormat {
    pub const fn n_bytes(self) -> MemoryFormatBytes {
        match self {
            MemoryFormat::G8 => MemoryFormatBytes::B1,
            MemoryFormat::G8a8Premultiplied | MemoryFormat::G8a8 | MemoryFormat::G16 => {
                MemoryFormatBytes::B2
            }
            MemoryFormat::R8g8b8 | MemoryFormat::B8g8r8 => MemoryFormatBytes::B3,
            MemoryFormat::B8g8r8a8Premultiplied
            | MemoryFormat::A8r8g8b8Premultiplied
            | MemoryFormat::R8g8b8a8Premultiplied
            | MemoryFormat::B8g8r8a8
            | MemoryFormat::A8r8g8b8
            | MemoryFormat::R8g8b8a8
            | MemoryFormat::A8b8g8r8
            | MemoryFormat::G16a16Premultiplied
            | MemoryFormat::G16a16 => MemoryFormatBytes::B4,
            MemoryFormat::R16g16b16 | MemoryFormat::R16g16b16Float => MemoryFormatBytes::B6,
            MemoryFormat::R16g16b16a16Premultiplied
            | MemoryFormat::R16g16b16a16
            | MemoryFormat::R16g16b16a16Float => MemoryFormatBytes::B8,
            MemoryFormat::R32g32b32Float => MemoryFormatBytes::B12,
            MemoryFormat::R32g32b32a32FloatPremultiplied | MemoryFormat::R32g32b32a32Float => {
                MemoryFormatBytes::B16
            }
        }
    }

    pub const fn n_channels(self) -> u8 {
        match self {
            MemoryFormat::G8 | MemoryFormat::G16 => 1,
            MemoryFormat::G8a8Premultiplied
            | MemoryFormat::G8a8
            | MemoryFormat::G16a16Premultiplied
            | MemoryFormat::G16a16 => 2,
            MemoryFormat::R8g8b8
            | MemoryFormat::B8g8r8
            | MemoryFormat::R16g16b16
            | MemoryFormat::R16g16b16Float
            | MemoryFormat::R32g32b32Float => 3,
            MemoryFormat::B8g8r8a8Premultiplied
            | MemoryFormat::A8r8g8b8Premultiplied
            | MemoryFormat::R8g8b8a8Premultiplied
            | MemoryFormat::B8g8r8a8
            | MemoryFormat::A8r8g8b8
            | MemoryFormat::R8g8b8a8
            | MemoryFormat::A8b8g8r8
            | MemoryFormat::R16g16b16a16Premultiplied
            | MemoryFormat::R16g16b16a16
            | MemoryFormat::R16g16b16a16Float
            | MemoryFormat::R32g32b32a32FloatPremultiplied
            | MemoryFormat::R32g32b32a32Float => 4,
        }
    }

    pub const fn has_alpha(self) -> bool {
        match self {
            MemoryFormat::B8g8r8a8Premultiplied
            | MemoryFormat::A8r8g8b8Premultiplied
            | MemoryFormat::R8g8b8a8Premultiplied
            | MemoryFormat::B8g8r8a8
            | MemoryFormat::A8r8g8b8
            | MemoryFormat::R8g8b8a8
            | MemoryFormat::A8b8g8r8
            | MemoryFormat::R16g16b16a16Premultiplied
            | MemoryFormat::R16g16b16a16
            | MemoryFormat::R16g16b16a16Float
            | MemoryFormat::R32g32b32a32FloatPremultiplied
            | MemoryFormat::R32g32b32a32Float
            | MemoryFormat::G8a8Premultiplied
            | MemoryFormat::G8a8
            | MemoryFormat::G16a16Premultiplied
            | MemoryFormat::G16a16 => true,
            MemoryFormat::R8g8b8
            | MemoryFormat::B8g8r8
            | MemoryFormat::R16g16b16
            | MemoryFormat::R16g16b16Float
            | MemoryFormat::R32g32b32Float
            | MemoryFormat::G8
            | MemoryFormat::G16 => false,
        }
    }

    pub const fn is_premultiplied(self) -> bool {
        matches!(
            self,
            MemoryFormat::B8g8r8a8Premultiplied
                | MemoryFormat::A8r8g8b8Premultiplied
                | MemoryFormat::R8g8b8a8Premultiplied
                | MemoryFormat::R16g16b16a16Premultiplied
                | MemoryFormat::R32g32b32a32FloatPremultiplied
                | MemoryFormat::G8a8Premultiplied
                | MemoryFormat::G16a16Premultiplied
        )
    }
}

pub enum MemoryFormatBytes {
    B1 = 1,
    B2 = 2,
    B3 = 3,
    B4 = 4,
    B6 = 6,
    B8 = 8,
    B12 = 12,
    B16 = 16,
}

impl MemoryFormatBytes {
    pub fn u32(self) -> u32 {
        self as u32
    }

    pub fn u64(self) -> u64 {
        self as u64
    }

    pub fn usize(self) -> usize {
        self as usize
    }
}

/// Set of acceptable [`MemoryFormat`]s
///
/// Used to restrict the formats a frame can be returned in. The default
/// selection accepts every format.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFormatSelection(u32);

impl MemoryFormatSelection {
    pub const B8G8R8A8_PREMULTIPLIED: Self = Self::single(MemoryFormat::B8g8r8a8Premultiplied);
    pub const A8R8G8B8_PREMULTIPLIED: Self = Self::single(MemoryFormat::A8r8g8b8Premultiplied);
    pub const R8G8B8A8_PREMULTIPLIED: Self = Self::single(MemoryFormat::R8g8b8a8Premultiplied);
    pub const B8G8R8A8: Self = Self::single(MemoryFormat::B8g8r8a8);
    pub const A8R8G8B8: Self = Self::single(MemoryFormat::A8r8g8b8);
    pub const R8G8B8A8: Self = Self::single(MemoryFormat::R8g8b8a8);
    pub const A8B8G8R8: Self = Self::single(MemoryFormat::A8b8g8r8);
    pub const R8G8B8: Self = Self::single(MemoryFormat::R8g8b8);
    pub const B8G8R8: Self = Self::single(MemoryFormat::B8g8r8);
    pub const R16G16B16: Self = Self::single(MemoryFormat::R16g16b16);
    pub const R16G16B16A16_PREMULTIPLIED: Self =
        Self::single(MemoryFormat::R16g16b16a16Premultiplied);
    pub const R16G16B16A16: Self = Self::single(MemoryFormat::R16g16b16a16);
    pub const R16G16B16_FLOAT: Self = Self::single(MemoryFormat::R16g16b16Float);
    pub const R16G16B16A16_FLOAT: Self = Self::single(MemoryFormat::R16g16b16a16Float);
    pub const R32G32B32_FLOAT: Self = Self::single(MemoryFormat::R32g32b32Float);
    pub const R32G32B32A32_FLOAT_PREMULTIPLIED: Self =
        Self::single(MemoryFormat::R32g32b32a32FloatPremultiplied);
    pub const R32G32B32A32_FLOAT: Self = Self::single(MemoryFormat::R32g32b32a32Float);
    pub const G8A8_PREMULTIPLIED: Self = Self::single(MemoryFormat::G8a8Premultiplied);
    pub const G8A8: Self = Self::single(MemoryFormat::G8a8);
    pub const G8: Self = Self::single(MemoryFormat::G8);
    pub const G16A16_PREMULTIPLIED: Self = Self::single(MemoryFormat::G16a16Premultiplied);
    pub const G16A16: Self = Self::single(MemoryFormat::G16a16);
    pub const G16: Self = Self::single(MemoryFormat::G16);

    pub const ALL: Self = Self((1 << 23) - 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    const fn single(format: MemoryFormat) -> Self {
        Self(1 << format as u32)
    }

    pub const fn contains(self, format: MemoryFormat) -> bool {
        self.0 & (1 << format as u32) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the first format of `preferred` that is part of the selection
    ///
    /// The preference list is ordered from most to least preferred by a
    /// decoder. The result is deterministic for a given pair of arguments.
    pub fn best_match(self, preferred: &[MemoryFormat]) -> Option<MemoryFormat> {
        preferred.iter().copied().find(|x| self.contains(*x))
    }
}

impl Default for MemoryFormatSelection {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for MemoryFormatSelection {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for MemoryFormatSelection {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<MemoryFormat> for MemoryFormatSelection {
    fn from(format: MemoryFormat) -> Self {
        Self::single(format)
    }
}
