//! Checked arithmetic helpers
//!
//! Image geometry math must never wrap or truncate silently. These traits
//! turn every conversion and multiplication used for buffer sizes into a
//! fallible operation.

#[derive(Debug, Clone, Copy)]
pub struct DimensionTooLargeError;

impl std::fmt::Display for DimensionTooLargeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str("Dimension too large for system")
    }
}

impl std::error::Error for DimensionTooLargeError {}

pub trait SafeConversion: Sized {
    fn try_i32(self) -> Result<i32, DimensionTooLargeError>;
    fn try_u32(self) -> Result<u32, DimensionTooLargeError>;
    fn try_u64(self) -> Result<u64, DimensionTooLargeError>;
    fn try_usize(self) -> Result<usize, DimensionTooLargeError>;
}

macro_rules! impl_safe_conversion {
    ($($from:ty),*) => {
        $(
            impl SafeConversion for $from {
                fn try_i32(self) -> Result<i32, DimensionTooLargeError> {
                    self.try_into().map_err(|_| DimensionTooLargeError)
                }

                fn try_u32(self) -> Result<u32, DimensionTooLargeError> {
                    self.try_into().map_err(|_| DimensionTooLargeError)
                }

                fn try_u64(self) -> Result<u64, DimensionTooLargeError> {
                    self.try_into().map_err(|_| DimensionTooLargeError)
                }

                fn try_usize(self) -> Result<usize, DimensionTooLargeError> {
                    self.try_into().map_err(|_| DimensionTooLargeError)
                }
            }
        )*
    };
}

impl_safe_conversion!(u32, u64, usize);

pub trait SafeMath: Sized {
    fn sadd(self, rhs: Self) -> Result<Self, DimensionTooLargeError>;
    fn smul(self, rhs: Self) -> Result<Self, DimensionTooLargeError>;
    fn srem(self, rhs: Self) -> Result<Self, DimensionTooLargeError>;
}

macro_rules! impl_safe_math {
    ($($ty:ty),*) => {
        $(
            impl SafeMath for $ty {
                fn sadd(self, rhs: Self) -> Result<Self, DimensionTooLargeError> {
                    self.checked_add(rhs).ok_or(DimensionTooLargeError)
                }

                fn smul(self, rhs: Self) -> Result<Self, DimensionTooLargeError> {
                    self.checked_mul(rhs).ok_or(DimensionTooLargeError)
                }

                fn srem(self, rhs: Self) -> Result<Self, DimensionTooLargeError> {
                    self.checked_rem(rhs).ok_or(DimensionTooLargeError)
                }
            }
        )*
    };
}

impl_safe_math!(u32, u64, usize);
