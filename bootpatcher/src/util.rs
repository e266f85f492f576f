// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    ops::{Range, RangeBounds},
};

use num_traits::PrimInt;
use thiserror::Error;

/// A small wrapper to format a number as a size in bytes.
#[derive(Clone, Copy)]
pub struct NumBytes<T: PrimInt>(pub T);

impl<T: PrimInt + fmt::Debug> fmt::Debug for NumBytes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == T::one() {
            write!(f, "<{:?} byte>", self.0)
        } else {
            write!(f, "<{:?} bytes>", self.0)
        }
    }
}

#[derive(Debug, Error)]
#[error("{value} not in bounds: {bounds}")]
pub struct OutOfBoundsError {
    pub value: String,
    pub bounds: String,
}

/// Return `value` if it falls within `bounds`.
pub fn check_bounds<T, R>(value: T, bounds: R) -> Result<T, OutOfBoundsError>
where
    T: PartialOrd + fmt::Display,
    R: RangeBounds<T> + fmt::Debug,
{
    if bounds.contains(&value) {
        Ok(value)
    } else {
        Err(OutOfBoundsError {
            value: value.to_string(),
            bounds: format!("{bounds:?}"),
        })
    }
}

/// Compute `offset..offset + size` if the range lies entirely within a buffer
/// of length `len`.
pub fn section_range(offset: usize, size: usize, len: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(size)?;
    if end > len {
        return None;
    }

    Some(offset..end)
}

/// Read a little-endian u32 at `offset`, if in bounds.
pub fn read_le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let range = section_range(offset, 4, data.len())?;
    let bytes: [u8; 4] = data[range].try_into().ok()?;

    Some(u32::from_le_bytes(bytes))
}
