// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use num_traits::PrimInt;

/// Smallest page size found in the wild.
pub const MIN_PAGE_SIZE: u32 = 2048;
/// Largest page size accepted when parsing. Anything bigger is almost certainly
/// a corrupted or hostile header.
pub const MAX_PAGE_SIZE: u32 = 131072;

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a page boundary.
pub fn calc<N: PrimInt>(offset: N, page_size: N) -> N {
    let r = offset % page_size;
    if r == N::zero() {
        N::zero()
    } else {
        page_size - r
    }
}

/// Round to the next multiple of the page size.
pub fn round<N: PrimInt>(offset: N, page_size: N) -> Option<N> {
    let remain = calc(offset, page_size);
    offset.checked_add(&remain)
}

/// Check that a page size is a power of two within
/// [`MIN_PAGE_SIZE`]..=[`MAX_PAGE_SIZE`].
pub fn is_valid_page_size(page_size: u32) -> bool {
    page_size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
}

/// Append zeros until the length of `buf` is a multiple of the page size.
pub fn write_zeros(buf: &mut Vec<u8>, page_size: usize) -> usize {
    let padding = calc(buf.len(), page_size);
    buf.resize(buf.len() + padding, 0);

    padding
}

/// Copy `data` into a new buffer that is zero-extended to the next multiple of
/// `alignment`.
pub fn zero_extended(data: &[u8], alignment: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + calc(data.len(), alignment));
    buf.extend_from_slice(data);
    write_zeros(&mut buf, alignment);

    buf
}

pub trait ZeroPadding {
    /// Trim trailing zeros. Intermediate zeros before the last non-zero byte
    /// are kept.
    fn trim_end_padding(&self) -> &[u8];

    /// Return the slice as an array padded with zeros at the end.
    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]>;
}

impl ZeroPadding for [u8] {
    fn trim_end_padding(&self) -> &[u8] {
        let first_ending_zero = self
            .iter()
            .rposition(|b| *b != 0)
            .map(|pos| pos + 1)
            .unwrap_or_default();

        &self[..first_ending_zero]
    }

    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]> {
        if self.len() > N {
            return None;
        }

        let mut result = [0u8; N];
        result[..self.len()].copy_from_slice(self);

        Some(result)
    }
}
