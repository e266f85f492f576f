// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Bump-signed images are plain Android images followed by a fixed magic
//! value that LG bootloaders accept in place of a signature.

use tracing::debug;

use crate::{
    format::{
        android::{self, AndroidFormat, MAX_HEADER_OFFSET},
        bootimage::{BootImage, Format, FormatStrategy, Result},
    },
    util,
};

pub const BUMP_MAGIC: [u8; 16] = [
    0x41, 0xa9, 0xe4, 0x67, 0x74, 0x4d, 0x1d, 0x1b, 0xa4, 0x29, 0xf2, 0xec, 0xea, 0x65, 0x52,
    0x79,
];

/// Offset of the Bump magic, if `data` is a valid Android image followed by
/// it.
fn find_magic(data: &[u8]) -> Option<usize> {
    let offset = android::find_header(data, MAX_HEADER_OFFSET).ok()?;
    let raw = android::read_header(data, offset).ok()?;
    let sections = android::section_offsets(&raw).ok()?;
    let magic_offset = offset.checked_add(sections.end)?;

    let range = util::section_range(magic_offset, BUMP_MAGIC.len(), data.len())?;
    (data[range] == BUMP_MAGIC).then_some(magic_offset)
}

pub struct BumpFormat;

impl FormatStrategy for BumpFormat {
    fn detect(&self, data: &[u8]) -> bool {
        find_magic(data).is_some()
    }

    fn parse(&self, data: &[u8]) -> Result<BootImage> {
        let offset = android::find_header(data, MAX_HEADER_OFFSET)?;
        let mut image = AndroidFormat::parse_at(data, offset)?;
        image.format = Format::Bump;

        if let Some(magic_offset) = find_magic(data) {
            debug!("Bump magic at offset {magic_offset:#x}");
        }

        Ok(image)
    }

    fn build(&self, image: &BootImage) -> Result<Vec<u8>> {
        let mut data = AndroidFormat::build_with(image, &image.kernel, &image.ramdisk)?;
        data.extend_from_slice(&BUMP_MAGIC);

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_after_last_section() {
        let image = BootImage {
            format: Format::Bump,
            kernel: b"kernel".to_vec(),
            ramdisk: b"ramdisk".to_vec(),
            ..Default::default()
        };
        let data = BumpFormat.build(&image).unwrap();

        assert_eq!(data.len(), 3 * 2048 + BUMP_MAGIC.len());
        assert_eq!(find_magic(&data), Some(3 * 2048));
        assert!(!BumpFormat.detect(&data[..3 * 2048]));

        let mut corrupted = data;
        *corrupted.last_mut().unwrap() ^= 1;
        assert!(!BumpFormat.detect(&corrupted));
    }
}
