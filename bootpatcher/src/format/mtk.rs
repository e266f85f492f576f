// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! MediaTek images are Android images where the kernel and ramdisk each carry
//! an extra 512-byte header describing the payload.

use std::{mem, str};

use serde::{Deserialize, Serialize};
use tracing::debug;
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    format::{
        android::{self, AndroidFormat, MAX_HEADER_OFFSET},
        bootimage::{BootImage, Error, Format, FormatStrategy, Result},
        header::BOOT_ID_WORDS,
        padding::ZeroPadding,
    },
    util,
};

pub const MTK_MAGIC: [u8; 4] = [0x88, 0x16, 0x88, 0x58];
pub const MTK_TYPE_SIZE: usize = 32;

pub const DEFAULT_KERNEL_TYPE: &str = "KERNEL";
pub const DEFAULT_RAMDISK_TYPE: &str = "ROOTFS";

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawMtkHeader {
    magic: [u8; 4],
    size: little_endian::U32,
    kind: [u8; MTK_TYPE_SIZE],
    /// Always filled with 0xff.
    unused: [u8; 472],
}

pub const MTK_HEADER_SIZE: usize = mem::size_of::<RawMtkHeader>();

/// MTK header fields that are not derived from the section contents.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct MtkExtra {
    pub kernel_type: String,
    pub ramdisk_type: String,
}

impl Default for MtkExtra {
    fn default() -> Self {
        Self {
            kernel_type: DEFAULT_KERNEL_TYPE.to_owned(),
            ramdisk_type: DEFAULT_RAMDISK_TYPE.to_owned(),
        }
    }
}

fn has_header(data: &[u8]) -> bool {
    data.starts_with(&MTK_MAGIC)
}

/// Split a section into its MTK type string and payload.
fn strip_header(field: &'static str, data: &[u8]) -> Result<(String, Vec<u8>)> {
    let (raw, payload) =
        RawMtkHeader::read_from_prefix(data).map_err(|_| Error::MtkMissingHeader(field))?;
    if raw.magic != MTK_MAGIC {
        return Err(Error::MtkMissingHeader(field));
    }

    let size = raw.size.get();
    if size as usize != payload.len() {
        return Err(Error::MtkSizeMismatch {
            field,
            header: size,
            actual: payload.len(),
        });
    }

    let kind = raw.kind.trim_end_padding();
    let kind = str::from_utf8(kind).map_err(|e| Error::StringNotUtf8(field, e, kind.to_vec()))?;

    Ok((kind.to_owned(), payload.to_vec()))
}

/// Prepend an MTK header to `data`.
fn add_header(field: &'static str, kind: &str, data: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(data.len()).map_err(|_| Error::IntOverflow(field))?;
    let kind_bytes = kind
        .as_bytes()
        .to_padded_array::<MTK_TYPE_SIZE>()
        .ok_or_else(|| Error::StringTooLong(field, MTK_TYPE_SIZE, kind.to_owned()))?;

    let raw = RawMtkHeader {
        magic: MTK_MAGIC,
        size: size.into(),
        kind: kind_bytes,
        unused: [0xff; 472],
    };

    let mut buf = Vec::with_capacity(MTK_HEADER_SIZE + data.len());
    buf.extend_from_slice(raw.as_bytes());
    buf.extend_from_slice(data);

    Ok(buf)
}

fn wrapped_sections(image: &BootImage) -> Result<(Vec<u8>, Vec<u8>)> {
    let extra = image.mtk.clone().unwrap_or_default();
    let kernel = add_header("MTK::kernel", &extra.kernel_type, &image.kernel)?;
    let ramdisk = add_header("MTK::ramdisk", &extra.ramdisk_type, &image.ramdisk)?;

    Ok((kernel, ramdisk))
}

pub struct MtkFormat;

impl FormatStrategy for MtkFormat {
    fn detect(&self, data: &[u8]) -> bool {
        let Ok(offset) = android::find_header(data, MAX_HEADER_OFFSET) else {
            return false;
        };
        let Ok(raw) = android::read_header(data, offset) else {
            return false;
        };
        let Ok(sections) = android::section_offsets(&raw) else {
            return false;
        };

        offset
            .checked_add(sections.kernel)
            .and_then(|start| util::section_range(start, MTK_MAGIC.len(), data.len()))
            .is_some_and(|r| has_header(&data[r]))
    }

    fn parse(&self, data: &[u8]) -> Result<BootImage> {
        let offset = android::find_header(data, MAX_HEADER_OFFSET)?;
        let mut image = AndroidFormat::parse_at(data, offset)?;

        let (kernel_type, kernel) = strip_header("MTK::kernel", &image.kernel)?;
        let (ramdisk_type, ramdisk) = strip_header("MTK::ramdisk", &image.ramdisk)?;

        debug!("MTK section types: {kernel_type:?}, {ramdisk_type:?}");

        image.format = Format::Mtk;
        image.kernel = kernel;
        image.ramdisk = ramdisk;
        image.mtk = Some(MtkExtra {
            kernel_type,
            ramdisk_type,
        });

        Ok(image)
    }

    fn build(&self, image: &BootImage) -> Result<Vec<u8>> {
        let (kernel, ramdisk) = wrapped_sections(image)?;

        AndroidFormat::build_with(image, &kernel, &ramdisk)
    }

    /// The ID covers the sections as written, including the MTK headers.
    fn compute_id(&self, image: &BootImage) -> Result<[u32; BOOT_ID_WORDS]> {
        let (kernel, ramdisk) = wrapped_sections(image)?;

        android::compute_id(&kernel, &ramdisk, &image.second, &image.dt)
    }
}
