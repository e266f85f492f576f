// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::str;

use memchr::memmem;
use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};
use tracing::{debug, trace};
use zerocopy::{FromBytes, IntoBytes};

use crate::{
    format::{
        bootimage::{BootImage, Error, Format, FormatStrategy, Result},
        header::{
            ANDROID_HEADER_SIZE, BOOT_ARGS_SIZE, BOOT_ID_WORDS, BOOT_MAGIC, BOOT_NAME_SIZE,
            RawAndroidHeader,
        },
        padding::{self, ZeroPadding},
    },
    util,
};

/// Magic search window for plain images.
pub const MAX_HEADER_OFFSET: usize = 512;

/// Maximum size of any individual boot image component, like the kernel. This
/// limit is currently 64 MiB, which should be sufficient since there is no
/// known device where the entire boot image exceeds this size.
const COMPONENT_MAX_SIZE: u32 = 64 * 1024 * 1024;

/// Offsets of each component relative to the start of the header. Every
/// section starts on a page boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SectionOffsets {
    pub kernel: usize,
    pub ramdisk: usize,
    pub second: usize,
    pub dt: usize,
    /// End of the page-padded device tree (or of the last non-empty section).
    pub end: usize,
}

/// Find the first Android magic whose header fits entirely in `data` and starts
/// no later than `max_offset`.
pub fn find_header(data: &[u8], max_offset: usize) -> Result<usize> {
    let Some(last) = data.len().checked_sub(ANDROID_HEADER_SIZE) else {
        return Err(Error::SmallerThanHeader(data.len()));
    };
    let window = &data[..last.min(max_offset) + BOOT_MAGIC.len()];

    memmem::find(window, &BOOT_MAGIC).ok_or(Error::NoAndroidHeader(max_offset))
}

/// Read the header at `offset` and validate the fields that every later
/// calculation depends on.
pub fn read_header(data: &[u8], offset: usize) -> Result<RawAndroidHeader> {
    let (raw, _) = data
        .get(offset..)
        .and_then(|d| RawAndroidHeader::read_from_prefix(d).ok())
        .ok_or(Error::SmallerThanHeader(data.len()))?;

    if raw.magic != BOOT_MAGIC {
        return Err(Error::NoAndroidHeader(offset));
    }

    let page_size = raw.page_size.get();
    if !padding::is_valid_page_size(page_size) {
        return Err(Error::InvalidPageSize(page_size));
    }

    Ok(raw)
}

/// Compute where each section lives. The page size must already be validated.
pub fn section_offsets(raw: &RawAndroidHeader) -> Result<SectionOffsets> {
    let page_size = raw.page_size.get() as usize;

    let advance = |pos: usize, size: u32, field| {
        let size = size as usize;
        pos.checked_add(size)
            .and_then(|p| p.checked_add(padding::calc(size, page_size)))
            .ok_or(Error::IntOverflow(field))
    };

    let kernel = ANDROID_HEADER_SIZE + padding::calc(ANDROID_HEADER_SIZE, page_size);
    let ramdisk = advance(kernel, raw.kernel_size.get(), "Android::kernel_size")?;
    let second = advance(ramdisk, raw.ramdisk_size.get(), "Android::ramdisk_size")?;
    let dt = advance(second, raw.second_size.get(), "Android::second_size")?;
    let end = advance(dt, raw.dt_size.get(), "Android::dt_size")?;

    Ok(SectionOffsets {
        kernel,
        ramdisk,
        second,
        dt,
        end,
    })
}

/// Copy `size` bytes at `base + offset`. Reading past the end of `data` is an
/// error, never a truncation.
pub(crate) fn read_section(
    data: &[u8],
    base: usize,
    offset: usize,
    size: usize,
    field: &'static str,
) -> Result<Vec<u8>> {
    let start = base.checked_add(offset).ok_or(Error::IntOverflow(field))?;

    util::section_range(start, size, data.len())
        .map(|r| data[r].to_vec())
        .ok_or(Error::SectionOutOfBounds {
            field,
            offset: start,
            size,
            len: data.len(),
        })
}

fn decode_string(field: &'static str, data: &[u8]) -> Result<String> {
    let data = data.trim_end_padding();

    str::from_utf8(data)
        .map(ToOwned::to_owned)
        .map_err(|e| Error::StringNotUtf8(field, e, data.to_vec()))
}

/// Create an image with the scalar header fields filled in. Component images
/// are left empty.
pub fn image_from_header(raw: &RawAndroidHeader) -> Result<BootImage> {
    for (field, size) in [
        ("Android::kernel_size", raw.kernel_size.get()),
        ("Android::ramdisk_size", raw.ramdisk_size.get()),
        ("Android::second_size", raw.second_size.get()),
        ("Android::dt_size", raw.dt_size.get()),
    ] {
        util::check_bounds(size, ..=COMPONENT_MAX_SIZE)
            .map_err(|e| Error::IntOutOfBounds(field, e))?;
    }

    Ok(BootImage {
        format: Format::Android,
        kernel_addr: raw.kernel_addr.get(),
        ramdisk_addr: raw.ramdisk_addr.get(),
        second_addr: raw.second_addr.get(),
        tags_addr: raw.tags_addr.get(),
        page_size: raw.page_size.get(),
        unused: raw.unused.get(),
        board_name: decode_string("Android::name", &raw.name)?,
        cmdline: decode_string("Android::cmdline", &raw.cmdline)?,
        id: raw.id.map(|id| id.get()),
        ..Default::default()
    })
}

/// Compute the mkbootimg-compatible SHA-1 ID for the given sections.
pub fn compute_id(
    kernel: &[u8],
    ramdisk: &[u8],
    second: &[u8],
    dt: &[u8],
) -> Result<[u32; BOOT_ID_WORDS]> {
    let size = |field, data: &[u8]| {
        u32::try_from(data.len())
            .map(u32::to_le_bytes)
            .map_err(|_| Error::IntOverflow(field))
    };

    let mut hasher = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    hasher.update(kernel);
    hasher.update(&size("Android::kernel_size", kernel)?);
    hasher.update(ramdisk);
    hasher.update(&size("Android::ramdisk_size", ramdisk)?);
    if !second.is_empty() {
        hasher.update(second);
    }
    // mkbootimg always hashes the second stage size, even when there is no
    // second stage, but only hashes the device tree fields when present.
    hasher.update(&size("Android::second_size", second)?);
    if !dt.is_empty() {
        hasher.update(dt);
        hasher.update(&size("Android::dt_size", dt)?);
    }

    let digest = hasher.finish();
    let mut id = [0u32; BOOT_ID_WORDS];

    for (word, chunk) in id.iter_mut().zip(digest.as_ref().chunks_exact(4)) {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(chunk);
        *word = u32::from_le_bytes(bytes);
    }

    Ok(id)
}

fn section_size(field: &'static str, data: &[u8]) -> Result<u32> {
    util::check_bounds(data.len(), ..=COMPONENT_MAX_SIZE as usize)
        .map(|s| s as u32)
        .map_err(|e| Error::IntOutOfBounds(field, e))
}

/// Plain Android boot image, as produced by AOSP's mkbootimg.
pub struct AndroidFormat;

impl AndroidFormat {
    /// Parse the header at `offset` and every section that follows it.
    pub(crate) fn parse_at(data: &[u8], offset: usize) -> Result<BootImage> {
        let raw = read_header(data, offset)?;
        let sections = section_offsets(&raw)?;
        let mut image = image_from_header(&raw)?;

        debug!("Android header at offset {offset:#x}");
        trace!("Section offsets: {sections:?}");

        image.kernel = read_section(
            data,
            offset,
            sections.kernel,
            raw.kernel_size.get() as usize,
            "Android::kernel",
        )?;
        image.ramdisk = read_section(
            data,
            offset,
            sections.ramdisk,
            raw.ramdisk_size.get() as usize,
            "Android::ramdisk",
        )?;
        image.second = read_section(
            data,
            offset,
            sections.second,
            raw.second_size.get() as usize,
            "Android::second",
        )?;
        image.dt = read_section(
            data,
            offset,
            sections.dt,
            raw.dt_size.get() as usize,
            "Android::dt",
        )?;

        debug!("Ramdisk compression: {:?}", image.ramdisk_compression());

        Ok(image)
    }

    /// Serialize `image` with replacement kernel and ramdisk contents. Peer
    /// formats use this to wrap sections without touching the image.
    pub(crate) fn build_with(image: &BootImage, kernel: &[u8], ramdisk: &[u8]) -> Result<Vec<u8>> {
        if !padding::is_valid_page_size(image.page_size) {
            return Err(Error::InvalidPageSize(image.page_size));
        }

        let kernel_size = section_size("Android::kernel_size", kernel)?;
        let ramdisk_size = section_size("Android::ramdisk_size", ramdisk)?;
        let second_size = section_size("Android::second_size", &image.second)?;
        let dt_size = section_size("Android::dt_size", &image.dt)?;

        let name = image
            .board_name
            .as_bytes()
            .to_padded_array::<BOOT_NAME_SIZE>()
            .ok_or_else(|| {
                Error::StringTooLong("Android::name", BOOT_NAME_SIZE, image.board_name.clone())
            })?;
        let cmdline = image
            .cmdline
            .as_bytes()
            .to_padded_array::<BOOT_ARGS_SIZE>()
            .ok_or_else(|| {
                Error::StringTooLong("Android::cmdline", BOOT_ARGS_SIZE, image.cmdline.clone())
            })?;

        let raw = RawAndroidHeader {
            magic: BOOT_MAGIC,
            kernel_size: kernel_size.into(),
            kernel_addr: image.kernel_addr.into(),
            ramdisk_size: ramdisk_size.into(),
            ramdisk_addr: image.ramdisk_addr.into(),
            second_size: second_size.into(),
            second_addr: image.second_addr.into(),
            tags_addr: image.tags_addr.into(),
            page_size: image.page_size.into(),
            dt_size: dt_size.into(),
            unused: image.unused.into(),
            name,
            cmdline,
            id: image.id.map(|id| id.into()),
        };

        let page_size = image.page_size as usize;
        let mut buf = Vec::with_capacity(
            ANDROID_HEADER_SIZE + kernel.len() + ramdisk.len() + image.second.len() + 5 * page_size,
        );

        buf.extend_from_slice(raw.as_bytes());
        padding::write_zeros(&mut buf, page_size);

        for section in [kernel, ramdisk, image.second.as_slice(), image.dt.as_slice()] {
            buf.extend_from_slice(section);
            padding::write_zeros(&mut buf, page_size);
        }

        Ok(buf)
    }
}

impl FormatStrategy for AndroidFormat {
    fn detect(&self, data: &[u8]) -> bool {
        find_header(data, MAX_HEADER_OFFSET).is_ok()
    }

    fn parse(&self, data: &[u8]) -> Result<BootImage> {
        let offset = find_header(data, MAX_HEADER_OFFSET)?;

        Self::parse_at(data, offset)
    }

    fn build(&self, image: &BootImage) -> Result<Vec<u8>> {
        Self::build_with(image, &image.kernel, &image.ramdisk)
    }
}
