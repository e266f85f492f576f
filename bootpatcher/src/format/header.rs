// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! On-disk layouts shared by the boot image formats. All multi-byte fields are
//! little-endian and every struct is packed, so they can be read from and
//! written to arbitrary offsets of a byte buffer.

use std::mem;

use zerocopy::little_endian;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_ID_WORDS: usize = 8;

pub const LOKI_MAGIC: [u8; 4] = *b"LOKI";
/// Loki always stores its header at this offset within the header page.
pub const LOKI_MAGIC_OFFSET: usize = 0x400;
pub const LOKI_BUILD_SIZE: usize = 128;

pub const DEFAULT_BASE: u32 = 0x10000000;
pub const DEFAULT_KERNEL_OFFSET: u32 = 0x00008000;
pub const DEFAULT_RAMDISK_OFFSET: u32 = 0x01000000;
pub const DEFAULT_SECOND_OFFSET: u32 = 0x00f00000;
pub const DEFAULT_TAGS_OFFSET: u32 = 0x00000100;
pub const DEFAULT_PAGE_SIZE: u32 = 2048;

/// Raw on-disk layout for the Android boot image header. This is the
/// pre-versioning layout where the word after `page_size` holds the device
/// tree size.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
pub struct RawAndroidHeader {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    pub magic: [u8; 8],
    pub kernel_size: little_endian::U32,
    pub kernel_addr: little_endian::U32,
    pub ramdisk_size: little_endian::U32,
    pub ramdisk_addr: little_endian::U32,
    pub second_size: little_endian::U32,
    pub second_addr: little_endian::U32,
    pub tags_addr: little_endian::U32,
    pub page_size: little_endian::U32,
    pub dt_size: little_endian::U32,
    pub unused: little_endian::U32,
    pub name: [u8; BOOT_NAME_SIZE],
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [little_endian::U32; BOOT_ID_WORDS],
}

pub const ANDROID_HEADER_SIZE: usize = mem::size_of::<RawAndroidHeader>();

/// Raw on-disk layout for the Loki header at [`LOKI_MAGIC_OFFSET`].
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
pub struct RawLokiHeader {
    /// Magic value. This should be equal to [`LOKI_MAGIC`].
    pub magic: [u8; 4],
    pub recovery: little_endian::U32,
    pub build: [u8; LOKI_BUILD_SIZE],
    pub orig_kernel_size: little_endian::U32,
    pub orig_ramdisk_size: little_endian::U32,
    pub ramdisk_addr: little_endian::U32,
}

pub const LOKI_HEADER_SIZE: usize = mem::size_of::<RawLokiHeader>();

impl RawLokiHeader {
    /// Images patched by newer versions of loki_patch record the original
    /// kernel and ramdisk layout. Older versions left these fields zeroed.
    pub fn is_new_style(&self) -> bool {
        self.orig_kernel_size.get() != 0
            && self.orig_ramdisk_size.get() != 0
            && self.ramdisk_addr.get() != 0
    }
}

/// Default kernel tags address for an image whose kernel is loaded at
/// `kernel_addr`.
pub fn default_tags_addr(kernel_addr: u32) -> u32 {
    kernel_addr
        .checked_sub(DEFAULT_KERNEL_OFFSET)
        .unwrap_or(DEFAULT_BASE)
        .wrapping_add(DEFAULT_TAGS_OFFSET)
}
