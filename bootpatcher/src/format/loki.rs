// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Loki-patched boot images. Parsing undoes the patch so that the resulting
//! [`BootImage`] describes the original kernel and ramdisk.

use memchr::memmem;
use tracing::{debug, trace, warn};
use zerocopy::FromBytes;

use crate::{
    format::{
        android::{self, AndroidFormat},
        bootimage::{BootImage, Error, Format, FormatStrategy, Result},
        header::{
            DEFAULT_KERNEL_OFFSET, LOKI_HEADER_SIZE, LOKI_MAGIC, LOKI_MAGIC_OFFSET,
            RawAndroidHeader, RawLokiHeader, default_tags_addr,
        },
        padding,
    },
    patch::loki::{self as loki_patch, NON_LG_FAKE_SIZE},
    util,
};

/// The real Android header is always right at the start of a Loki image.
pub const LOKI_MAX_HEADER_OFFSET: usize = 32;

/// Loki reserves this much space at the end of old-style images.
const OLD_TRAILER_SIZE: usize = 0x200;

/// Offset of the end address word in a zImage header. Loki never modifies it.
const ZIMAGE_SIZE_OFFSET: usize = 0x2c;

const GZIP_DEFLATE_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];
const GZIP_FLAG_NAME: u8 = 0x08;
const GZIP_FLAG_NONE: u8 = 0x00;

/// Fallback ramdisk offset for Loki-era devices, relative to the base address.
const OLD_RAMDISK_OFFSET: u32 = 0x2000000;

/// LG aboot builds live in these address ranges and load a full page for the
/// fake ramdisk.
fn is_lg_ramdisk_addr(addr: u32) -> bool {
    !(0xfa00000..=0x88f00000).contains(&addr)
}

/// Original layout of the image, before the Loki patch was applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Recovered {
    kernel_size: usize,
    ramdisk_offset: usize,
    ramdisk_size: usize,
    ramdisk_addr: u32,
}

fn read_loki_header(data: &[u8]) -> Option<RawLokiHeader> {
    let (loki, _) = RawLokiHeader::read_from_prefix(data.get(LOKI_MAGIC_OFFSET..)?).ok()?;
    (loki.magic == LOKI_MAGIC).then_some(loki)
}

fn recover_new(loki: &RawLokiHeader, page_size: usize) -> Result<Recovered> {
    let kernel_size = loki.orig_kernel_size.get() as usize;
    let ramdisk_offset = padding::round(kernel_size, page_size)
        .and_then(|s| s.checked_add(page_size))
        .ok_or(Error::IntOverflow("Loki::orig_kernel_size"))?;

    Ok(Recovered {
        kernel_size,
        ramdisk_offset,
        ramdisk_size: loki.orig_ramdisk_size.get() as usize,
        ramdisk_addr: loki.ramdisk_addr.get(),
    })
}

/// Find the gzip header that starts the ramdisk. Headers with the original
/// file name flag are preferred since that is what gzip writes by default.
fn find_gzip_offset(data: &[u8], start: usize) -> Result<usize> {
    let haystack = data.get(start..).ok_or(Error::LokiNoGzipHeader)?;
    let mut fallback = None;

    for pos in memmem::find_iter(haystack, &GZIP_DEFLATE_MAGIC) {
        match haystack.get(pos + GZIP_DEFLATE_MAGIC.len()) {
            Some(&GZIP_FLAG_NAME) => return Ok(start + pos),
            Some(&GZIP_FLAG_NONE) if fallback.is_none() => fallback = Some(start + pos),
            _ => {}
        }
    }

    fallback.ok_or(Error::LokiNoGzipHeader)
}

/// Guess the ramdisk size by trimming the zero padding that precedes Loki's
/// trailer. Only the last page is considered.
fn find_ramdisk_size(data: &[u8], offset: usize, page_size: usize) -> Result<usize> {
    let end = data
        .len()
        .checked_sub(OLD_TRAILER_SIZE)
        .filter(|e| *e > offset)
        .ok_or(Error::LokiNoRamdiskSize)?;
    let start = end.saturating_sub(page_size).max(offset);

    data[start..end]
        .iter()
        .rposition(|b| *b != 0)
        .map(|pos| start + pos + 1 - offset)
        .ok_or(Error::LokiNoRamdiskSize)
}

fn find_ramdisk_addr(data: &[u8], loki: &RawLokiHeader, kernel_addr: u32) -> Result<u32> {
    let addr = loki.ramdisk_addr.get();
    if addr != 0 {
        return Ok(addr);
    }

    if let Some(addr) = loki_patch::find_shellcode_ramdisk_addr(data) {
        trace!("Ramdisk address from shellcode: {addr:#010x}");
        return Ok(addr);
    }

    warn!("Loki shellcode not found; assuming default ramdisk address");

    kernel_addr
        .checked_sub(DEFAULT_KERNEL_OFFSET)
        .and_then(|base| base.checked_add(OLD_RAMDISK_OFFSET))
        .ok_or(Error::LokiNoRamdiskAddress)
}

fn recover_old(
    data: &[u8],
    raw: &RawAndroidHeader,
    loki: &RawLokiHeader,
    page_size: usize,
) -> Result<Recovered> {
    let kernel_size = util::read_le_u32(data, page_size + ZIMAGE_SIZE_OFFSET)
        .map(|s| s as usize)
        .filter(|s| *s != 0 && util::section_range(page_size, *s, data.len()).is_some())
        .ok_or(Error::LokiNoKernelSize)?;

    let ramdisk_offset = find_gzip_offset(data, page_size + kernel_size)?;
    let ramdisk_size = find_ramdisk_size(data, ramdisk_offset, page_size)?;
    let ramdisk_addr = find_ramdisk_addr(data, loki, raw.kernel_addr.get())?;

    Ok(Recovered {
        kernel_size,
        ramdisk_offset,
        ramdisk_size,
        ramdisk_addr,
    })
}

/// Boot image patched with Loki to bypass aboot's signature check.
pub struct LokiFormat;

impl FormatStrategy for LokiFormat {
    fn detect(&self, data: &[u8]) -> bool {
        data.len() >= LOKI_MAGIC_OFFSET + LOKI_HEADER_SIZE
            && read_loki_header(data).is_some()
            && android::find_header(data, LOKI_MAX_HEADER_OFFSET).is_ok()
    }

    fn parse(&self, data: &[u8]) -> Result<BootImage> {
        let loki = read_loki_header(data).ok_or(Error::UnknownFormat)?;
        let offset = android::find_header(data, LOKI_MAX_HEADER_OFFSET)?;
        // Everything else is relative to the Android header.
        let data = &data[offset..];
        let raw = android::read_header(data, 0)?;
        let page_size = raw.page_size.get() as usize;

        let recovered = if loki.is_new_style() {
            debug!("New-style Loki image");
            recover_new(&loki, page_size)?
        } else {
            debug!("Old-style Loki image");
            recover_old(data, &raw, &loki, page_size)?
        };

        trace!("Recovered layout: {recovered:?}");

        let mut image = android::image_from_header(&raw)?;
        image.format = Format::Loki;
        image.ramdisk_addr = recovered.ramdisk_addr;
        // Loki clobbers the tags address.
        image.tags_addr = default_tags_addr(image.kernel_addr);

        image.kernel = android::read_section(
            data,
            0,
            page_size,
            recovered.kernel_size,
            "Loki::kernel",
        )?;
        image.ramdisk = android::read_section(
            data,
            0,
            recovered.ramdisk_offset,
            recovered.ramdisk_size,
            "Loki::ramdisk",
        )?;

        let dt_size = raw.dt_size.get() as usize;
        if loki.is_new_style() && dt_size != 0 {
            let fake_size = if is_lg_ramdisk_addr(raw.ramdisk_addr.get()) {
                page_size
            } else {
                NON_LG_FAKE_SIZE
            };
            let dt_offset = padding::round(recovered.ramdisk_size, page_size)
                .and_then(|s| s.checked_add(recovered.ramdisk_offset))
                .and_then(|s| s.checked_add(fake_size))
                .ok_or(Error::IntOverflow("Loki::dt_size"))?;

            image.dt = android::read_section(data, 0, dt_offset, dt_size, "Loki::dt")?;
        }

        if raw.second_size.get() != 0 {
            warn!("Ignoring second stage in Loki image");
        }

        Ok(image)
    }

    fn build(&self, image: &BootImage) -> Result<Vec<u8>> {
        if image.aboot.is_empty() {
            return Err(Error::MissingAboot);
        }

        let plain = AndroidFormat::build_with(image, &image.kernel, &image.ramdisk)?;

        Ok(loki_patch::patch(&plain, &image.aboot)?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn gzip_flag_preference() {
        let mut data = vec![0u8; 64];
        data[10..14].copy_from_slice(&[0x1f, 0x8b, 0x08, 0x00]);
        data[30..34].copy_from_slice(&[0x1f, 0x8b, 0x08, 0x08]);

        assert_eq!(find_gzip_offset(&data, 0).unwrap(), 30);
        assert_eq!(find_gzip_offset(&data[..34], 31).ok(), None);

        data[30..34].fill(0);
        assert_eq!(find_gzip_offset(&data, 0).unwrap(), 10);

        data[13] = 0x04;
        assert_matches!(find_gzip_offset(&data, 0), Err(Error::LokiNoGzipHeader));
        assert_matches!(find_gzip_offset(&data, 100), Err(Error::LokiNoGzipHeader));
    }

    #[test]
    fn ramdisk_size_trims_padding() {
        let mut data = vec![0u8; 4096 + OLD_TRAILER_SIZE];
        data[1000..1100].fill(0xaa);
        data[4096..].fill(0xbb);

        assert_eq!(find_ramdisk_size(&data, 1000, 4096).unwrap(), 100);
        // Only the last page is searched.
        assert_matches!(
            find_ramdisk_size(&data, 1000, 2048),
            Err(Error::LokiNoRamdiskSize)
        );
        assert_matches!(
            find_ramdisk_size(&data[..OLD_TRAILER_SIZE], 0, 2048),
            Err(Error::LokiNoRamdiskSize)
        );
    }

    #[test]
    fn lg_address_ranges() {
        assert!(is_lg_ramdisk_addr(0x88f10260));
        assert!(is_lg_ramdisk_addr(0xf8132a0));
        assert!(!is_lg_ramdisk_addr(0x88e0ff90));

        // Both ends of the non-LG range are exclusive of LG devices.
        assert!(is_lg_ramdisk_addr(0xf9fffff));
        assert!(!is_lg_ramdisk_addr(0xfa00000));
        assert!(!is_lg_ramdisk_addr(0x88f00000));
        assert!(is_lg_ramdisk_addr(0x88f00001));
    }
}
