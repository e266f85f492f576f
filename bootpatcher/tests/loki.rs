/*
 * SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::io::Write;

use assert_matches::assert_matches;
use bootpatcher::{
    format::bootimage::{BootImage, Error, Format},
    patch::loki::{self, LG_PATTERN, PATTERNS},
};
use flate2::{Compression, GzBuilder};

/// Samsung Galaxy S4 (AT&T): check_sigs = 0x88e0ff98, hdr = 0x88f3bafc.
const SAMSUNG_ABOOT_ADDR: u32 = 0x88e00000;
const SAMSUNG_CHECK_SIGS_OFFSET: usize = 0xffc0;

/// LG G2 (AT&T D80010d): check_sigs = 0xf8132ac, hdr = 0xf906440.
const LG_ABOOT_ADDR: u32 = 0xf800028;
const LG_CHECK_SIGS_OFFSET: usize = 0x132ac;

const KERNEL_ADDR: u32 = 0x80208000;
const RAMDISK_ADDR: u32 = 0x81000000;

fn aboot(len: usize, load_addr: u32, offset: usize, pattern: &[u8; 8]) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[12..16].copy_from_slice(&load_addr.to_le_bytes());

    let code_end = (offset + 0x800).min(len);
    data[offset..code_end].fill(0x5a);
    data[offset..offset + pattern.len()].copy_from_slice(pattern);

    data
}

fn samsung_aboot() -> Vec<u8> {
    aboot(0x10200, SAMSUNG_ABOOT_ADDR, SAMSUNG_CHECK_SIGS_OFFSET, &PATTERNS[0])
}

fn lg_aboot() -> Vec<u8> {
    aboot(0x14000, LG_ABOOT_ADDR, LG_CHECK_SIGS_OFFSET, &LG_PATTERN)
}

/// Fake zImage that records its own size in the header like a real one.
fn zimage(size: usize) -> Vec<u8> {
    let mut data = vec![0xaa; size];
    data[0x2c..0x30].copy_from_slice(&(size as u32).to_le_bytes());
    data
}

fn gzip_ramdisk() -> Vec<u8> {
    let mut encoder = GzBuilder::new()
        .filename("ramdisk.cpio")
        .write(Vec::new(), Compression::default());
    encoder
        .write_all(b"070701 not really a cpio archive, but close enough")
        .unwrap();
    encoder.finish().unwrap()
}

fn plain_image() -> BootImage {
    BootImage {
        kernel_addr: KERNEL_ADDR,
        ramdisk_addr: RAMDISK_ADDR,
        tags_addr: 0x80200100,
        page_size: 2048,
        cmdline: "console=ttyHSL0,115200,n8".to_owned(),
        kernel: zimage(3000),
        ramdisk: gzip_ramdisk(),
        ..Default::default()
    }
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn samsung_patched() -> (BootImage, Vec<u8>) {
    let image = plain_image();
    let patched = loki::patch(&image.create().unwrap(), &samsung_aboot()).unwrap();
    (image, patched)
}

/// Zero out the original layout fields like early versions of loki_patch.
fn make_old_style(data: &mut [u8], fields: &[usize]) {
    for field in fields {
        let offset = 0x400 + 136 + field * 4;
        data[offset..offset + 4].fill(0);
    }
}

#[test]
fn patch_layout() {
    let (image, patched) = samsung_patched();
    let ramdisk_len = image.ramdisk.len();
    assert!(ramdisk_len < 2048);

    // Header page, kernel pages, ramdisk pages, then the aboot copy.
    let fake_start = 2048 + 4096 + 2048;
    assert_eq!(patched.len(), fake_start + 0x200);

    assert_eq!(le_u32(&patched, 8), 4096 + ramdisk_len as u32);
    assert_eq!(le_u32(&patched, 16), 0);
    assert_eq!(le_u32(&patched, 20), 0x88e0ff90);

    assert_eq!(&patched[0x400..0x404], b"LOKI");
    assert_eq!(le_u32(&patched, 0x404), 0);
    assert!(patched[0x408..].starts_with(b"JDQ39.I337UCUAMDB or JDQ39.I337UCUAMDL\0"));
    assert_eq!(le_u32(&patched, 0x400 + 136), 3000);
    assert_eq!(le_u32(&patched, 0x400 + 140), ramdisk_len as u32);
    assert_eq!(le_u32(&patched, 0x400 + 144), KERNEL_ADDR + 4096);

    assert_eq!(&patched[2048..2048 + 3000], image.kernel.as_slice());
    assert_eq!(
        &patched[2048 + 4096..2048 + 4096 + ramdisk_len],
        image.ramdisk.as_slice(),
    );

    // check_sigs is 8 bytes past a 16-byte boundary.
    let aboot = samsung_aboot();
    let shellcode_start = fake_start + 8;
    let shellcode_end = shellcode_start + loki::SHELLCODE_SIZE;
    assert_eq!(&patched[fake_start..shellcode_start], &PATTERNS[0]);
    assert_eq!(
        patched[shellcode_start..shellcode_end],
        loki::patch_shellcode(0x88f3bafc, RAMDISK_ADDR),
    );
    assert_eq!(
        &patched[shellcode_end..],
        &aboot[SAMSUNG_CHECK_SIGS_OFFSET + 8 + loki::SHELLCODE_SIZE
            ..SAMSUNG_CHECK_SIGS_OFFSET + 0x200],
    );
}

#[test]
fn new_style_parse() {
    let (image, patched) = samsung_patched();

    let parsed = BootImage::load(&patched).unwrap();
    assert_eq!(parsed.format, Format::Loki);
    assert_eq!(parsed.kernel, image.kernel);
    assert_eq!(parsed.ramdisk, image.ramdisk);
    assert_eq!(parsed.kernel_addr, KERNEL_ADDR);
    // Stored as-is from the Loki header.
    assert_eq!(parsed.ramdisk_addr, KERNEL_ADDR + 4096);
    assert_eq!(parsed.tags_addr, 0x80200100);
    assert_eq!(parsed.page_size, 2048);
    assert_eq!(parsed.cmdline, image.cmdline);
    assert!(parsed.second.is_empty());
    assert!(parsed.dt.is_empty());
}

#[test]
fn tags_addr_reset() {
    let (_, mut patched) = samsung_patched();
    patched[32..36].copy_from_slice(&0xdeadbeefu32.to_le_bytes());

    let parsed = BootImage::load(&patched).unwrap();
    assert_eq!(parsed.tags_addr, 0x80200100);
}

#[test]
fn old_style_parse() {
    let (image, mut patched) = samsung_patched();
    make_old_style(&mut patched, &[0, 1, 2]);

    let parsed = BootImage::load(&patched).unwrap();
    assert_eq!(parsed.format, Format::Loki);
    assert_eq!(parsed.kernel, image.kernel);
    assert_eq!(parsed.ramdisk_addr, RAMDISK_ADDR);

    // The gzip trailer may end in zeros, which are indistinguishable from
    // padding.
    let (prefix, rest) = image.ramdisk.split_at(parsed.ramdisk.len());
    assert_eq!(parsed.ramdisk, prefix);
    assert!(rest.iter().all(|b| *b == 0));
}

#[test]
fn any_zero_field_selects_old_style() {
    for field in 0..3 {
        let (image, mut patched) = samsung_patched();
        make_old_style(&mut patched, &[field]);

        let parsed = BootImage::load(&patched).unwrap();
        assert_eq!(parsed.kernel, image.kernel);
        // The heuristic trims the zero high bytes of the gzip size trailer,
        // which only happens on the old-style path.
        assert!(image.ramdisk.starts_with(&parsed.ramdisk));
        assert!(parsed.ramdisk.len() < image.ramdisk.len());

        if field == 2 {
            assert_eq!(parsed.ramdisk_addr, RAMDISK_ADDR);
        } else {
            // A non-zero stored address is used directly.
            assert_eq!(parsed.ramdisk_addr, KERNEL_ADDR + 4096);
        }
    }
}

#[test]
fn old_style_default_ramdisk_addr() {
    let (_, mut patched) = samsung_patched();
    make_old_style(&mut patched, &[0, 1, 2]);

    // Destroy the shellcode.
    let shellcode_start = 2048 + 4096 + 2048 + 8;
    patched[shellcode_start..shellcode_start + 56].fill(0);

    let parsed = BootImage::load(&patched).unwrap();
    assert_eq!(parsed.ramdisk_addr, KERNEL_ADDR - 0x8000 + 0x2000000);
}

#[test]
fn old_style_failures() {
    let (_, mut patched) = samsung_patched();
    make_old_style(&mut patched, &[0, 1, 2]);

    let mut no_kernel_size = patched.clone();
    no_kernel_size[2048 + 0x2c..2048 + 0x30].fill(0);
    assert_matches!(
        BootImage::load(&no_kernel_size),
        Err(Error::LokiNoKernelSize)
    );

    let mut no_gzip = patched;
    no_gzip[2048 + 4096..2048 + 4096 + 4].fill(0);
    assert_matches!(BootImage::load(&no_gzip), Err(Error::LokiNoGzipHeader));
}

#[test]
fn lg_layout() {
    let mut image = plain_image();
    image.dt = b"dt data".to_vec();

    let aboot = lg_aboot();
    let patched = loki::patch(&image.create().unwrap(), &aboot).unwrap();

    // LG bootloaders load a full page of fake ramdisk.
    let fake_start = 2048 + 4096 + 2048;
    assert_eq!(patched.len(), fake_start + 2048 + image.dt.len());
    assert_eq!(le_u32(&patched, 16), 2048);
    assert_eq!(le_u32(&patched, 20), 0xf8132a0);
    assert!(patched[0x408..].starts_with(b"D80010d\0"));

    let shellcode_start = fake_start + 0xc;
    assert_eq!(
        patched[shellcode_start..shellcode_start + loki::SHELLCODE_SIZE],
        loki::patch_shellcode(0xf906440, RAMDISK_ADDR),
    );
    assert_eq!(&patched[fake_start + 2048..], b"dt data");

    let parsed = BootImage::load(&patched).unwrap();
    assert_eq!(parsed.format, Format::Loki);
    assert_eq!(parsed.kernel, image.kernel);
    assert_eq!(parsed.ramdisk, image.ramdisk);
    assert_eq!(parsed.dt, image.dt);
}

#[test]
fn first_pass_patterns_take_precedence() {
    let mut aboot = aboot(0x10200, SAMSUNG_ABOOT_ADDR, SAMSUNG_CHECK_SIGS_OFFSET, &PATTERNS[3]);
    aboot[0x100..0x108].copy_from_slice(&LG_PATTERN);

    let (offset, target) = loki::find_target(&aboot).unwrap();
    assert_eq!(offset, SAMSUNG_CHECK_SIGS_OFFSET);
    assert_eq!(target.check_sigs, 0x88e0ff98);

    // The earliest first pass match wins.
    aboot[0x200..0x208].copy_from_slice(&PATTERNS[4]);
    assert_matches!(
        loki::find_target(&aboot),
        Err(loki::Error::UnsupportedDevice(0x88e001d8))
    );
}

#[test]
fn unsupported_aboot() {
    let mut aboot = vec![0u8; 0x10000];
    aboot[12..16].copy_from_slice(&SAMSUNG_ABOOT_ADDR.to_le_bytes());

    let data = plain_image().create().unwrap();
    assert_matches!(
        loki::patch(&data, &aboot),
        Err(loki::Error::UnsupportedAboot)
    );

    let image = BootImage {
        format: Format::Loki,
        aboot,
        ..plain_image()
    };
    assert_matches!(
        image.create(),
        Err(Error::LokiPatch(loki::Error::UnsupportedAboot))
    );
}

#[test]
fn unsupported_device() {
    let aboot = aboot(0x10200, SAMSUNG_ABOOT_ADDR, 0xffd0, &PATTERNS[0]);
    let data = plain_image().create().unwrap();

    assert_matches!(
        loki::patch(&data, &aboot),
        Err(loki::Error::UnsupportedDevice(0x88e0ffa8))
    );
}

#[test]
fn aboot_copy_out_of_bounds() {
    let aboot = aboot(0x10000, SAMSUNG_ABOOT_ADDR, SAMSUNG_CHECK_SIGS_OFFSET, &PATTERNS[0]);
    let data = plain_image().create().unwrap();

    assert_matches!(
        loki::patch(&data, &aboot),
        Err(loki::Error::SectionOutOfBounds {
            name: "aboot",
            offset: SAMSUNG_CHECK_SIGS_OFFSET,
            size: 0x200,
            len: 0x10000,
        })
    );
}

#[test]
fn second_stage_rejected() {
    let image = BootImage {
        second: b"second".to_vec(),
        ..plain_image()
    };

    assert_matches!(
        loki::patch(&image.create().unwrap(), &samsung_aboot()),
        Err(loki::Error::SecondStageUnsupported)
    );
}

#[test]
fn build_through_facade() {
    let (image, patched) = samsung_patched();

    let mut loki_image = BootImage {
        format: Format::Loki,
        ..image
    };
    assert_matches!(loki_image.create(), Err(Error::MissingAboot));

    loki_image.aboot = samsung_aboot();
    assert_eq!(loki_image.create().unwrap(), patched);
}
