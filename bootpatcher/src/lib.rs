/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Parsing and building of Android boot images in the legacy (pre-versioned
//! header) layouts, including images patched with the Loki exploit.
//!
//! All operations work on in-memory byte buffers. [`format::bootimage`] is the
//! entry point: [`format::bootimage::BootImage::load`] detects the layout and
//! [`format::bootimage::BootImage::create`] writes it back out.

pub mod format;
pub mod patch;
pub mod util;
