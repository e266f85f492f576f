// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

static GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";
static LZ4_LEGACY_MAGIC: &[u8; 2] = b"\x02\x21";
static LZ4_FRAME_MAGIC: &[u8; 2] = b"\x04\x22";

/// Compression format of a ramdisk, as guessed from its leading bytes. This is
/// informational only and never affects how the ramdisk bytes are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RamdiskCompression {
    Gzip,
    Lz4,
    Unknown,
}

impl RamdiskCompression {
    pub fn detect(data: &[u8]) -> Self {
        match data.get(..2) {
            Some(m) if m == GZIP_MAGIC => Self::Gzip,
            Some(m) if m == LZ4_LEGACY_MAGIC || m == LZ4_FRAME_MAGIC => Self::Lz4,
            _ => Self::Unknown,
        }
    }

    /// File extension conventionally used when the ramdisk is extracted.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Lz4 => "lz4",
            Self::Unknown => "img",
        }
    }
}
