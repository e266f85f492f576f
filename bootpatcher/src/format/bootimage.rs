// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    str::Utf8Error,
};

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    format::{
        android::{self, AndroidFormat},
        bump::BumpFormat,
        compression::RamdiskCompression,
        header::{
            BOOT_ID_WORDS, DEFAULT_BASE, DEFAULT_KERNEL_OFFSET, DEFAULT_PAGE_SIZE,
            DEFAULT_RAMDISK_OFFSET, DEFAULT_SECOND_OFFSET, DEFAULT_TAGS_OFFSET,
        },
        loki::LokiFormat,
        mtk::{MtkExtra, MtkFormat},
    },
    patch,
    util::{NumBytes, OutOfBoundsError},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown boot image format")]
    UnknownFormat,
    #[error("Image ({0} bytes) is smaller than the boot image header")]
    SmallerThanHeader(usize),
    #[error("No Android header found within the first {0} bytes")]
    NoAndroidHeader(usize),
    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),
    #[error("{field:?} ({offset:#x}+{size:#x}) exceeds image size ({len:#x})")]
    SectionOutOfBounds {
        field: &'static str,
        offset: usize,
        size: usize,
        len: usize,
    },
    #[error("{0:?} field is out of bounds")]
    IntOutOfBounds(&'static str, #[source] OutOfBoundsError),
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("{0:?} field is not UTF-8 encoded: {data:?}", data = .2.as_bstr())]
    StringNotUtf8(&'static str, #[source] Utf8Error, Vec<u8>),
    #[error("{0:?} field is too long (>{1}): {2:?}")]
    StringTooLong(&'static str, usize, String),
    #[error("Loki image has no gzip header after the kernel")]
    LokiNoGzipHeader,
    #[error("Failed to determine the original ramdisk size of Loki image")]
    LokiNoRamdiskSize,
    #[error("Failed to determine the original kernel size of Loki image")]
    LokiNoKernelSize,
    #[error("Failed to determine the original ramdisk address of Loki image")]
    LokiNoRamdiskAddress,
    #[error("An aboot image is required to build a Loki image")]
    MissingAboot,
    #[error("Failed to apply Loki patch")]
    LokiPatch(#[from] patch::loki::Error),
    #[error("{0:?} section has no MTK header")]
    MtkMissingHeader(&'static str),
    #[error("{field:?} MTK header size ({header}) does not match section size ({actual})")]
    MtkSizeMismatch {
        field: &'static str,
        header: u32,
        actual: usize,
    },
    #[error("Failed to serialize header TOML")]
    TomlSerialize(#[source] toml_edit::ser::Error),
    #[error("Failed to parse header TOML")]
    TomlDeserialize(#[source] toml_edit::de::Error),
    #[error("Failed to open file: {0:?}")]
    FileOpen(PathBuf, #[source] io::Error),
    #[error("Failed to read file: {0:?}")]
    FileRead(PathBuf, #[source] io::Error),
    #[error("Failed to write file: {0:?}")]
    FileWrite(PathBuf, #[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Common operations implemented by every on-disk boot image layout.
pub trait FormatStrategy {
    /// Cheaply check whether `data` looks like this format. This never fails;
    /// malformed input simply isn't detected.
    fn detect(&self, data: &[u8]) -> bool;

    /// Parse `data` into a new [`BootImage`].
    fn parse(&self, data: &[u8]) -> Result<BootImage>;

    /// Serialize `image` into this format's layout.
    fn build(&self, image: &BootImage) -> Result<Vec<u8>>;

    /// Compute the header ID for the sections as they would be written to
    /// disk by [`Self::build`].
    fn compute_id(&self, image: &BootImage) -> Result<[u32; BOOT_ID_WORDS]> {
        android::compute_id(&image.kernel, &image.ramdisk, &image.second, &image.dt)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum Format {
    #[default]
    Android,
    Loki,
    Bump,
    Mtk,
}

impl Format {
    /// Order in which detectors are tried. Loki images also contain a valid
    /// Android header, so the more specific formats must come first.
    pub const DETECTION_ORDER: [Self; 4] = [Self::Loki, Self::Bump, Self::Mtk, Self::Android];

    fn strategy(self) -> &'static dyn FormatStrategy {
        match self {
            Self::Android => &AndroidFormat,
            Self::Loki => &LokiFormat,
            Self::Bump => &BumpFormat,
            Self::Mtk => &MtkFormat,
        }
    }

    /// Find the first format, in [`Self::DETECTION_ORDER`], that recognizes
    /// `data`.
    pub fn detect(data: &[u8]) -> Option<Self> {
        Self::DETECTION_ORDER
            .into_iter()
            .find(|f| f.strategy().detect(data))
    }

    pub fn matches(self, data: &[u8]) -> bool {
        self.strategy().detect(data)
    }

    pub fn parse(self, data: &[u8]) -> Result<BootImage> {
        self.strategy().parse(data)
    }

    pub fn build(self, image: &BootImage) -> Result<Vec<u8>> {
        self.strategy().build(image)
    }

    pub fn compute_id(self, image: &BootImage) -> Result<[u32; BOOT_ID_WORDS]> {
        self.strategy().compute_id(image)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Android => "Android",
            Self::Loki => "Loki",
            Self::Bump => "Bump",
            Self::Mtk => "MTK",
        };

        f.write_str(name)
    }
}

/// Format-independent representation of a boot image. Component sizes are not
/// stored; they are always derived from the buffers.
#[derive(Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootImage {
    /// Layout used by [`Self::create`].
    pub format: Format,
    pub kernel_addr: u32,
    pub ramdisk_addr: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub unused: u32,
    pub board_name: String,
    pub cmdline: String,
    pub id: [u32; BOOT_ID_WORDS],
    pub mtk: Option<MtkExtra>,
    // Images.
    #[serde(skip)]
    pub kernel: Vec<u8>,
    #[serde(skip)]
    pub ramdisk: Vec<u8>,
    #[serde(skip)]
    pub second: Vec<u8>,
    #[serde(skip)]
    pub dt: Vec<u8>,
    /// Copy of the device's aboot partition. Only needed for building Loki
    /// images.
    #[serde(skip)]
    pub aboot: Vec<u8>,
}

impl Default for BootImage {
    fn default() -> Self {
        Self {
            format: Format::default(),
            kernel_addr: DEFAULT_BASE + DEFAULT_KERNEL_OFFSET,
            ramdisk_addr: DEFAULT_BASE + DEFAULT_RAMDISK_OFFSET,
            second_addr: DEFAULT_BASE + DEFAULT_SECOND_OFFSET,
            tags_addr: DEFAULT_BASE + DEFAULT_TAGS_OFFSET,
            page_size: DEFAULT_PAGE_SIZE,
            unused: 0,
            board_name: String::new(),
            cmdline: String::new(),
            id: [0; BOOT_ID_WORDS],
            mtk: None,
            kernel: vec![],
            ramdisk: vec![],
            second: vec![],
            dt: vec![],
            aboot: vec![],
        }
    }
}

impl fmt::Debug for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootImage")
            .field("format", &self.format)
            .field("kernel_addr", &self.kernel_addr)
            .field("ramdisk_addr", &self.ramdisk_addr)
            .field("second_addr", &self.second_addr)
            .field("tags_addr", &self.tags_addr)
            .field("page_size", &self.page_size)
            .field("unused", &self.unused)
            .field("board_name", &self.board_name)
            .field("cmdline", &self.cmdline)
            .field("id", &self.id)
            .field("mtk", &self.mtk)
            .field("kernel", &NumBytes(self.kernel.len()))
            .field("ramdisk", &NumBytes(self.ramdisk.len()))
            .field("second", &NumBytes(self.second.len()))
            .field("dt", &NumBytes(self.dt.len()))
            .field("aboot", &NumBytes(self.aboot.len()))
            .finish()
    }
}

impl fmt::Display for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} boot image:", self.format)?;
        writeln!(f, "- Kernel size:          {}", self.kernel.len())?;
        writeln!(f, "- Kernel address:       {:#x}", self.kernel_addr)?;
        writeln!(f, "- Ramdisk size:         {}", self.ramdisk.len())?;
        writeln!(f, "- Ramdisk address:      {:#x}", self.ramdisk_addr)?;
        writeln!(f, "- Ramdisk compression:  {:?}", self.ramdisk_compression())?;
        writeln!(f, "- Second stage size:    {}", self.second.len())?;
        writeln!(f, "- Second stage address: {:#x}", self.second_addr)?;
        writeln!(f, "- Device tree size:     {}", self.dt.len())?;
        writeln!(f, "- Kernel tags address:  {:#x}", self.tags_addr)?;
        writeln!(f, "- Page size:            {}", self.page_size)?;
        writeln!(f, "- Board name:           {:?}", self.board_name)?;
        writeln!(f, "- Kernel cmdline:       {:?}", self.cmdline)?;
        write!(f, "- ID:                   {:08x?}", self.id)?;

        if let Some(mtk) = &self.mtk {
            writeln!(f)?;
            writeln!(f, "- MTK kernel type:      {:?}", mtk.kernel_type)?;
            write!(f, "- MTK ramdisk type:     {:?}", mtk.ramdisk_type)?;
        }

        Ok(())
    }
}

impl BootImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the format of `data` and parse it. The detected format is stored
    /// in [`Self::format`] so that [`Self::create`] writes the same layout.
    pub fn load(data: &[u8]) -> Result<Self> {
        let Some(format) = Format::detect(data) else {
            trace!("No detector matched {} byte input", data.len());
            return Err(Error::UnknownFormat);
        };

        debug!("Detected {format} boot image");

        format.parse(data)
    }

    /// Serialize the image using [`Self::format`].
    pub fn create(&self) -> Result<Vec<u8>> {
        self.format.build(self)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::FileOpen(path.to_owned(), e))?;
        let mut data = vec![];
        file.read_to_end(&mut data)
            .map_err(|e| Error::FileRead(path.to_owned(), e))?;

        Self::load(&data)
    }

    pub fn create_file(&self, path: &Path) -> Result<()> {
        let data = self.create()?;

        let mut file = File::create(path).map_err(|e| Error::FileOpen(path.to_owned(), e))?;
        file.write_all(&data)
            .map_err(|e| Error::FileWrite(path.to_owned(), e))?;
        file.flush()
            .map_err(|e| Error::FileWrite(path.to_owned(), e))?;

        Ok(())
    }

    /// Serialize the header fields (everything except the component images).
    pub fn to_toml(&self) -> Result<String> {
        toml_edit::ser::to_string_pretty(self).map_err(Error::TomlSerialize)
    }

    /// Create an image with header fields from TOML produced by
    /// [`Self::to_toml`]. All component images are empty.
    pub fn from_toml(data: &str) -> Result<Self> {
        toml_edit::de::from_str(data).map_err(Error::TomlDeserialize)
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel.len()
    }

    pub fn ramdisk_size(&self) -> usize {
        self.ramdisk.len()
    }

    pub fn second_size(&self) -> usize {
        self.second.len()
    }

    pub fn dt_size(&self) -> usize {
        self.dt.len()
    }

    pub fn ramdisk_compression(&self) -> RamdiskCompression {
        RamdiskCompression::detect(&self.ramdisk)
    }

    /// Compute the SHA-1 based header ID for the current contents.
    pub fn compute_id(&self) -> Result<[u32; BOOT_ID_WORDS]> {
        self.format.compute_id(self)
    }

    /// Recompute and store the header ID.
    pub fn update_id(&mut self) -> Result<()> {
        self.id = self.compute_id()?;
        Ok(())
    }

    /// Set all load addresses relative to `base` using the standard mkbootimg
    /// offsets.
    pub fn set_addresses_from_base(&mut self, base: u32) -> Result<()> {
        let offset = |o: u32, field| base.checked_add(o).ok_or(Error::IntOverflow(field));

        self.kernel_addr = offset(DEFAULT_KERNEL_OFFSET, "BootImage::kernel_addr")?;
        self.ramdisk_addr = offset(DEFAULT_RAMDISK_OFFSET, "BootImage::ramdisk_addr")?;
        self.second_addr = offset(DEFAULT_SECOND_OFFSET, "BootImage::second_addr")?;
        self.tags_addr = offset(DEFAULT_TAGS_OFFSET, "BootImage::tags_addr")?;

        Ok(())
    }
}
