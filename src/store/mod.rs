//! # Persistent Record Store
//!
//! Hands a GPS fix across the reset boundary.
//!
//! This module handles:
//! - The fixed slot layout (flag, latitude, longitude, timestamp)
//! - Reading and writing length-prefixed slots through [`codec`]
//! - The mode flag that selects the next boot phase
//! - Byte media: an in-memory image and a file-backed image

pub mod codec;

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GeoLinkerError, Result};

/// Total size of the store image in bytes
pub const STORE_CAPACITY: usize = 128;

/// Address of the single mode flag byte
pub const FLAG_ADDRESS: usize = 10;

/// Flag value meaning "a fix is stored and waiting for upload"
pub const FIX_READY_FLAG: u8 = 0x22;

/// A fixed-offset, length-prefixed string slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Address of the length byte
    pub address: usize,
    /// Slot holds at most `max_length - 1` data bytes
    pub max_length: usize,
}

impl Slot {
    /// Address range covered by this slot (length byte through last pad byte)
    pub fn range(&self) -> std::ops::Range<usize> {
        self.address..self.address + codec::slot_size(self.max_length)
    }
}

pub const LATITUDE_SLOT: Slot = Slot { address: 20, max_length: 12 };
pub const LONGITUDE_SLOT: Slot = Slot { address: 33, max_length: 12 };
pub const TIMESTAMP_SLOT: Slot = Slot { address: 46, max_length: 20 };

/// Boot phase selected by the persisted flag
///
/// This is the only state that survives a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No fix pending: read the GPS receiver
    AcquireGps,
    /// A fix is stored: upload it over the modem
    Upload,
}

impl Mode {
    /// Interpret a raw flag byte. Anything but the sentinel means acquisition.
    pub fn from_flag(flag: u8) -> Self {
        if flag == FIX_READY_FLAG {
            Mode::Upload
        } else {
            Mode::AcquireGps
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            Mode::AcquireGps => 0x00,
            Mode::Upload => FIX_READY_FLAG,
        }
    }
}

/// A single GPS fix
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    /// Latitude in decimal degrees (positive = North)
    pub latitude: f64,
    /// Longitude in decimal degrees (positive = East)
    pub longitude: f64,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

/// A fix as read back from the store, exactly as written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredFix {
    pub latitude: String,
    pub longitude: String,
    pub timestamp: String,
}

/// Byte-addressable durable medium
///
/// Byte access is infallible; the medium is assumed readable and writable.
/// Only [`ByteStore::sync`] touches the backing device and may fail.
pub trait ByteStore {
    /// Read one byte. Addresses past the end read as `0`.
    fn read_byte(&self, address: usize) -> u8;

    /// Write one byte. Addresses past the end are ignored.
    fn write_byte(&mut self, address: usize, value: u8);

    /// Make all previous writes durable
    fn sync(&mut self) -> Result<()>;
}

/// Volatile store image, used in tests and as the working copy of [`FileStore`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Erased (all-zero) image of [`STORE_CAPACITY`] bytes
    pub fn new() -> Self {
        Self {
            bytes: vec![0; STORE_CAPACITY],
        }
    }

    /// Build an image from raw bytes, padding or truncating to capacity
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.resize(STORE_CAPACITY, 0);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteStore for MemoryStore {
    fn read_byte(&self, address: usize) -> u8 {
        self.bytes.get(address).copied().unwrap_or(0)
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(address) {
            *byte = value;
        }
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Store image persisted to a file
///
/// The whole image is loaded on open and rewritten on every sync through a
/// temporary file and a rename. Both the file data and the directory entry
/// are flushed to disk before `sync` returns, so a reset right afterwards
/// finds either the old or the new image.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: MemoryStore,
}

impl FileStore {
    /// Open the image at `path`
    ///
    /// A missing file is treated as an erased store.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let image = match fs::read(&path) {
            Ok(bytes) => {
                debug!("Loaded store image {} ({} bytes)", path.display(), bytes.len());
                MemoryStore::from_bytes(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No store image at {}, starting erased", path.display());
                MemoryStore::new()
            }
            Err(e) => {
                return Err(GeoLinkerError::Store(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn read_byte(&self, address: usize) -> u8 {
        self.image.read_byte(address)
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        self.image.write_byte(address, value);
    }

    fn sync(&mut self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let tmp = self.path.with_extension("tmp");
        write_synced(&tmp, self.image.as_bytes()).map_err(|e| {
            GeoLinkerError::Store(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            GeoLinkerError::Store(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;
        sync_dir(&parent).map_err(|e| {
            GeoLinkerError::Store(format!("Failed to sync {}: {}", parent.display(), e))
        })?;

        debug!("Synced store image {}", self.path.display());
        Ok(())
    }
}

/// Write `data` to `path` and wait until it is on disk
fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Persist the directory entry of a rename
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Slot-level view over a [`ByteStore`]
#[derive(Debug)]
pub struct RecordStore<S: ByteStore> {
    medium: S,
}

impl<S: ByteStore> RecordStore<S> {
    pub fn new(medium: S) -> Self {
        Self { medium }
    }

    pub fn medium(&self) -> &S {
        &self.medium
    }

    /// Store `value` in `slot`, truncating silently to `max_length - 1` bytes
    pub fn write(&mut self, slot: Slot, value: &str) {
        let mut buffer = vec![0u8; codec::slot_size(slot.max_length)];
        let len = codec::encode(&mut buffer, value.as_bytes());

        for (offset, byte) in buffer.iter().enumerate() {
            self.medium.write_byte(slot.address + offset, *byte);
        }

        debug!("Stored '{}' at addr {} with length {}", value, slot.address, len);
    }

    /// Read the string in `slot`; a corrupted length byte is clamped
    pub fn read(&self, slot: Slot) -> String {
        let buffer: Vec<u8> = slot.range().map(|addr| self.medium.read_byte(addr)).collect();
        let value = String::from_utf8_lossy(codec::decode(&buffer)).into_owned();

        debug!("Read '{}' from addr {} with length {}", value, slot.address, value.len());
        value
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.medium.write_byte(FLAG_ADDRESS, mode.flag());
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flag(self.medium.read_byte(FLAG_ADDRESS))
    }

    /// Zero the flag and every slot byte, length bytes included
    pub fn clear_all(&mut self) {
        self.medium.write_byte(FLAG_ADDRESS, 0x00);
        for addr in LATITUDE_SLOT.address..TIMESTAMP_SLOT.range().end {
            self.medium.write_byte(addr, 0x00);
        }
        debug!("Store cleared including length bytes");
    }

    /// Persist a fix and mark it ready for upload
    ///
    /// Coordinates are stored with 6 fraction digits.
    ///
    /// # Errors
    ///
    /// Returns error if the medium cannot be synced
    pub fn save_fix(&mut self, fix: &Fix) -> Result<()> {
        let latitude = format!("{:.6}", fix.latitude);
        let longitude = format!("{:.6}", fix.longitude);

        self.write(LATITUDE_SLOT, &latitude);
        self.write(LONGITUDE_SLOT, &longitude);
        self.write(TIMESTAMP_SLOT, &fix.timestamp);
        self.set_mode(Mode::Upload);
        self.medium.sync()
    }

    pub fn load_fix(&self) -> StoredFix {
        StoredFix {
            latitude: self.read(LATITUDE_SLOT),
            longitude: self.read(LONGITUDE_SLOT),
            timestamp: self.read(TIMESTAMP_SLOT),
        }
    }

    /// Clear everything and make the erase durable
    pub fn erase(&mut self) -> Result<()> {
        self.clear_all();
        self.medium.sync()
    }
}
