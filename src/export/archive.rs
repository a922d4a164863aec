//! Minimal ZIP writer: stored (uncompressed) entries only.
//!
//! Layout per entry: local file header (30 bytes + name) then the data.
//! After the entries comes the central directory (46 bytes + name per entry)
//! and the 22-byte end-of-central-directory record. Names are UTF-8 and
//! flagged as such.

use crate::convert::unique_name;
use crate::error::{Result, TakeoutError};
use chrono::{DateTime, Datelike, Timelike, Utc};
use once_cell::sync::Lazy;
use std::collections::HashSet;

const LOCAL_HEADER: u32 = 0x0403_4b50;
const CENTRAL_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL: u32 = 0x0605_4b50;
const VERSION: u16 = 20;
const UTF8_NAMES: u16 = 0x0800;
const STORED: u16 = 0;

static CRC_TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (n, slot) in table.iter_mut().enumerate() {
        let mut c = n as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
        }
        *slot = c;
    }
    table
});

/// CRC-32 (IEEE, reflected) as used by ZIP
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}

/// MS-DOS time and date words
fn dos_timestamp(at: DateTime<Utc>) -> (u16, u16) {
    let year = at.year().clamp(1980, 2107) as u16;
    let time = ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | (at.second() as u16 / 2);
    let date = ((year - 1980) << 9) | ((at.month() as u16) << 5) | at.day() as u16;
    (time, date)
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    data: Vec<u8>,
}

/// In-memory archive collecting `{filename, bytes}` pairs
#[derive(Debug, Clone)]
pub struct Archive {
    entries: Vec<Entry>,
    names: HashSet<String>,
    modified: DateTime<Utc>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashSet::new(),
            modified: Utc::now(),
        }
    }

    /// Builder method: set the modification time stamped on every entry
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    /// Add a file; a taken name becomes `name (2).ext`. Returns the stored name.
    pub fn add(&mut self, name: &str, data: Vec<u8>) -> String {
        let name = unique_name(name, &self.names);
        self.names.insert(name.clone());
        self.entries.push(Entry {
            name: name.clone(),
            data,
        });
        name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Serialize the archive
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| TakeoutError::Archive(format!("{} entries exceed the ZIP limit", self.entries.len())))?;
        let (time, date) = dos_timestamp(self.modified);

        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in &self.entries {
            let name = entry.name.as_bytes();
            let name_len = u16::try_from(name.len())
                .map_err(|_| TakeoutError::Archive(format!("entry name too long: {}", entry.name)))?;
            let size = u32::try_from(entry.data.len())
                .map_err(|_| TakeoutError::Archive(format!("{} is too large for ZIP", entry.name)))?;
            let offset = u32::try_from(out.len())
                .map_err(|_| TakeoutError::Archive("archive exceeds 4 GiB".to_string()))?;
            let crc = crc32(&entry.data);

            put32(&mut out, LOCAL_HEADER);
            put16(&mut out, VERSION);
            put16(&mut out, UTF8_NAMES);
            put16(&mut out, STORED);
            put16(&mut out, time);
            put16(&mut out, date);
            put32(&mut out, crc);
            put32(&mut out, size);
            put32(&mut out, size);
            put16(&mut out, name_len);
            put16(&mut out, 0);
            out.extend_from_slice(name);
            out.extend_from_slice(&entry.data);

            put32(&mut central, CENTRAL_HEADER);
            put16(&mut central, VERSION);
            put16(&mut central, VERSION);
            put16(&mut central, UTF8_NAMES);
            put16(&mut central, STORED);
            put16(&mut central, time);
            put16(&mut central, date);
            put32(&mut central, crc);
            put32(&mut central, size);
            put32(&mut central, size);
            put16(&mut central, name_len);
            put16(&mut central, 0); // extra
            put16(&mut central, 0); // comment
            put16(&mut central, 0); // disk
            put16(&mut central, 0); // internal attributes
            put32(&mut central, 0); // external attributes
            put32(&mut central, offset);
            central.extend_from_slice(name);
        }

        let central_offset = u32::try_from(out.len())
            .map_err(|_| TakeoutError::Archive("archive exceeds 4 GiB".to_string()))?;
        let central_size = u32::try_from(central.len())
            .map_err(|_| TakeoutError::Archive("central directory too large".to_string()))?;
        out.extend_from_slice(&central);

        put32(&mut out, END_OF_CENTRAL);
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, count);
        put16(&mut out, count);
        put32(&mut out, central_size);
        put32(&mut out, central_offset);
        put16(&mut out, 0);

        log::debug!("Archive of {} entries, {} bytes", count, out.len());
        Ok(out)
    }
}

fn put16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
