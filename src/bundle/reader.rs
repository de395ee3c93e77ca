// ─── Bundle Byte Source & Binary Reader ───
// The bundle formats are parsed off a byte-addressable source: the host
// executable memory-mapped when possible, an owned buffer otherwise (tests
// compose bundles in memory). All multi-byte reads are explicit about
// endianness; string lengths use the 7-bit varint encoding.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{HostError, HostResult};

/// Byte-addressable view of a host executable.
#[derive(Debug)]
pub enum ByteSource {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ByteSource {
    /// Memory-map a file read-only. An empty file maps to an owned empty
    /// buffer since zero-length maps are rejected on some platforms.
    pub fn map_file(path: &Path) -> HostResult<Self> {
        let file = File::open(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| HostError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if len == 0 {
            return Ok(Self::Owned(Vec::new()));
        }
        // Safety: the map is read-only and the host executable is not
        // expected to be rewritten while the process runs.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::Mapped(map))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::Owned(data)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow `size` bytes at `offset`, bounds-checked.
    pub fn slice(&self, offset: u64, size: u64) -> HostResult<&[u8]> {
        let data = self.as_slice();
        let start = usize::try_from(offset)
            .map_err(|_| truncated("range start overflows"))?;
        let len = usize::try_from(size).map_err(|_| truncated("range size overflows"))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| truncated("range exceeds source"))?;
        Ok(&data[start..end])
    }
}

fn truncated(what: &str) -> HostError {
    HostError::BundleCorrupt(format!("truncated read: {what}"))
}

/// Sequential reader with explicit-endian primitives over a byte slice.
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, count: usize) -> HostResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| truncated("ran off the end of the manifest"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> HostResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> HostResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32_le(&mut self) -> HostResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64_le(&mut self) -> HostResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_u64_le(&mut self) -> HostResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_u32_be(&mut self) -> HostResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64_be(&mut self) -> HostResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Length-prefixed UTF-8 string; the prefix is a 7-bit varint byte
    /// count, low groups first, capped at 5 bytes.
    pub fn read_string(&mut self) -> HostResult<String> {
        let mut length: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            length |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(HostError::BundleCorrupt(
                    "string length prefix is malformed".to_string(),
                ));
            }
        }
        let bytes = self.take(length as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HostError::BundleCorrupt("string is not valid UTF-8".to_string()))
    }
}

/// Append a 7-bit varint length prefix followed by the string bytes.
/// Writer-side counterpart of [`SliceReader::read_string`].
pub fn put_string(out: &mut Vec<u8>, text: &str) {
    let mut length = text.len() as u32;
    loop {
        let byte = (length & 0x7f) as u8;
        length >>= 7;
        if length == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(text.as_bytes());
}
