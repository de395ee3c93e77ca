//! Single-file bundle support: trailer detection, versioned header and
//! manifest parsing, in-place reads, extraction, and composition.

pub mod extract;
pub mod header;
pub mod manifest;
pub mod marker;
pub mod reader;
pub mod writer;

use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use tracing::debug;

use crate::error::{HostError, HostResult};

pub use header::{BundleHeader, FileLocation, FLAG_EXTRACT_ALL};
pub use manifest::{BundleFileEntry, BundleManifest, FileType};
pub use reader::{ByteSource, SliceReader};
pub use writer::BundleWriter;

/// An opened single-file bundle: the mapped host image plus its parsed
/// manifest. Immutable once constructed.
#[derive(Debug)]
pub struct Bundle {
    pub host_path: PathBuf,
    source: ByteSource,
    /// Additive base for all reads; non-zero inside a fat container.
    base_offset: u64,
    pub manifest: BundleManifest,
}

impl Bundle {
    /// Probe `host_path` for an embedded bundle. `Ok(None)` means the
    /// executable carries no bundle and the caller should fall through to
    /// on-disk resolution.
    pub fn open(host_path: &Path) -> HostResult<Option<Self>> {
        let source = ByteSource::map_file(host_path)?;
        let data = source.as_slice();

        let header_offset = match marker::read_header_offset(data)? {
            Some(offset) => offset,
            None => {
                debug!(host = %host_path.display(), "no bundle marker");
                return Ok(None);
            }
        };
        let base_offset = marker::container_base_offset(data)?;
        let manifest = parse_manifest_at(&source, base_offset, header_offset)?;
        debug!(
            host = %host_path.display(),
            id = %manifest.header.bundle_id,
            version = manifest.header.major_version,
            files = manifest.entries.len(),
            "bundle opened"
        );
        Ok(Some(Self {
            host_path: host_path.to_path_buf(),
            source,
            base_offset,
            manifest,
        }))
    }

    /// Construct over an in-memory image; the manifest tests and the
    /// writer verify round-trips through this.
    pub fn from_vec(host_path: &Path, data: Vec<u8>) -> HostResult<Option<Self>> {
        let source = ByteSource::from_vec(data);
        let header_offset = match marker::read_header_offset(source.as_slice())? {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let base_offset = marker::container_base_offset(source.as_slice())?;
        let manifest = parse_manifest_at(&source, base_offset, header_offset)?;
        Ok(Some(Self {
            host_path: host_path.to_path_buf(),
            source,
            base_offset,
            manifest,
        }))
    }

    /// Raw stored bytes of an entry (still compressed when applicable).
    pub fn stored_bytes(&self, entry: &BundleFileEntry) -> HostResult<&[u8]> {
        self.source
            .slice(self.base_offset + entry.offset as u64, entry.stored_size() as u64)
    }

    /// Entry content, decompressed on the fly when required; borrows the
    /// mapped image for uncompressed entries.
    pub fn entry_bytes(&self, entry: &BundleFileEntry) -> HostResult<Cow<'_, [u8]>> {
        let stored = self.stored_bytes(entry)?;
        if !entry.is_compressed() {
            return Ok(Cow::Borrowed(stored));
        }
        let mut decoded = Vec::with_capacity(entry.size as usize);
        DeflateDecoder::new(stored)
            .read_to_end(&mut decoded)
            .map_err(|e| {
                HostError::BundleCorrupt(format!(
                    "entry '{}' failed to decompress: {e}",
                    entry.relative_path
                ))
            })?;
        if decoded.len() as i64 != entry.size {
            return Err(HostError::BundleCorrupt(format!(
                "entry '{}' decompressed to {} bytes, manifest says {}",
                entry.relative_path,
                decoded.len(),
                entry.size
            )));
        }
        Ok(Cow::Owned(decoded))
    }

    /// UTF-8 content of an embedded JSON manifest entry.
    pub fn entry_text(&self, entry: &BundleFileEntry) -> HostResult<String> {
        let bytes = self.entry_bytes(entry)?;
        String::from_utf8(bytes.into_owned()).map_err(|_| {
            HostError::BundleCorrupt(format!(
                "entry '{}' is not valid UTF-8",
                entry.relative_path
            ))
        })
    }

    /// Executable name used to key the extraction directory.
    pub fn host_name(&self) -> String {
        self.host_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_manifest_at(
    source: &ByteSource,
    base_offset: u64,
    header_offset: u64,
) -> HostResult<BundleManifest> {
    let start = base_offset + header_offset;
    let size = (source.len() as u64).checked_sub(start).ok_or_else(|| {
        HostError::BundleCorrupt("header offset is outside the sub-image".to_string())
    })?;
    let tail = source.slice(start, size)?;
    BundleManifest::parse(&mut SliceReader::new(tail))
}
