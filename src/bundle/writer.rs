// ─── Bundle Writer ───
// Composes a single-file bundle: host stub, aligned payload, header plus
// file table in the requested layout version, 40-byte trailer. The bundle
// id is derived deterministically from entry metadata and content so the
// same inputs always address the same extraction directory.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HostError, HostResult};

use super::header::{BundleHeader, FileLocation, MAX_MAJOR_VERSION, MIN_MAJOR_VERSION};
use super::manifest::{BundleFileEntry, FileType};
use super::marker;

/// Native binaries are aligned so they can be mapped straight out of the
/// image where the platform allows it.
const NATIVE_ALIGNMENT: usize = 4096;
const DEFAULT_ALIGNMENT: usize = 16;

/// Entries smaller than this are never worth deflating.
const MIN_COMPRESS_SIZE: usize = 128;

struct PendingFile {
    relative_path: String,
    file_type: FileType,
    content: Vec<u8>,
}

/// Builder for a single-file bundle image.
pub struct BundleWriter {
    app_name: String,
    major_version: u32,
    compress: bool,
    files: Vec<PendingFile>,
}

impl BundleWriter {
    pub fn new(app_name: impl Into<String>, major_version: u32) -> Self {
        Self {
            app_name: app_name.into(),
            major_version,
            compress: false,
            files: Vec::new(),
        }
    }

    /// Enable deflate compression for eligible entries. Only effective in
    /// v6 layouts; compressed data is kept only when strictly smaller.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn add_entry(&mut self, relative_path: &str, file_type: FileType, content: Vec<u8>) {
        self.files.push(PendingFile {
            relative_path: relative_path.replace('\\', "/"),
            file_type,
            content,
        });
    }

    /// Read a file from disk and add it under `relative_path`.
    pub fn add_file(&mut self, relative_path: &str, file_type: FileType, path: &Path) -> HostResult<()> {
        let content = fs::read(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_entry(relative_path, file_type, content);
        Ok(())
    }

    /// Append payload, manifest, and trailer to the host stub and return
    /// the complete image.
    pub fn compose(&self, stub: Vec<u8>) -> HostResult<Vec<u8>> {
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&self.major_version) {
            return Err(HostError::InvalidArgument(format!(
                "bundle version {} is outside [{MIN_MAJOR_VERSION},{MAX_MAJOR_VERSION}]",
                self.major_version
            )));
        }
        if stub.is_empty() {
            return Err(HostError::InvalidArgument(
                "host stub must not be empty".to_string(),
            ));
        }

        let mut image = stub;
        let mut entries = Vec::with_capacity(self.files.len());
        for file in &self.files {
            entries.push(self.lay_out(&mut image, file));
        }

        let mut header = BundleHeader {
            major_version: self.major_version,
            minor_version: 0,
            file_count: entries.len() as i32,
            bundle_id: derive_bundle_id(&self.app_name, &entries, &self.files),
            ..BundleHeader::default()
        };
        if self.major_version >= 2 {
            header.deps_json = location_of(&entries, FileType::DepsJson);
            header.runtime_config = location_of(&entries, FileType::RuntimeConfigJson);
        }

        let header_offset = image.len() as u64;
        header.write(&mut image);
        for entry in &entries {
            entry.write(&mut image, &header);
        }
        marker::write_trailer(&mut image, header_offset);

        debug!(
            app = %self.app_name,
            id = %header.bundle_id,
            files = entries.len(),
            size = image.len(),
            "bundle composed"
        );
        Ok(image)
    }

    /// Compose against an on-disk host stub and write the image to
    /// `output`.
    pub fn write_to_file(&self, stub_path: &Path, output: &Path) -> HostResult<BundleHeader> {
        let stub = fs::read(stub_path).map_err(|source| HostError::Io {
            path: stub_path.to_path_buf(),
            source,
        })?;
        let image = self.compose(stub)?;
        fs::write(output, &image).map_err(|source| HostError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        // Re-parse the trailer we just wrote for the caller's summary.
        let header_offset = marker::read_header_offset(&image)?.ok_or_else(|| {
            HostError::BundleCorrupt("composed image has no readable trailer".to_string())
        })?;
        let mut reader = super::SliceReader::new(&image[header_offset as usize..]);
        BundleHeader::parse(&mut reader)
    }

    fn lay_out(&self, image: &mut Vec<u8>, file: &PendingFile) -> BundleFileEntry {
        let alignment = match file.file_type {
            FileType::NativeBinary => NATIVE_ALIGNMENT,
            _ => DEFAULT_ALIGNMENT,
        };
        let padded = image.len().div_ceil(alignment) * alignment;
        image.resize(padded, 0);

        let offset = image.len() as i64;
        let size = file.content.len() as i64;
        let mut compressed_size = 0i64;

        if self.should_compress(file) {
            if let Some(deflated) = deflate_smaller(&file.content) {
                compressed_size = deflated.len() as i64;
                image.extend_from_slice(&deflated);
            }
        }
        if compressed_size == 0 {
            image.extend_from_slice(&file.content);
        }

        BundleFileEntry {
            offset,
            size,
            compressed_size,
            file_type: file.file_type,
            relative_path: file.relative_path.clone(),
        }
    }

    fn should_compress(&self, file: &PendingFile) -> bool {
        self.compress
            && self.major_version >= 6
            && file.content.len() >= MIN_COMPRESS_SIZE
            // Native binaries stay raw so the mapped image remains usable.
            && file.file_type != FileType::NativeBinary
    }
}

/// Deflate `content`; `None` when compression does not strictly shrink it.
fn deflate_smaller(content: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).ok()?;
    let deflated = encoder.finish().ok()?;
    (deflated.len() < content.len()).then_some(deflated)
}

/// SHA-256 over the app name, every entry's path/type/sizes, and content;
/// truncated to 16 hex characters to keep extraction paths short.
fn derive_bundle_id(app_name: &str, entries: &[BundleFileEntry], files: &[PendingFile]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_name.as_bytes());
    for (entry, file) in entries.iter().zip(files) {
        hasher.update(entry.relative_path.as_bytes());
        hasher.update([entry.file_type.as_byte()]);
        hasher.update(entry.size.to_le_bytes());
        hasher.update(&file.content);
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

fn location_of(entries: &[BundleFileEntry], file_type: FileType) -> FileLocation {
    entries
        .iter()
        .find(|e| e.file_type == file_type)
        .map(|e| FileLocation {
            offset: e.offset,
            size: e.size,
        })
        .unwrap_or_default()
}
