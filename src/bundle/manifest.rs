// ─── Bundle Manifest ───
// The file table following the header: one entry per embedded file.
// Built once per process per bundle and immutable afterwards.

use std::collections::BTreeMap;

use crate::error::{HostError, HostResult};

use super::header::BundleHeader;
use super::reader::{put_string, SliceReader};

/// Kind of an embedded file; drives the extraction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Assembly,
    NativeBinary,
    DepsJson,
    RuntimeConfigJson,
    Symbols,
}

impl FileType {
    pub fn from_byte(byte: u8) -> HostResult<Self> {
        match byte {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Assembly),
            2 => Ok(Self::NativeBinary),
            3 => Ok(Self::DepsJson),
            4 => Ok(Self::RuntimeConfigJson),
            5 => Ok(Self::Symbols),
            other => Err(HostError::BundleCorrupt(format!(
                "unknown bundle file type {other}"
            ))),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Assembly => 1,
            Self::NativeBinary => 2,
            Self::DepsJson => 3,
            Self::RuntimeConfigJson => 4,
            Self::Symbols => 5,
        }
    }
}

/// One embedded file: where it lives inside the host image and what it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFileEntry {
    pub offset: i64,
    pub size: i64,
    /// 0 when the entry is stored uncompressed.
    pub compressed_size: i64,
    pub file_type: FileType,
    /// Forward-slash path, as normalized at parse time.
    pub relative_path: String,
}

impl BundleFileEntry {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size > 0 && self.compressed_size != self.size
    }

    /// Bytes the entry occupies in the host image.
    pub fn stored_size(&self) -> i64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.size
        }
    }

    /// Native binaries must be materialized on disk so the OS loader can
    /// map them; everything else is served in place unless the header's
    /// legacy flag forces full extraction.
    pub fn needs_extraction(&self, extract_all: bool) -> bool {
        extract_all || self.file_type == FileType::NativeBinary
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    fn parse(reader: &mut SliceReader<'_>, header: &BundleHeader) -> HostResult<Self> {
        let offset = reader.read_i64_le()?;
        let size = reader.read_i64_le()?;
        let compressed_size = if header.has_compressed_sizes() {
            reader.read_i64_le()?
        } else {
            0
        };
        let file_type = FileType::from_byte(reader.read_u8()?)?;
        let relative_path = reader.read_string()?.replace('\\', "/");

        if offset <= 0 || size < 0 || compressed_size < 0 {
            return Err(HostError::BundleCorrupt(format!(
                "entry '{relative_path}' has a negative location"
            )));
        }
        // Entry paths are joined under the extraction directory; anything
        // that could resolve outside it is hostile.
        if relative_path.is_empty()
            || relative_path.starts_with(['/', '\\'])
            || relative_path.contains(':')
            || relative_path
                .split(['/', '\\'])
                .any(|part| part == "..")
        {
            return Err(HostError::BundleCorrupt(format!(
                "entry path '{relative_path}' escapes the extraction directory"
            )));
        }
        Ok(Self {
            offset,
            size,
            compressed_size,
            file_type,
            relative_path,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>, header: &BundleHeader) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        if header.has_compressed_sizes() {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
        }
        out.push(self.file_type.as_byte());
        put_string(out, &self.relative_path);
    }
}

/// The immutable parsed bundle index: header plus all file entries, with a
/// path lookup map.
#[derive(Debug, Clone, Default)]
pub struct BundleManifest {
    pub header: BundleHeader,
    pub entries: Vec<BundleFileEntry>,
    by_path: BTreeMap<String, usize>,
}

impl BundleManifest {
    /// Parse header and file table at the reader's current position.
    pub fn parse(reader: &mut SliceReader<'_>) -> HostResult<Self> {
        let header = BundleHeader::parse(reader)?;
        // An entry is at least 18 bytes on the wire; cap the reservation
        // so an untrusted file count cannot demand a huge allocation
        // before the truncated-read check fires.
        let capacity = (header.file_count as usize).min(reader.remaining() / 18);
        let mut entries = Vec::with_capacity(capacity);
        let mut by_path = BTreeMap::new();
        for index in 0..header.file_count {
            let entry = BundleFileEntry::parse(reader, &header)?;
            if by_path.insert(entry.relative_path.clone(), index as usize).is_some() {
                return Err(HostError::BundleCorrupt(format!(
                    "duplicate entry '{}'",
                    entry.relative_path
                )));
            }
            entries.push(entry);
        }
        Ok(Self {
            header,
            entries,
            by_path,
        })
    }

    /// Look up an entry by relative path; backslashes are accepted.
    pub fn find(&self, relative_path: &str) -> Option<&BundleFileEntry> {
        let normalized = relative_path.replace('\\', "/");
        self.by_path.get(&normalized).map(|&index| &self.entries[index])
    }

    pub fn entries_of_type(&self, file_type: FileType) -> impl Iterator<Item = &BundleFileEntry> {
        self.entries.iter().filter(move |e| e.file_type == file_type)
    }

    /// The embedded deps manifest entry: the header location for v2+,
    /// else the sole DepsJson-typed entry.
    pub fn deps_json_entry(&self) -> Option<&BundleFileEntry> {
        if self.header.deps_json.is_present() {
            return self
                .entries
                .iter()
                .find(|e| e.offset == self.header.deps_json.offset);
        }
        self.entries_of_type(FileType::DepsJson).next()
    }

    pub fn runtime_config_entry(&self) -> Option<&BundleFileEntry> {
        if self.header.runtime_config.is_present() {
            return self
                .entries
                .iter()
                .find(|e| e.offset == self.header.runtime_config.offset);
        }
        self.entries_of_type(FileType::RuntimeConfigJson).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::header::FileLocation;

    fn entry(offset: i64, size: i64, compressed: i64, file_type: FileType, path: &str) -> BundleFileEntry {
        BundleFileEntry {
            offset,
            size,
            compressed_size: compressed,
            file_type,
            relative_path: path.to_string(),
        }
    }

    fn serialize(header: &BundleHeader, entries: &[BundleFileEntry]) -> Vec<u8> {
        let mut out = Vec::new();
        header.write(&mut out);
        for e in entries {
            e.write(&mut out, header);
        }
        out
    }

    #[test]
    fn v6_manifest_round_trips_every_entry_field() {
        let entries = vec![
            entry(64, 1000, 0, FileType::Assembly, "demo.dll"),
            entry(1064, 5000, 2200, FileType::NativeBinary, "native/libdemo.so"),
            entry(3264, 300, 0, FileType::DepsJson, "demo.deps.json"),
        ];
        let header = BundleHeader {
            major_version: 6,
            minor_version: 0,
            file_count: entries.len() as i32,
            bundle_id: "feedface01234567".to_string(),
            deps_json: FileLocation { offset: 3264, size: 300 },
            ..BundleHeader::default()
        };

        let bytes = serialize(&header, &entries);
        let manifest = BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap();
        assert_eq!(manifest.header, header);
        assert_eq!(manifest.entries, entries);
    }

    #[test]
    fn v1_manifest_has_no_compressed_sizes() {
        let entries = vec![entry(64, 1000, 0, FileType::Assembly, "demo.dll")];
        let header = BundleHeader {
            major_version: 1,
            file_count: 1,
            bundle_id: "legacy".to_string(),
            ..BundleHeader::default()
        };
        let bytes = serialize(&header, &entries);
        let manifest = BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap();
        assert_eq!(manifest.entries[0].compressed_size, 0);
        assert!(!manifest.entries[0].is_compressed());
    }

    #[test]
    fn truncated_file_table_is_corrupt() {
        let entries = vec![entry(64, 1000, 0, FileType::Assembly, "demo.dll")];
        let mut header = BundleHeader {
            major_version: 1,
            file_count: 1,
            bundle_id: "t".to_string(),
            ..BundleHeader::default()
        };
        header.file_count = 2; // one more than serialized
        let bytes = serialize(&header, &entries);
        assert!(matches!(
            BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
            HostError::BundleCorrupt(_)
        ));
    }

    #[test]
    fn traversal_entry_path_is_corrupt() {
        for hostile in [
            "../../outside-marker.bin",
            "a/../../b",
            "..\\..\\outside-marker.bin",
            "/etc/passwd",
            "\\share\\evil",
            "C:/windows/evil",
            "",
        ] {
            let entries = vec![entry(64, 10, 0, FileType::NativeBinary, hostile)];
            let header = BundleHeader {
                major_version: 6,
                file_count: 1,
                bundle_id: "hostile".to_string(),
                ..BundleHeader::default()
            };
            let bytes = serialize(&header, &entries);
            assert!(
                matches!(
                    BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
                    HostError::BundleCorrupt(_)
                ),
                "path '{hostile}' should be rejected"
            );
        }
    }

    #[test]
    fn dotdot_file_name_component_is_allowed() {
        // "file..name" contains dots but no traversal component.
        let entries = vec![entry(64, 10, 0, FileType::Assembly, "lib/file..name.dll")];
        let header = BundleHeader {
            major_version: 6,
            file_count: 1,
            bundle_id: "ok".to_string(),
            ..BundleHeader::default()
        };
        let bytes = serialize(&header, &entries);
        assert!(BundleManifest::parse(&mut SliceReader::new(&bytes)).is_ok());
    }

    #[test]
    fn huge_file_count_fails_as_corrupt_not_alloc() {
        // Header claims i32::MAX entries but carries none; the parser must
        // reach the truncated-read error without reserving for the claim.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        put_string(&mut bytes, "huge");
        assert!(matches!(
            BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
            HostError::BundleCorrupt(_)
        ));
    }

    #[test]
    fn lookup_normalizes_backslashes() {
        let entries = vec![entry(64, 10, 0, FileType::Assembly, "lib\\demo.dll")];
        let header = BundleHeader {
            major_version: 2,
            file_count: 1,
            bundle_id: "n".to_string(),
            ..BundleHeader::default()
        };
        let bytes = serialize(&header, &entries);
        let manifest = BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap();
        assert!(manifest.find("lib/demo.dll").is_some());
        assert!(manifest.find("lib\\demo.dll").is_some());
        assert!(manifest.find("other.dll").is_none());
    }

    #[test]
    fn extraction_policy_follows_type_and_flag() {
        let assembly = entry(64, 10, 0, FileType::Assembly, "a.dll");
        let native = entry(64, 10, 0, FileType::NativeBinary, "libb.so");
        assert!(!assembly.needs_extraction(false));
        assert!(assembly.needs_extraction(true));
        assert!(native.needs_extraction(false));
    }

    #[test]
    fn compression_requires_distinct_smaller_size() {
        assert!(entry(1, 100, 60, FileType::Assembly, "x").is_compressed());
        assert!(!entry(1, 100, 0, FileType::Assembly, "x").is_compressed());
        assert!(!entry(1, 100, 100, FileType::Assembly, "x").is_compressed());
    }

    #[test]
    fn header_locations_find_json_entries() {
        let entries = vec![
            entry(64, 10, 0, FileType::Assembly, "demo.dll"),
            entry(74, 20, 0, FileType::DepsJson, "demo.deps.json"),
            entry(94, 30, 0, FileType::RuntimeConfigJson, "demo.runtimeconfig.json"),
        ];
        let header = BundleHeader {
            major_version: 2,
            file_count: 3,
            bundle_id: "j".to_string(),
            deps_json: FileLocation { offset: 74, size: 20 },
            runtime_config: FileLocation { offset: 94, size: 30 },
            ..BundleHeader::default()
        };
        let bytes = serialize(&header, &entries);
        let manifest = BundleManifest::parse(&mut SliceReader::new(&bytes)).unwrap();
        assert_eq!(manifest.deps_json_entry().unwrap().relative_path, "demo.deps.json");
        assert_eq!(
            manifest.runtime_config_entry().unwrap().relative_path,
            "demo.runtimeconfig.json"
        );
    }
}
