// ─── Bundle Header ───

use crate::error::{HostError, HostResult};

use super::reader::{put_string, SliceReader};

/// Oldest header layout this host understands.
pub const MIN_MAJOR_VERSION: u32 = 1;
/// Newest header layout this host understands.
pub const MAX_MAJOR_VERSION: u32 = 6;

/// Header flag: legacy compatibility mode, every entry is extracted to
/// disk regardless of type.
pub const FLAG_EXTRACT_ALL: u64 = 1;

/// Offset/size of an embedded file recorded directly in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileLocation {
    pub offset: i64,
    pub size: i64,
}

impl FileLocation {
    pub fn is_present(&self) -> bool {
        self.size > 0
    }
}

/// Parsed bundle header. Fields past `bundle_id` only exist on disk for
/// `major_version >= 2` and default to empty otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub file_count: i32,
    pub bundle_id: String,
    pub deps_json: FileLocation,
    pub runtime_config: FileLocation,
    pub flags: u64,
}

impl BundleHeader {
    pub fn parse(reader: &mut SliceReader<'_>) -> HostResult<Self> {
        let major_version = reader.read_u32_le()?;
        let minor_version = reader.read_u32_le()?;
        let file_count = reader.read_i32_le()?;
        let bundle_id = reader.read_string()?;

        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(HostError::BundleCorrupt(format!(
                "unsupported bundle version {major_version}.{minor_version}"
            )));
        }
        if file_count < 0 {
            return Err(HostError::BundleCorrupt(format!(
                "negative file count {file_count}"
            )));
        }

        let mut header = Self {
            major_version,
            minor_version,
            file_count,
            bundle_id,
            ..Self::default()
        };
        match major_version {
            1 => {}
            _ => {
                header.deps_json = FileLocation {
                    offset: reader.read_i64_le()?,
                    size: reader.read_i64_le()?,
                };
                header.runtime_config = FileLocation {
                    offset: reader.read_i64_le()?,
                    size: reader.read_i64_le()?,
                };
                header.flags = reader.read_u64_le()?;
            }
        }
        Ok(header)
    }

    /// Per-entry compressed sizes exist only in v6 manifests.
    pub fn has_compressed_sizes(&self) -> bool {
        self.major_version >= 6
    }

    /// Legacy mode: everything is extracted, nothing served in place.
    pub fn extract_all(&self) -> bool {
        self.flags & FLAG_EXTRACT_ALL != 0
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.major_version.to_le_bytes());
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.file_count.to_le_bytes());
        put_string(out, &self.bundle_id);
        if self.major_version >= 2 {
            out.extend_from_slice(&self.deps_json.offset.to_le_bytes());
            out.extend_from_slice(&self.deps_json.size.to_le_bytes());
            out.extend_from_slice(&self.runtime_config.offset.to_le_bytes());
            out.extend_from_slice(&self.runtime_config.size.to_le_bytes());
            out.extend_from_slice(&self.flags.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(header: &BundleHeader) -> BundleHeader {
        let mut bytes = Vec::new();
        header.write(&mut bytes);
        BundleHeader::parse(&mut SliceReader::new(&bytes)).unwrap()
    }

    #[test]
    fn v1_header_round_trips_without_locations() {
        let header = BundleHeader {
            major_version: 1,
            minor_version: 0,
            file_count: 3,
            bundle_id: "abc123".to_string(),
            ..BundleHeader::default()
        };
        assert_eq!(round_trip(&header), header);
    }

    #[test]
    fn v6_header_round_trips_locations_and_flags() {
        let header = BundleHeader {
            major_version: 6,
            minor_version: 0,
            file_count: 12,
            bundle_id: "deadbeefcafe0123".to_string(),
            deps_json: FileLocation { offset: 4096, size: 900 },
            runtime_config: FileLocation { offset: 4996, size: 120 },
            flags: FLAG_EXTRACT_ALL,
        };
        let parsed = round_trip(&header);
        assert_eq!(parsed, header);
        assert!(parsed.extract_all());
        assert!(parsed.has_compressed_sizes());
    }

    #[test]
    fn version_zero_is_rejected() {
        let header = BundleHeader {
            major_version: 0,
            file_count: 0,
            bundle_id: "x".to_string(),
            ..BundleHeader::default()
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes);
        assert!(matches!(
            BundleHeader::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
            HostError::BundleCorrupt(_)
        ));
    }

    #[test]
    fn version_seven_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        put_string(&mut bytes, "future");
        assert!(matches!(
            BundleHeader::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
            HostError::BundleCorrupt(_)
        ));
    }

    #[test]
    fn negative_file_count_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        put_string(&mut bytes, "bad");
        assert!(matches!(
            BundleHeader::parse(&mut SliceReader::new(&bytes)).unwrap_err(),
            HostError::BundleCorrupt(_)
        ));
    }
}
