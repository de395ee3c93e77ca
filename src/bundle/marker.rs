// ─── Bundle Trailer & Fat-Container Detection ───
// The last 40 bytes of a bundled host are the marker: an 8-byte
// little-endian header offset followed by a fixed 32-byte signature.
// On macOS the host may be a multi-architecture (fat) container; the
// header offset is then relative to the sub-image matching the current
// CPU, so a base offset is computed from the fat arch table first.

use sha2::{Digest, Sha256};

use crate::error::{HostError, HostResult};

use super::reader::SliceReader;

/// Trailer length: offset word + signature.
pub const MARKER_SIZE: usize = 40;

const SIGNATURE_SEED: &[u8] = b"corehost embedded bundle";

/// Fat container magics, read big-endian from offset 0.
const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;

/// Mach-O cpu types for the architectures the host builds for.
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// The fixed 32-byte marker signature.
pub fn bundle_signature() -> [u8; 32] {
    Sha256::digest(SIGNATURE_SEED).into()
}

fn current_cpu_type() -> Option<u32> {
    if cfg!(target_arch = "x86_64") {
        Some(CPU_TYPE_X86_64)
    } else if cfg!(target_arch = "aarch64") {
        Some(CPU_TYPE_ARM64)
    } else {
        None
    }
}

/// Read the trailer. `Ok(None)` means "not a bundle": the file is too
/// short, the signature does not match, or the recorded offset is zero.
pub fn read_header_offset(data: &[u8]) -> HostResult<Option<u64>> {
    if data.len() < MARKER_SIZE {
        return Ok(None);
    }
    let trailer = &data[data.len() - MARKER_SIZE..];
    if trailer[8..] != bundle_signature() {
        return Ok(None);
    }
    let offset = i64::from_le_bytes(trailer[..8].try_into().unwrap());
    match offset {
        0 => Ok(None),
        n if n < 0 || (n as u64) >= data.len() as u64 => Err(HostError::BundleCorrupt(format!(
            "header offset {n} is outside the host image"
        ))),
        n => Ok(Some(n as u64)),
    }
}

/// Base offset of the sub-image matching the current CPU when the host is
/// a fat container; 0 when the magic is absent. An unmatched architecture
/// inside a recognized container is corrupt: the host cannot run it.
pub fn container_base_offset(data: &[u8]) -> HostResult<u64> {
    let mut reader = SliceReader::new(data);
    if reader.remaining() < 8 {
        return Ok(0);
    }
    let magic = reader.read_u32_be()?;
    let wide = match magic {
        FAT_MAGIC => false,
        FAT_MAGIC_64 => true,
        _ => return Ok(0),
    };

    let wanted = current_cpu_type().ok_or_else(|| {
        HostError::BundleCorrupt("fat container on an unsupported host architecture".to_string())
    })?;

    let arch_count = reader.read_u32_be()?;
    for _ in 0..arch_count {
        let cpu_type = reader.read_u32_be()?;
        let _cpu_subtype = reader.read_u32_be()?;
        let (offset, _size) = if wide {
            let offset = reader.read_u64_be()?;
            let size = reader.read_u64_be()?;
            let _align = reader.read_u32_be()?;
            let _reserved = reader.read_u32_be()?;
            (offset, size)
        } else {
            let offset = u64::from(reader.read_u32_be()?);
            let size = u64::from(reader.read_u32_be()?);
            let _align = reader.read_u32_be()?;
            (offset, size)
        };
        if cpu_type == wanted {
            if offset >= data.len() as u64 {
                return Err(HostError::BundleCorrupt(
                    "fat sub-image offset is outside the host image".to_string(),
                ));
            }
            return Ok(offset);
        }
    }
    Err(HostError::BundleCorrupt(
        "fat container has no sub-image for this architecture".to_string(),
    ))
}

/// Append the 40-byte trailer for `header_offset` to `out`.
pub fn write_trailer(out: &mut Vec<u8>, header_offset: u64) {
    out.extend_from_slice(&(header_offset as i64).to_le_bytes());
    out.extend_from_slice(&bundle_signature());
}
