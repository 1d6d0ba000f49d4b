//! Locating the resource payload inside the PE container.
//!
//! A built game is an ordinary Windows executable with the resource
//! payload appended after the last PE section: a four-byte game magic, an
//! optional pack-file bundle, the product header, then the chunk stream.

use anyhow::{Context, Result};
use bytes::Bytes;
use winnow::binary::{le_u16, le_u32, u8};
use winnow::token::take;
use winnow::Parser;

use crate::error::DecodeError;
use crate::stream::Stream;

/// Marker in front of the optional pack-file bundle.
const PACK_MAGIC: &[u8; 4] = b"wwww";

/// Game magic found after the PE sections. Selects the string width and
/// the build family before any chunk is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// `PAME` - narrow-string build
    WindowsAnsi,
    /// `PAMU` - unicode build
    WindowsUnicode,
    /// `PUMA` - recompiled unicode build
    Recompiled,
    /// `PMUC` - Clickteam compatibility build
    CncBuild,
}

impl Signature {
    fn from_magic(magic: &[u8]) -> Option<Self> {
        match magic {
            b"PAME" => Some(Signature::WindowsAnsi),
            b"PAMU" => Some(Signature::WindowsUnicode),
            b"PUMA" => Some(Signature::Recompiled),
            b"PMUC" => Some(Signature::CncBuild),
            _ => None,
        }
    }

    pub fn unicode(self) -> bool {
        matches!(self, Signature::WindowsUnicode | Signature::Recompiled)
    }

    pub fn recompiled(self) -> bool {
        self == Signature::Recompiled
    }

    pub fn cnc(self) -> bool {
        self == Signature::CncBuild
    }
}

/// Runtime family from the product header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProductCode {
    Mmf1,
    Mmf15,
    Mmf2,
    CncLegacy,
    Cnc,
}

impl ProductCode {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0300 => Some(ProductCode::Mmf1),
            0x0301 => Some(ProductCode::Mmf15),
            0x0302 => Some(ProductCode::Mmf2),
            0x0207 => Some(ProductCode::CncLegacy),
            0x0208 => Some(ProductCode::Cnc),
            _ => None,
        }
    }

    /// Single byte appended to the cipher key material.
    pub fn key_byte(self) -> u8 {
        match self {
            ProductCode::Mmf1 => 0x00,
            ProductCode::Mmf15 => 0x01,
            ProductCode::Mmf2 => 0x02,
            ProductCode::CncLegacy => 0x07,
            ProductCode::Cnc => 0x08,
        }
    }

    pub fn old(self) -> bool {
        matches!(
            self,
            ProductCode::Mmf1 | ProductCode::Mmf15 | ProductCode::CncLegacy
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProductHeader {
    pub runtime_version: ProductCode,
    pub runtime_subversion: u16,
    pub product_version: u32,
    pub product_build: u32,
}

/// One file from the embedded pack bundle.
#[derive(Debug, Clone)]
pub struct PackFile {
    pub name: String,
    pub wide: bool,
    pub bingo: u32,
    pub data: Vec<u8>,
}

/// Everything learned before the chunk walker starts.
#[derive(Debug, Clone)]
pub struct GamePayload {
    pub signature: Signature,
    /// Absolute offset of the game magic
    pub data_position: usize,
    /// Absolute offset of the first chunk
    pub chunk_position: usize,
    pub pe_sections: u16,
    pub pack_files: Vec<PackFile>,
    pub product: ProductHeader,
}

fn pack_file(input: &mut &[u8]) -> winnow::Result<PackFile> {
    let wide = u8.parse_next(input)? != 0;
    let name_len = le_u16.parse_next(input)? as usize;
    let name_bytes = take(if wide { name_len * 2 } else { name_len }).parse_next(input)?;
    let name = if wide {
        let units = name_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        String::from_utf16_lossy(&units)
    } else {
        name_bytes.iter().map(|&b| b as char).collect()
    };
    let bingo = le_u32.parse_next(input)?;
    let data_len = le_u32.parse_next(input)? as usize;
    let data = take(data_len).parse_next(input)?.to_vec();
    Ok(PackFile {
        name,
        wide,
        bingo,
        data,
    })
}

fn pack_bundle(input: &mut &[u8]) -> winnow::Result<Vec<PackFile>> {
    let count = le_u32.parse_next(input)?;
    let mut files = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        files.push(pack_file.parse_next(input)?);
    }
    Ok(files)
}

fn product_header(input: &mut &[u8]) -> winnow::Result<ProductHeader> {
    let runtime_version = le_u16.parse_next(input)?;
    let runtime_subversion = le_u16.parse_next(input)?;
    let product_version = le_u32.parse_next(input)?;
    let product_build = le_u32.parse_next(input)?;
    Ok(ProductHeader {
        // unrecognised runtimes decode like MMF2, the newest family
        runtime_version: ProductCode::from_u16(runtime_version).unwrap_or(ProductCode::Mmf2),
        runtime_subversion,
        product_version,
        product_build,
    })
}

/// Walks the PE headers and returns the number of sections plus the offset
/// where the appended payload can start (end of the last section's raw
/// data).
fn parse_pe(strm: &mut Stream) -> Result<(u16, usize)> {
    if strm.read_span(2)?.as_ref() != b"MZ" {
        return Err(DecodeError::InvalidExeSignature).context("missing MZ stub");
    }
    strm.seek(0x3C).context("seeking e_lfanew")?;
    let pe_offset = strm.read_u32().context("reading e_lfanew")? as usize;
    strm.seek(pe_offset).context("seeking PE header")?;
    if strm.read_span(4)?.as_ref() != b"PE\0\0" {
        return Err(DecodeError::InvalidPeSignature)
            .with_context(|| format!("no PE header at {pe_offset:#x}"));
    }

    // COFF header
    strm.skip(2).context("machine")?;
    let sections = strm.read_u16().context("section count")?;
    strm.skip(12).context("timestamp + symbol table")?;
    let optional_size = strm.read_u16().context("optional header size")? as usize;
    strm.skip(2).context("characteristics")?;
    strm.skip(optional_size).context("optional header")?;

    // section table: the payload sits after the furthest raw section end
    let mut payload_start = strm.position();
    for i in 0..sections {
        strm.skip(16)
            .with_context(|| format!("section {i} name/virtual fields"))?;
        let raw_size = strm.read_u32().context("raw size")? as usize;
        let raw_pointer = strm.read_u32().context("raw pointer")? as usize;
        strm.skip(16)
            .with_context(|| format!("section {i} trailing fields"))?;
        payload_start = payload_start.max(raw_pointer + raw_size);
    }
    Ok((sections, payload_start))
}

/// Finds the game payload in a loaded executable.
pub fn locate(buffer: &Bytes) -> Result<GamePayload> {
    let mut strm = Stream::new(buffer.clone());
    let (pe_sections, payload_start) = parse_pe(&mut strm).context("parsing PE container")?;

    // scan forward for the game magic; some packers pad past the sections
    let (data_position, signature) = (payload_start..buffer.len().saturating_sub(3))
        .find_map(|pos| Signature::from_magic(&buffer[pos..pos + 4]).map(|sig| (pos, sig)))
        .ok_or(DecodeError::InvalidGameSignature)
        .context("no game magic after the PE sections")?;

    let mut rest = &buffer[data_position + 4..];
    let pack_files = if rest.starts_with(PACK_MAGIC) {
        rest = &rest[4..];
        pack_bundle
            .parse_next(&mut rest)
            .map_err(|_| DecodeError::out_of_data(rest.len(), 4))
            .context("parsing pack-file bundle")?
    } else {
        Vec::new()
    };

    let product = product_header
        .parse_next(&mut rest)
        .map_err(|_| DecodeError::out_of_data(rest.len(), 12))
        .context("parsing product header")?;

    Ok(GamePayload {
        signature,
        data_position,
        chunk_position: buffer.len() - rest.len(),
        pe_sections,
        pack_files,
        product,
    })
}

/// Fixture builders shared by the exe tests and the end-to-end decode
/// tests in `game`.
#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal MZ + PE container with no sections; the payload starts
    /// right after the (empty) section table.
    pub(crate) fn exe_with_payload(magic: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut exe = vec![0u8; 0x40];
        exe[0] = b'M';
        exe[1] = b'Z';
        exe[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        exe.extend_from_slice(b"PE\0\0");
        exe.extend_from_slice(&0u16.to_le_bytes()); // machine
        exe.extend_from_slice(&0u16.to_le_bytes()); // sections
        exe.extend_from_slice(&[0; 12]); // timestamp + symbols
        exe.extend_from_slice(&0u16.to_le_bytes()); // optional header size
        exe.extend_from_slice(&0u16.to_le_bytes()); // characteristics
        exe.extend_from_slice(magic);
        exe.extend_from_slice(payload);
        exe
    }

    pub(crate) fn product_header_bytes(runtime_version: u16, build: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&runtime_version.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&build.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{exe_with_payload, product_header_bytes};
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn locates_payload_and_selects_signature() {
        let exe = exe_with_payload(b"PAMU", &product_header_bytes(0x0302, 290));
        let payload = locate(&Bytes::from(exe)).unwrap();
        assert_eq!(payload.signature, Signature::WindowsUnicode);
        assert!(payload.signature.unicode());
        assert_eq!(payload.product.runtime_version, ProductCode::Mmf2);
        assert_eq!(payload.product.product_build, 290);
        assert!(payload.pack_files.is_empty());
        assert_eq!(payload.chunk_position, payload.data_position + 4 + 12);
    }

    #[test]
    fn parses_pack_bundle_when_marked() {
        let mut body = PACK_MAGIC.to_vec();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.push(0); // narrow name
        body.extend_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(b"ext");
        body.extend_from_slice(&0xB1B1u32.to_le_bytes());
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(b"ok");
        body.extend(product_header_bytes(0x0302, 288));

        let exe = exe_with_payload(b"PAME", &body);
        let payload = locate(&Bytes::from(exe)).unwrap();
        assert_eq!(payload.pack_files.len(), 1);
        assert_eq!(payload.pack_files[0].name, "ext");
        assert_eq!(payload.pack_files[0].bingo, 0xB1B1);
        assert_eq!(payload.pack_files[0].data, b"ok");
    }

    #[test]
    fn rejects_non_executables() {
        let err = locate(&Bytes::from_static(b"ZM not an exe")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::InvalidExeSignature)
        );
    }

    #[test]
    fn rejects_exe_without_game_magic() {
        let exe = exe_with_payload(b"XXXX", &[0; 16]);
        let err = locate(&Bytes::from(exe)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::InvalidGameSignature)
        );
    }
}
