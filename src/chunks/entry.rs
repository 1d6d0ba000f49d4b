//! Entries: lazy, typed windows into the game buffer.
//!
//! An entry records where a chunk or bank item sits in the original buffer
//! and how its bytes are encoded. Decoding is deferred until a reader or
//! an export asks for it, and always returns a fresh buffer the caller
//! owns.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::{ChunkId, Encoding};
use crate::codec::{self, Decoder};
use crate::error::DecodeError;
use crate::stream::Stream;

/// A lazy window: position and expected size in the original buffer plus
/// the zero-copy view itself.
#[derive(Debug, Clone, Default)]
pub struct DataPoint {
    pub position: usize,
    pub expected_size: usize,
    pub data: Bytes,
}

impl DataPoint {
    fn read(strm: &mut Stream, size: usize) -> Result<Self, DecodeError> {
        let position = strm.position();
        let data = strm.read_span(size)?;
        Ok(DataPoint {
            position,
            expected_size: size,
            data,
        })
    }
}

/// What an entry refers to: a chunk in the stream, or an item in a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Chunk(ChunkId),
    Item { handle: u32 },
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub mode: Encoding,
    pub position: usize,
    pub end: usize,
    pub old: bool,
    /// Fixed-size header block in front of some bank items
    pub header: Option<DataPoint>,
    pub data: DataPoint,
}

impl Entry {
    /// The chunk id, or `ChunkId(0)` for bank items.
    pub fn id(&self) -> ChunkId {
        match self.kind {
            EntryKind::Chunk(id) => id,
            EntryKind::Item { .. } => ChunkId(0),
        }
    }

    pub fn handle(&self) -> u32 {
        match self.kind {
            EntryKind::Chunk(_) => 0,
            EntryKind::Item { handle } => handle,
        }
    }

    /// Reads one `{id, mode, size, bytes}` chunk entry. A size running
    /// past the end of the buffer is fatal.
    pub fn read_chunk(strm: &mut Stream, old: bool) -> Result<Entry> {
        let position = strm.position();
        let id = ChunkId(strm.read_u16().context("reading chunk id")?);
        let raw_mode = strm
            .read_u16()
            .with_context(|| format!("reading mode of chunk {id}"))?;
        let mode = Encoding::from_u16(raw_mode)
            .ok_or(DecodeError::InvalidMode(raw_mode))
            .with_context(|| format!("chunk {id}"))?;
        let size = strm
            .read_u32()
            .with_context(|| format!("reading size of chunk {id}"))? as usize;
        let data = DataPoint::read(strm, size).with_context(|| format!("truncated chunk {id}"))?;
        Ok(Entry {
            kind: EntryKind::Chunk(id),
            mode,
            position,
            end: strm.position(),
            old,
            header: None,
            data,
        })
    }

    /// Reads one bank item. Items carry no mode field of their own: the
    /// bank context supplies `compressed`, and old-dialect banks may use a
    /// 16-bit handle/size and a fixed-size header block.
    pub fn read_item(
        strm: &mut Stream,
        old: bool,
        compressed: bool,
        header_size: usize,
        small_size: bool,
    ) -> Result<Entry> {
        let position = strm.position();
        let handle = if old {
            strm.read_u16().context("reading item handle")? as u32
        } else {
            strm.read_u32().context("reading item handle")?
        };
        let header = if header_size > 0 {
            Some(
                DataPoint::read(strm, header_size)
                    .with_context(|| format!("truncated header of item {handle:#x}"))?,
            )
        } else {
            None
        };
        let size = if small_size {
            strm.read_u16().context("reading item size")? as usize
        } else {
            strm.read_u32().context("reading item size")? as usize
        };
        let data =
            DataPoint::read(strm, size).with_context(|| format!("truncated item {handle:#x}"))?;
        Ok(Entry {
            kind: EntryKind::Item { handle },
            mode: if compressed {
                Encoding::Compressed
            } else {
                Encoding::Plain
            },
            position,
            end: strm.position(),
            old,
            header,
            data,
        })
    }

    /// Decodes the entry's payload to plaintext, bounded by `max_size`
    /// where the caller knows the decoded size up front.
    pub fn decode_with_max(&self, decoder: &Decoder, max_size: Option<usize>) -> Result<Vec<u8>> {
        match self.kind {
            EntryKind::Chunk(id) => decoder
                .decode(id, self.mode, &self.data.data, max_size)
                .with_context(|| format!("decoding chunk {id}")),
            EntryKind::Item { handle } => match self.mode {
                Encoding::Plain => Ok(self.data.data.to_vec()),
                Encoding::Compressed => {
                    // item payloads carry their decoded size in front
                    let bytes = &self.data.data;
                    if bytes.len() < 4 {
                        return Err(DecodeError::out_of_data(bytes.len(), 4))
                            .with_context(|| format!("item {handle:#x} size prefix"));
                    }
                    let out_size =
                        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
                    codec::inflate(&bytes[4..], Some(out_size))
                        .with_context(|| format!("inflating item {handle:#x}"))
                }
                Encoding::Encrypted => Err(DecodeError::NoMode1Decoder)
                    .with_context(|| format!("item {handle:#x}")),
                Encoding::CompressedEncrypted => Err(DecodeError::NoMode3Decoder)
                    .with_context(|| format!("item {handle:#x}")),
            },
        }
    }

    pub fn decode(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        self.decode_with_max(decoder, None)
    }

    /// The item header block, raw. Headers precede the payload encoding
    /// and are never transformed themselves.
    pub fn decode_header(&self) -> Result<Vec<u8>, DecodeError> {
        self.header
            .as_ref()
            .map(|header| header.data.to_vec())
            .ok_or(DecodeError::NoMode0)
    }

    /// Stored payload bytes, untransformed.
    pub fn raw(&self) -> &Bytes {
        &self.data.data
    }
}

/// An untyped chunk kept for raw retention: unknown ids, and known ids
/// the tree stores without interpreting.
#[derive(Debug, Clone)]
pub struct BasicChunk {
    pub entry: Entry,
}

impl BasicChunk {
    pub fn read(strm: &mut Stream, old: bool) -> Result<Self> {
        Ok(BasicChunk {
            entry: Entry::read_chunk(strm, old)?,
        })
    }

    pub fn decoded(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        self.entry.decode(decoder)
    }
}

impl From<Entry> for BasicChunk {
    fn from(entry: Entry) -> Self {
        BasicChunk { entry }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn stream(bytes: Vec<u8>) -> Stream {
        Stream::new(Bytes::from(bytes))
    }

    pub(crate) fn chunk_bytes(id: u16, mode: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&mode.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn chunk_entry_spans_lie_within_the_buffer() {
        let mut strm = stream(chunk_bytes(0x2225, 0, b"Hello"));
        let entry = Entry::read_chunk(&mut strm, false).unwrap();
        assert_eq!(entry.kind, EntryKind::Chunk(ChunkId::TITLE));
        assert_eq!(entry.position, 0);
        assert_eq!(entry.data.position, 8);
        assert_eq!(entry.end, 13);
        assert!(entry.end <= strm.size());
        assert_eq!(entry.raw().as_ref(), b"Hello");
    }

    #[test]
    fn truncated_chunk_is_out_of_data() {
        let mut bytes = chunk_bytes(0x2225, 0, b"Hello");
        bytes[4..8].copy_from_slice(&100u32.to_le_bytes());
        let err = Entry::read_chunk(&mut stream(bytes), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::OutOfData { .. })
        ));
    }

    #[test]
    fn chunk_mode_out_of_range_is_invalid() {
        let err = Entry::read_chunk(&mut stream(chunk_bytes(0x2225, 7, b"")), false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::InvalidMode(7))
        );
    }

    #[test]
    fn item_entry_reads_header_block_and_payload() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes()); // handle
        bytes.extend_from_slice(&[0xAA; 8]); // header block
        bytes.extend_from_slice(&3u32.to_le_bytes()); // size
        bytes.extend_from_slice(b"abc");
        let entry = Entry::read_item(&mut stream(bytes), false, false, 8, false).unwrap();
        assert_eq!(entry.handle(), 7);
        assert_eq!(entry.decode_header().unwrap(), vec![0xAA; 8]);
        assert_eq!(entry.decode(&Decoder::default()).unwrap(), b"abc");
    }

    #[test]
    fn compressed_item_payload_round_trips() {
        let payload = b"pixel data pixel data pixel data";
        let mut data = (payload.len() as u32).to_le_bytes().to_vec();
        data.extend(crate::codec::tests::zlib(payload));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);

        let entry = Entry::read_item(&mut stream(bytes), false, true, 0, false).unwrap();
        assert_eq!(entry.decode(&Decoder::default()).unwrap(), payload);
    }

    #[test]
    fn old_item_uses_narrow_handle_and_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(b"ok");
        let entry = Entry::read_item(&mut stream(bytes), true, false, 0, true).unwrap();
        assert_eq!(entry.handle(), 3);
        assert_eq!(entry.raw().as_ref(), b"ok");
        assert!(entry.decode_header().is_err());
    }
}
