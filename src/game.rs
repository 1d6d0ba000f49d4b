//! The game aggregate: one decode pass over a loaded executable produces
//! a read-only typed tree plus handle lookup tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::chunks::frame::Frame;
use crate::chunks::header::Header;
use crate::chunks::image::ImageItem;
use crate::chunks::object::ObjectItem;
use crate::chunks::{ChunkId, Dialect};
use crate::cipher::{KeyMaterial, KeySchedule};
use crate::codec::Decoder;
use crate::error::DecodeError;
use crate::exe::{self, PackFile, ProductHeader, Signature};
use crate::stream::Stream;

/// Decode progress as a fraction in `[0, 1]`. The value is f32 bits in an
/// atomic so a UI thread can poll it without tearing; updates keep the
/// maximum, so the fraction never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<AtomicU32>);

impl Progress {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn advance(&self, fraction: f32) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (fraction > f32::from_bits(bits)).then(|| fraction.to_bits())
            });
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Treat the game as a compatibility build even if the container does
    /// not say so.
    pub force_compat: bool,
    /// Checked at chunk boundaries; setting it makes the decode return
    /// `DecodeError::Cancelled` while keeping the partial tree.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// The root aggregate. Created empty, populated by [`Game::decode`], then
/// read-only to viewers and exporters.
#[derive(Debug, Default)]
pub struct Game {
    pub buffer: Bytes,

    pub signature: Option<Signature>,
    /// Absolute offset of the game magic
    pub data_position: usize,
    pub pe_sections: u16,
    pub pack_files: Vec<PackFile>,
    pub product: Option<ProductHeader>,

    pub unicode: bool,
    pub old_game: bool,
    pub compat: bool,
    pub cnc: bool,
    pub recompiled: bool,

    pub decoder: Decoder,
    pub key_material: KeyMaterial,

    /// Chunk ids of the containers currently being walked
    pub state: Vec<ChunkId>,
    pub progress: Progress,
    cancel: Option<Arc<AtomicBool>>,

    pub header: Header,

    pub image_handles: HashMap<u32, usize>,
    pub object_handles: HashMap<u16, usize>,
}

impl Game {
    pub fn new(buffer: Bytes) -> Self {
        Game {
            buffer,
            ..Game::default()
        }
    }

    /// Runs the full decode pass. On failure the tree holds whatever was
    /// parsed before the error; cancellation is surfaced as
    /// [`DecodeError::Cancelled`].
    pub fn decode(&mut self, options: &DecodeOptions) -> Result<()> {
        self.cancel = options.cancel.clone();

        let payload = exe::locate(&self.buffer).context("locating game payload")?;
        self.unicode = payload.signature.unicode();
        self.recompiled = payload.signature.recompiled();
        self.cnc = payload.signature.cnc();
        self.signature = Some(payload.signature);
        self.data_position = payload.data_position;
        self.pe_sections = payload.pe_sections;
        self.pack_files = payload.pack_files;

        self.old_game = payload.product.runtime_version.old();
        self.decoder.dialect = if self.old_game {
            Dialect::Old
        } else if payload.product.product_build <= 284 {
            Dialect::V284
        } else {
            Dialect::V288
        };
        self.compat = options.force_compat || self.recompiled;
        self.product = Some(payload.product);

        let mut strm = Stream::new(self.buffer.clone());
        strm.seek(payload.chunk_position)
            .context("seeking chunk stream")?;

        // swap the header out so the walker can fill it incrementally and
        // a failed walk still leaves the partial tree on the game
        let mut header = std::mem::take(&mut self.header);
        let walked = header.read_into(self, &mut strm);
        self.header = header;
        walked.context("walking chunk stream")?;

        self.build_handle_maps();
        self.progress.advance(1.0);
        Ok(())
    }

    /// Key derivation fires exactly once, as soon as the title, copyright
    /// and project strings have all been seen.
    pub(crate) fn maybe_derive_key(&mut self) {
        if self.decoder.key.is_some() || !self.key_material.complete() {
            return;
        }
        let Some(product) = &self.product else { return };
        self.decoder.key = Some(KeySchedule::derive(
            &self.key_material,
            product.runtime_version.key_byte(),
            self.decoder.dialect,
            self.unicode,
        ));
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), DecodeError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(DecodeError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn progress_to(&self, end: usize) {
        if !self.buffer.is_empty() {
            self.progress.advance(end as f32 / self.buffer.len() as f32);
        }
    }

    /// Handle maps index into the banks; on duplicate handles the later
    /// item wins, matching what recompiled games actually ship.
    fn build_handle_maps(&mut self) {
        self.image_handles.clear();
        self.object_handles.clear();
        if let Some(bank) = &self.header.image_bank {
            for (index, item) in bank.items.iter().enumerate() {
                self.image_handles.insert(item.handle(), index);
            }
        }
        if let Some(bank) = &self.header.object_bank {
            for (index, item) in bank.items.iter().enumerate() {
                self.object_handles.insert(item.handle, index);
            }
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.header.title.as_ref().map(|title| title.value.as_str())
    }

    pub fn get_image(&self, handle: u32) -> Option<&ImageItem> {
        let index = *self.image_handles.get(&handle)?;
        self.header.image_bank.as_ref()?.items.get(index)
    }

    pub fn get_object(&self, handle: u16) -> Option<&ObjectItem> {
        let index = *self.object_handles.get(&handle)?;
        self.header.object_bank.as_ref()?.items.get(index)
    }

    /// Frames are addressed through the frame-handle table when present,
    /// directly by index otherwise.
    pub fn get_frame(&self, handle: u16) -> Option<&Frame> {
        let bank = self.header.frame_bank.as_ref()?;
        let index = match &self.header.frame_handles {
            Some(table) => *table.handles.get(handle as usize)? as usize,
            None => handle as usize,
        };
        bank.items.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::image::GraphicsMode;
    use crate::chunks::strings::StringsChunk;
    use crate::codec::tests::zlib;
    use crate::exe::fixtures::{exe_with_payload, product_header_bytes};
    use crate::exe::ProductCode;

    fn chunk(id: u16, mode: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&mode.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn last() -> Vec<u8> {
        chunk(0x7F7F, 0, b"")
    }

    fn game_exe(magic: &[u8; 4], chunks: &[u8]) -> Vec<u8> {
        let mut payload = product_header_bytes(0x0302, 290);
        payload.extend_from_slice(chunks);
        exe_with_payload(magic, &payload)
    }

    fn decode(bytes: Vec<u8>) -> Result<Game> {
        let mut game = Game::new(Bytes::from(bytes));
        game.decode(&DecodeOptions::default())?;
        Ok(game)
    }

    fn test_schedule() -> KeySchedule {
        let material = KeyMaterial {
            title: Some("A".into()),
            copyright: Some("C".into()),
            project: Some("P".into()),
        };
        KeySchedule::derive(&material, ProductCode::Mmf2.key_byte(), Dialect::V288, false)
    }

    /// Compressed image item with a single Rgb24 pixel.
    fn image_item(handle: u32, r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut contents = Vec::new();
        contents.extend_from_slice(&0u32.to_le_bytes()); // checksum
        contents.extend_from_slice(&0u32.to_le_bytes()); // reference
        contents.extend_from_slice(&4u32.to_le_bytes()); // data size
        contents.extend_from_slice(&1u16.to_le_bytes()); // width
        contents.extend_from_slice(&1u16.to_le_bytes()); // height
        contents.push(7); // Rgb24
        contents.push(0); // flags
        contents.extend_from_slice(&0u16.to_le_bytes()); // unknown
        contents.extend_from_slice(&[0; 8]); // hotspot + action point
        contents.extend_from_slice(&[0; 4]); // transparent color
        contents.extend_from_slice(&[b, g, r, 0]); // one padded BGR row

        let mut data = (contents.len() as u32).to_le_bytes().to_vec();
        data.extend(zlib(&contents));

        let mut item = Vec::new();
        item.extend_from_slice(&handle.to_le_bytes());
        item.extend_from_slice(&(data.len() as u32).to_le_bytes());
        item.extend_from_slice(&data);
        item
    }

    #[test]
    fn trivial_mode0_header() {
        let mut chunks = chunk(0x2225, 0, b"Hello");
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        assert_eq!(game.title(), Some("Hello"));
        assert!(game.header.image_bank.is_none());
        assert!(game.header.unknown_chunks.is_empty());
        assert!(game.state.is_empty());
        assert_eq!(game.progress.get(), 1.0);
    }

    #[test]
    fn unknown_compressed_chunk_is_preserved() {
        let mut chunks = chunk(0xDEAD, 2, &zlib(b"abc"));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        assert_eq!(game.header.unknown_compressed.len(), 1);
        let stored = &game.header.unknown_compressed[0];
        assert_eq!(stored.entry.id().0, 0xDEAD);
        assert_eq!(stored.decoded(&game.decoder).unwrap(), b"abc");
    }

    #[test]
    fn encrypted_string_chunk_decodes_after_key_derivation() {
        let encrypted = test_schedule().encrypt(b"world");
        let mut chunks = chunk(0x2225, 0, b"A");
        chunks.extend(chunk(0x2232, 0, b"C"));
        chunks.extend(chunk(0x223E, 0, b"P"));
        chunks.extend(chunk(0x2226, 1, &encrypted));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        assert_eq!(game.header.author.as_ref().unwrap().value, "world");
        assert!(game.decoder.key.is_some());
    }

    #[test]
    fn unknown_encrypted_chunk_is_kept_raw_and_non_fatal() {
        let encrypted = test_schedule().encrypt(b"one\0two\0");
        // unknown id arrives before any key material exists; the walk
        // must retain it raw rather than decrypt it
        let mut chunks = chunk(0xBEEF, 1, &encrypted);
        chunks.extend(chunk(0x2225, 0, b"A"));
        chunks.extend(chunk(0x2232, 0, b"C"));
        chunks.extend(chunk(0x223E, 0, b"P"));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        assert_eq!(game.header.unknown_strings.len(), 1);
        let stored = &game.header.unknown_strings[0];
        assert_eq!(stored.entry.id().0, 0xBEEF);
        assert_eq!(stored.entry.raw().as_ref(), &encrypted[..]);

        // interpretation is deferred; by the end of the walk the key exists
        let values = StringsChunk::decode(&game, stored).unwrap();
        assert!(values.contains(&"two".to_string()));
    }

    #[test]
    fn encrypted_chunk_before_key_derivation_is_invalid_state() {
        let encrypted = test_schedule().encrypt(b"world");
        let mut chunks = chunk(0x2226, 1, &encrypted);
        chunks.extend(last());
        let err = decode(game_exe(b"PAME", &chunks)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::InvalidState(_))
        ));
    }

    #[test]
    fn truncated_chunk_fails_with_out_of_data() {
        let mut chunks = Vec::new();
        chunks.extend_from_slice(&0x2225u16.to_le_bytes());
        chunks.extend_from_slice(&0u16.to_le_bytes());
        chunks.extend_from_slice(&100u32.to_le_bytes());
        chunks.extend_from_slice(&[0; 10]);
        let err = decode(game_exe(b"PAME", &chunks)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::OutOfData { .. })
        ));
    }

    #[test]
    fn image_bank_reads_items_and_sentinel() {
        let mut chunks = chunk(0x222E, 0, &2u32.to_le_bytes());
        chunks.extend(image_item(5, 255, 0, 0));
        chunks.extend(image_item(9, 0, 255, 0));
        chunks.extend(chunk(0x6667, 0, b""));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        let bank = game.header.image_bank.as_ref().unwrap();
        assert_eq!(bank.items.len(), 2);
        assert!(bank.end.is_some());
        assert_eq!(game.image_handles.len(), 2);

        // handle map round-trips back to the item
        let item = game.get_image(9).unwrap();
        assert_eq!(item.handle(), 9);
        assert_eq!(item.graphics_mode, GraphicsMode::Rgb24);
        let rgba = item.rgba(&game.decoder, false, None).unwrap();
        assert_eq!(rgba, vec![0, 255, 0, 255]);
    }

    #[test]
    fn duplicate_image_handles_later_wins() {
        let mut chunks = chunk(0x222E, 0, &2u32.to_le_bytes());
        chunks.extend(image_item(5, 255, 0, 0));
        chunks.extend(image_item(5, 0, 0, 255));
        chunks.extend(chunk(0x6667, 0, b""));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        assert_eq!(game.image_handles.len(), 1);
        assert_eq!(game.image_handles[&5], 1);
    }

    #[test]
    fn dialect_selection_switches_string_width() {
        let mut narrow = chunk(0x2225, 0, b"Hi");
        narrow.extend(last());
        let ansi = decode(game_exe(b"PAME", &narrow)).unwrap();
        assert!(!ansi.unicode);
        assert_eq!(ansi.title(), Some("Hi"));

        let mut wide = chunk(0x2225, 0, &[b'H', 0, b'i', 0]);
        wide.extend(last());
        let unicode = decode(game_exe(b"PAMU", &wide)).unwrap();
        assert!(unicode.unicode);
        assert_eq!(unicode.title(), Some("Hi"));
    }

    #[test]
    fn product_code_selects_dialect_and_flags() {
        let mut payload = product_header_bytes(0x0300, 0);
        payload.extend(chunk(0x2225, 0, b"Old"));
        payload.extend(last());
        let old = decode(exe_with_payload(b"PAME", &payload)).unwrap();
        assert!(old.old_game);
        assert_eq!(old.decoder.dialect, Dialect::Old);

        let mut payload = product_header_bytes(0x0302, 283);
        payload.extend(last());
        let v284 = decode(exe_with_payload(b"PMUC", &payload)).unwrap();
        assert!(!v284.old_game);
        assert!(v284.cnc);
        assert_eq!(v284.decoder.dialect, Dialect::V284);
    }

    #[test]
    fn cancellation_returns_partial_tree() {
        let mut chunks = chunk(0x2225, 0, b"Hello");
        chunks.extend(last());
        let flag = Arc::new(AtomicBool::new(true));
        let mut game = Game::new(Bytes::from(game_exe(b"PAME", &chunks)));
        let err = game
            .decode(&DecodeOptions {
                cancel: Some(flag),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::Cancelled)
        );
        // container metadata parsed before the walk is still there
        assert!(game.product.is_some());
    }

    #[test]
    fn entries_lie_within_the_buffer() {
        let mut chunks = chunk(0x2225, 0, b"Hello");
        chunks.extend(chunk(0x2224, 0, &[0; 32]));
        chunks.extend(last());
        let game = decode(game_exe(b"PAME", &chunks)).unwrap();

        for entry in [
            &game.header.title.as_ref().unwrap().entry,
            game.header.entry.as_ref().unwrap(),
            game.header.last.as_ref().unwrap(),
        ] {
            assert!(entry.position <= entry.end);
            assert!(entry.end <= game.buffer.len());
            assert_eq!(
                entry.data.position + entry.data.expected_size,
                entry.end
            );
        }
    }
}
