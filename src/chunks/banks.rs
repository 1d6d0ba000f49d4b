//! Sound, music and font banks.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::entry::{BasicChunk, Entry};
use super::image::{item_count, read_bank_end};
use super::ChunkId;
use crate::codec::Decoder;
use crate::game::Game;
use crate::stream::{Stream, StringEncoding};

/// Size of the fixed header block in front of a sound item's payload.
const SOUND_HEADER_SIZE: usize = 24;

/// Best-effort container sniff for export file extensions.
pub fn sniff_extension(payload: &[u8]) -> &'static str {
    if payload.starts_with(b"RIFF") {
        "wav"
    } else if payload.starts_with(b"OggS") {
        "ogg"
    } else if payload.starts_with(b"MThd") {
        "mid"
    } else if payload.starts_with(b"ID3") || payload.starts_with(&[0xFF, 0xFB]) {
        "mp3"
    } else {
        "bin"
    }
}

#[derive(Debug, Clone)]
pub struct SoundItem {
    pub entry: Entry,
    pub checksum: u32,
    pub references: u32,
    pub decompressed_size: u32,
    pub flags: u32,
    pub name: String,
    /// Offset of the audio payload past the embedded name
    pub data_offset: usize,
}

impl SoundItem {
    pub fn read(game: &Game, strm: &mut Stream) -> Result<Self> {
        if game.old_game {
            // old banks carry bare compressed items with 16-bit sizes
            let entry = Entry::read_item(strm, true, true, 0, true)
                .context("reading old sound item")?;
            return Ok(SoundItem {
                entry,
                checksum: 0,
                references: 0,
                decompressed_size: 0,
                flags: 0,
                name: String::new(),
                data_offset: 0,
            });
        }

        let entry = Entry::read_item(strm, false, false, SOUND_HEADER_SIZE, false)
            .context("reading sound item")?;
        let handle = entry.handle();
        let header = entry.decode_header()
            .with_context(|| format!("sound item {handle:#x} header"))?;
        let mut header = Stream::new(Bytes::from(header));
        let checksum = header.read_u32()?;
        let references = header.read_u32()?;
        let decompressed_size = header.read_u32()?;
        let flags = header.read_u32()?;
        header.skip(4)?; // reserved
        let name_length = header.read_u32()? as usize;

        let mut data = Stream::new(entry.raw().clone());
        let encoding = if game.unicode {
            StringEncoding::Wide
        } else {
            StringEncoding::Narrow
        };
        let name = data
            .read_string(name_length, encoding)
            .with_context(|| format!("sound item {handle:#x} name"))?;

        Ok(SoundItem {
            data_offset: data.position(),
            entry,
            checksum,
            references,
            decompressed_size,
            flags,
            name,
        })
    }

    pub fn handle(&self) -> u32 {
        self.entry.handle()
    }

    /// The audio payload, past the embedded name.
    pub fn payload(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        let decoded = self.entry.decode(decoder)?;
        Ok(decoded.get(self.data_offset..).unwrap_or_default().to_vec())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    pub entry: Option<Entry>,
    pub items: Vec<SoundItem>,
    pub end: Option<BasicChunk>,
}

impl SoundBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::SOUND_BANK);
        let count = item_count(game, &entry).context("reading sound bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let item = SoundItem::read(game, strm).with_context(|| format!("sound item {i}"))?;
            self.items.push(item);
        }
        self.end = Some(read_bank_end(game, strm, ChunkId::SOUND_END)?);
        game.state.pop();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MusicItem {
    pub entry: Entry,
}

impl MusicItem {
    pub fn read(game: &Game, strm: &mut Stream) -> Result<Self> {
        let entry = Entry::read_item(strm, game.old_game, true, 0, game.old_game)
            .context("reading music item")?;
        Ok(MusicItem { entry })
    }

    pub fn handle(&self) -> u32 {
        self.entry.handle()
    }

    pub fn payload(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        self.entry.decode(decoder)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MusicBank {
    pub entry: Option<Entry>,
    pub items: Vec<MusicItem>,
    pub end: Option<BasicChunk>,
}

impl MusicBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::MUSIC_BANK);
        let count = item_count(game, &entry).context("reading music bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let item = MusicItem::read(game, strm).with_context(|| format!("music item {i}"))?;
            self.items.push(item);
        }
        self.end = Some(read_bank_end(game, strm, ChunkId::MUSIC_END)?);
        game.state.pop();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FontItem {
    pub entry: Entry,
}

impl FontItem {
    pub fn read(game: &Game, strm: &mut Stream) -> Result<Self> {
        let entry = Entry::read_item(strm, game.old_game, true, 0, game.old_game)
            .context("reading font item")?;
        Ok(FontItem { entry })
    }

    pub fn handle(&self) -> u32 {
        self.entry.handle()
    }

    pub fn payload(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        self.entry.decode(decoder)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FontBank {
    pub entry: Option<Entry>,
    pub items: Vec<FontItem>,
    pub end: Option<BasicChunk>,
}

impl FontBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::FONT_BANK);
        let count = item_count(game, &entry).context("reading font bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let item = FontItem::read(game, strm).with_context(|| format!("font item {i}"))?;
            self.items.push(item);
        }
        self.end = Some(read_bank_end(game, strm, ChunkId::FONT_END)?);
        game.state.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_sniffing() {
        assert_eq!(sniff_extension(b"RIFF....WAVE"), "wav");
        assert_eq!(sniff_extension(b"OggS"), "ogg");
        assert_eq!(sniff_extension(b"MThd"), "mid");
        assert_eq!(sniff_extension(b"garbage"), "bin");
    }
}
