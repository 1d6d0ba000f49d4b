//! The root header: every top-level chunk in the resource stream, typed
//! where the format gives the chunk structure and raw otherwise.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::banks::{FontBank, MusicBank, SoundBank};
use super::entry::{BasicChunk, Entry};
use super::frame::FrameBank;
use super::image::{Icon, ImageBank};
use super::object::ObjectBank;
use super::strings::{StringChunk, StringsChunk};
use super::{ChunkId, Encoding};
use crate::codec;
use crate::game::Game;
use crate::stream::{PrefixWidth, Stream, StringEncoding};

/// Typed reader for the extended header chunk.
#[derive(Debug, Clone)]
pub struct ExtendedHeader {
    pub entry: Entry,
    pub flags: u32,
    pub build_type: u32,
    pub build_flags: u32,
    pub screen_ratio_tolerance: u16,
    pub screen_angle: u16,
}

impl ExtendedHeader {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .context("decoding extended header")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        Ok(ExtendedHeader {
            flags: strm.read_u32()?,
            build_type: strm.read_u32()?,
            build_flags: strm.read_u32()?,
            screen_ratio_tolerance: strm.read_u16()?,
            screen_angle: strm.read_u16()?,
            entry,
        })
    }
}

/// One embedded binary file.
#[derive(Debug, Clone)]
pub struct BinaryFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Embedded binary file list, exportable by the CLI.
#[derive(Debug, Clone)]
pub struct BinaryFiles {
    pub entry: Entry,
    pub items: Vec<BinaryFile>,
}

impl BinaryFiles {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .context("decoding binary files")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let count = strm.read_u32().context("binary file count")?;
        let encoding = if game.unicode {
            StringEncoding::Wide
        } else {
            StringEncoding::Narrow
        };
        let mut items = Vec::with_capacity(count.min(1024) as usize);
        for i in 0..count {
            let name = strm
                .read_length_prefixed(PrefixWidth::U16, encoding)
                .with_context(|| format!("binary file {i} name"))?;
            let size = strm.read_u32().with_context(|| format!("binary file {i} size"))?;
            let data = strm
                .read_span(size as usize)
                .with_context(|| format!("binary file {i} data"))?
                .to_vec();
            items.push(BinaryFile { name, data });
        }
        Ok(BinaryFiles { entry, items })
    }
}

/// Frame handle table: indexes into the frame bank in play order.
#[derive(Debug, Clone)]
pub struct FrameHandles {
    pub entry: Entry,
    pub handles: Vec<u16>,
}

impl FrameHandles {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .context("decoding frame handles")?;
        let handles = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(FrameHandles { entry, handles })
    }
}

/// Recompiled games append per-object item-entry lists; kept as entries
/// into the decoded block.
#[derive(Debug, Clone)]
pub struct ItemEntryList {
    pub entry: Entry,
    pub items: Vec<Entry>,
}

impl ItemEntryList {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .with_context(|| format!("decoding {}", entry.id()))?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let mut items = Vec::new();
        while strm.remaining() > 0 {
            items.push(Entry::read_item(&mut strm, false, false, 0, false)?);
        }
        Ok(ItemEntryList { entry, items })
    }
}

/// The typed header tree: one slot per known top-level chunk, sibling
/// lists for everything unknown. Later duplicates of a known chunk win;
/// recompiled games re-emit several of them.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub entry: Option<Entry>,
    pub title: Option<StringChunk>,
    pub author: Option<StringChunk>,
    pub copyright: Option<StringChunk>,
    pub about: Option<StringChunk>,
    pub output_path: Option<StringChunk>,
    pub project_path: Option<StringChunk>,
    pub extension_path: Option<StringChunk>,
    pub title2: Option<StringChunk>,

    pub vitalise_preview: Option<BasicChunk>,
    pub menu: Option<BasicChunk>,
    pub extensions: Option<BasicChunk>,
    pub extension_data: Option<BasicChunk>,
    pub other_extension: Option<BasicChunk>,
    pub extension_list: Option<BasicChunk>,
    pub app_doc: Option<BasicChunk>,
    pub demo_version: Option<BasicChunk>,
    pub security_number: Option<BasicChunk>,
    pub menu_images: Option<BasicChunk>,
    pub movement_extensions: Option<BasicChunk>,
    pub object_bank2: Option<BasicChunk>,
    pub exe_only: Option<BasicChunk>,
    pub protection: Option<BasicChunk>,
    pub shaders: Option<BasicChunk>,
    pub spacer: Option<BasicChunk>,
    pub chunk_224f: Option<BasicChunk>,

    pub global_events: Option<BasicChunk>,
    pub global_strings: Option<BasicChunk>,
    pub global_values: Option<BasicChunk>,
    pub global_value_names: Option<StringsChunk>,
    pub global_string_names: Option<StringsChunk>,

    pub icon: Option<Icon>,
    pub extended_header: Option<ExtendedHeader>,
    pub binary_files: Option<BinaryFiles>,
    pub frame_handles: Option<FrameHandles>,

    pub frame_bank: Option<FrameBank>,
    pub object_bank: Option<ObjectBank>,
    pub image_bank: Option<ImageBank>,
    pub sound_bank: Option<SoundBank>,
    pub music_bank: Option<MusicBank>,
    pub font_bank: Option<FontBank>,

    // recompiled games
    pub object_names: Option<StringsChunk>,
    pub object_properties: Option<ItemEntryList>,
    pub truetype_fonts_meta: Option<BasicChunk>,
    pub truetype_fonts: Option<ItemEntryList>,

    pub unknown_chunks: Vec<BasicChunk>,
    pub unknown_strings: Vec<BasicChunk>,
    pub unknown_compressed: Vec<BasicChunk>,

    pub last: Option<Entry>,
}

impl Header {
    /// The protection block. Some builds deflate it, some store it raw,
    /// with nothing in the chunk saying which.
    pub fn protection_data(&self) -> Option<Vec<u8>> {
        self.protection
            .as_ref()
            .map(|chunk| codec::inflate_or_raw(chunk.entry.raw()))
    }

    /// Walks the top-level chunk stream until the LAST sentinel, typing
    /// each chunk into its slot. Populates `self` incrementally so a
    /// cancelled or failed walk leaves the part that did parse browsable.
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream) -> Result<()> {
        game.state.push(ChunkId::HEADER);
        loop {
            game.check_cancelled().context("header walk")?;
            let entry = Entry::read_chunk(strm, game.old_game).context("reading header chunk")?;
            game.progress_to(entry.end);
            let id = entry.id();
            match id {
                ChunkId::LAST => {
                    self.last = Some(entry);
                    break;
                }
                ChunkId::HEADER => self.entry = Some(entry),
                ChunkId::TITLE => {
                    let chunk = StringChunk::from_entry(game, entry)?;
                    game.key_material.title = Some(chunk.value.clone());
                    game.maybe_derive_key();
                    self.title = Some(chunk);
                }
                ChunkId::AUTHOR => self.author = Some(StringChunk::from_entry(game, entry)?),
                ChunkId::COPYRIGHT => {
                    let chunk = StringChunk::from_entry(game, entry)?;
                    game.key_material.copyright = Some(chunk.value.clone());
                    game.maybe_derive_key();
                    self.copyright = Some(chunk);
                }
                ChunkId::PROJECT_PATH => {
                    let chunk = StringChunk::from_entry(game, entry)?;
                    game.key_material.project = Some(chunk.value.clone());
                    game.maybe_derive_key();
                    self.project_path = Some(chunk);
                }
                ChunkId::ABOUT => self.about = Some(StringChunk::from_entry(game, entry)?),
                ChunkId::OUTPUT_PATH => {
                    self.output_path = Some(StringChunk::from_entry(game, entry)?)
                }
                ChunkId::EXTENSION_PATH => {
                    self.extension_path = Some(StringChunk::from_entry(game, entry)?)
                }
                ChunkId::TITLE2 => self.title2 = Some(StringChunk::from_entry(game, entry)?),

                ChunkId::VITALISE_PREVIEW => self.vitalise_preview = Some(entry.into()),
                ChunkId::MENU => self.menu = Some(entry.into()),
                ChunkId::EXTENSIONS => self.extensions = Some(entry.into()),
                ChunkId::EXTENSION_DATA => self.extension_data = Some(entry.into()),
                ChunkId::OTHER_EXTENSION => self.other_extension = Some(entry.into()),
                ChunkId::EXTENSION_LIST => self.extension_list = Some(entry.into()),
                ChunkId::APP_DOC => self.app_doc = Some(entry.into()),
                ChunkId::DEMO_VERSION => self.demo_version = Some(entry.into()),
                ChunkId::SECURITY_NUMBER => self.security_number = Some(entry.into()),
                ChunkId::MENU_IMAGES => self.menu_images = Some(entry.into()),
                ChunkId::MOVEMENT_EXTENSIONS => self.movement_extensions = Some(entry.into()),
                ChunkId::OBJECT_BANK2 => self.object_bank2 = Some(entry.into()),
                ChunkId::EXE_ONLY => self.exe_only = Some(entry.into()),
                ChunkId::PROTECTION => self.protection = Some(entry.into()),
                ChunkId::SHADERS => self.shaders = Some(entry.into()),
                ChunkId::SPACER => self.spacer = Some(entry.into()),
                ChunkId::CHUNK_224F => self.chunk_224f = Some(entry.into()),

                ChunkId::GLOBAL_EVENTS => self.global_events = Some(entry.into()),
                ChunkId::GLOBAL_STRINGS => self.global_strings = Some(entry.into()),
                ChunkId::GLOBAL_VALUES => self.global_values = Some(entry.into()),
                ChunkId::GLOBAL_VALUE_NAMES => {
                    self.global_value_names = Some(StringsChunk::from_entry(game, entry)?)
                }
                ChunkId::GLOBAL_STRING_NAMES => {
                    self.global_string_names = Some(StringsChunk::from_entry(game, entry)?)
                }

                ChunkId::ICON => self.icon = Some(Icon::from_entry(game, entry)?),
                ChunkId::EXTENDED_HEADER => {
                    self.extended_header = Some(ExtendedHeader::from_entry(game, entry)?)
                }
                ChunkId::BINARY_FILES => {
                    self.binary_files = Some(BinaryFiles::from_entry(game, entry)?)
                }
                ChunkId::FRAME_HANDLES => {
                    self.frame_handles = Some(FrameHandles::from_entry(game, entry)?)
                }

                ChunkId::FRAME_BANK => {
                    let mut bank = FrameBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.frame_bank = Some(bank);
                    result.context("frame bank")?;
                }
                ChunkId::OBJECT_BANK => {
                    let mut bank = ObjectBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.object_bank = Some(bank);
                    result.context("object bank")?;
                }
                ChunkId::IMAGE_BANK => {
                    let mut bank = ImageBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.image_bank = Some(bank);
                    result.context("image bank")?;
                }
                ChunkId::SOUND_BANK => {
                    let mut bank = SoundBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.sound_bank = Some(bank);
                    result.context("sound bank")?;
                }
                ChunkId::MUSIC_BANK => {
                    let mut bank = MusicBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.music_bank = Some(bank);
                    result.context("music bank")?;
                }
                ChunkId::FONT_BANK => {
                    let mut bank = FontBank::default();
                    let result = bank.read_into(game, strm, entry);
                    self.font_bank = Some(bank);
                    result.context("font bank")?;
                }

                ChunkId::OBJECT_NAMES => {
                    self.object_names = Some(StringsChunk::from_entry(game, entry)?)
                }
                ChunkId::OBJECT_PROPERTIES => {
                    self.object_properties = Some(ItemEntryList::from_entry(game, entry)?)
                }
                ChunkId::TRUETYPE_FONTS_META => self.truetype_fonts_meta = Some(entry.into()),
                ChunkId::TRUETYPE_FONTS => {
                    self.truetype_fonts = Some(ItemEntryList::from_entry(game, entry)?)
                }

                // unknown ids degrade to raw retention, keyed by profile;
                // never decoded here, so a bad payload cannot fail the walk
                _ => match entry.mode {
                    Encoding::Plain => self.unknown_chunks.push(entry.into()),
                    Encoding::Encrypted => self.unknown_strings.push(entry.into()),
                    Encoding::Compressed | Encoding::CompressedEncrypted => {
                        self.unknown_compressed.push(entry.into())
                    }
                },
            }
        }
        game.state.pop();
        Ok(())
    }
}
