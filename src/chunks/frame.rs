//! Frame bank: frame containers and their typed children.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::entry::{BasicChunk, Entry};
use super::strings::StringChunk;
use super::{ChunkId, Color};
use crate::error::DecodeError;
use crate::game::Game;
use crate::stream::Stream;

/// Frame children appear at most once; a duplicate means the container is
/// malformed.
fn set_once<T>(slot: &mut Option<T>, value: T, id: ChunkId) -> Result<()> {
    if slot.is_some() {
        return Err(DecodeError::InvalidChunk(id.0)).with_context(|| format!("duplicate {id}"));
    }
    *slot = Some(value);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub entry: Entry,
    pub width: i32,
    pub height: i32,
    pub background: Color,
    pub flags: u32,
}

impl FrameHeader {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry.decode(&game.decoder).context("decoding frame header")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let width = strm.read_i32()?;
        let height = strm.read_i32()?;
        let r = strm.read_u8()?;
        let g = strm.read_u8()?;
        let b = strm.read_u8()?;
        strm.skip(1)?;
        let flags = strm.read_u32()?;
        Ok(FrameHeader {
            entry,
            width,
            height,
            background: Color::opaque(r, g, b),
            flags,
        })
    }
}

/// 256-entry frame palette, stored as RGB plus a filler byte.
#[derive(Debug, Clone)]
pub struct Palette {
    pub entry: Entry,
    pub unknown: u32,
    pub colors: Box<[Color; 256]>,
}

impl Palette {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry.decode(&game.decoder).context("decoding frame palette")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let unknown = strm.read_u32()?;
        let mut colors = Box::new([Color::default(); 256]);
        for color in colors.iter_mut() {
            let r = strm.read_u8()?;
            let g = strm.read_u8()?;
            let b = strm.read_u8()?;
            strm.skip(1)?;
            *color = Color::opaque(r, g, b);
        }
        Ok(Palette {
            entry,
            unknown,
            colors,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentType {
    None,
    Frame,
    FrameItem,
    Qualifier,
    Unknown(u16),
}

impl ParentType {
    fn from_u16(value: u16) -> Self {
        match value {
            0 => ParentType::None,
            1 => ParentType::Frame,
            2 => ParentType::FrameItem,
            3 => ParentType::Qualifier,
            other => ParentType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectInstance {
    pub handle: u16,
    pub info: u16,
    pub x: i32,
    pub y: i32,
    pub parent_type: ParentType,
    pub parent_handle: u16,
    pub layer: u16,
}

#[derive(Debug, Clone)]
pub struct ObjectInstances {
    pub entry: Entry,
    pub instances: Vec<ObjectInstance>,
}

impl ObjectInstances {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .context("decoding object instances")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let count = strm.read_u32()?;
        let mut instances = Vec::with_capacity(count.min(0x10000) as usize);
        for i in 0..count {
            let instance = (|| -> Result<ObjectInstance, DecodeError> {
                Ok(ObjectInstance {
                    handle: strm.read_u16()?,
                    info: strm.read_u16()?,
                    x: strm.read_i32()?,
                    y: strm.read_i32()?,
                    parent_type: ParentType::from_u16(strm.read_u16()?),
                    parent_handle: strm.read_u16()?,
                    layer: strm.read_u16()?,
                })
            })()
            .with_context(|| format!("object instance {i}"))?;
            strm.skip(2).context("object instance padding")?;
            instances.push(instance);
        }
        Ok(ObjectInstances { entry, instances })
    }
}

#[derive(Debug, Clone)]
pub struct VirtualSize {
    pub entry: Entry,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl VirtualSize {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry.decode(&game.decoder).context("decoding virtual size")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        Ok(VirtualSize {
            left: strm.read_i32()?,
            top: strm.read_i32()?,
            right: strm.read_i32()?,
            bottom: strm.read_i32()?,
            entry,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RandomSeed {
    pub entry: Entry,
    pub value: i16,
}

impl RandomSeed {
    fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry.decode(&game.decoder).context("decoding random seed")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        Ok(RandomSeed {
            value: strm.read_i16()?,
            entry,
        })
    }
}

/// One frame: a LAST-terminated container of optional children.
#[derive(Debug, Clone)]
pub struct Frame {
    pub entry: Entry,
    pub name: Option<StringChunk>,
    pub header: Option<FrameHeader>,
    pub password: Option<StringChunk>,
    pub palette: Option<Palette>,
    pub object_instances: Option<ObjectInstances>,
    pub fade_in_frame: Option<BasicChunk>,
    pub fade_out_frame: Option<BasicChunk>,
    pub fade_in: Option<BasicChunk>,
    pub fade_out: Option<BasicChunk>,
    pub events: Option<BasicChunk>,
    pub play_header: Option<BasicChunk>,
    pub additional_items: Option<BasicChunk>,
    pub additional_item_instances: Option<BasicChunk>,
    pub layers: Option<BasicChunk>,
    pub virtual_size: Option<VirtualSize>,
    pub demo_file_path: Option<StringChunk>,
    pub random_seed: Option<RandomSeed>,
    pub layer_effect: Option<BasicChunk>,
    pub movement_time_base: Option<BasicChunk>,
    pub mosaic_image_table: Option<BasicChunk>,
    pub effects: Option<BasicChunk>,
    pub iphone_options: Option<BasicChunk>,
    pub unknown_chunks: Vec<BasicChunk>,
    pub last: Option<Entry>,
}

impl Frame {
    fn new(entry: Entry) -> Self {
        Frame {
            entry,
            name: None,
            header: None,
            password: None,
            palette: None,
            object_instances: None,
            fade_in_frame: None,
            fade_out_frame: None,
            fade_in: None,
            fade_out: None,
            events: None,
            play_header: None,
            additional_items: None,
            additional_item_instances: None,
            layers: None,
            virtual_size: None,
            demo_file_path: None,
            random_seed: None,
            layer_effect: None,
            movement_time_base: None,
            mosaic_image_table: None,
            effects: None,
            iphone_options: None,
            unknown_chunks: Vec::new(),
            last: None,
        }
    }

    fn read_into(&mut self, game: &mut Game, strm: &mut Stream) -> Result<()> {
        game.state.push(ChunkId::FRAME);
        loop {
            game.check_cancelled()?;
            let entry = Entry::read_chunk(strm, game.old_game).context("reading frame child")?;
            let id = entry.id();
            match id {
                ChunkId::LAST => {
                    self.last = Some(entry);
                    break;
                }
                ChunkId::FRAME_NAME => {
                    set_once(&mut self.name, StringChunk::from_entry(game, entry)?, id)?
                }
                ChunkId::FRAME_HEADER => {
                    set_once(&mut self.header, FrameHeader::from_entry(game, entry)?, id)?
                }
                ChunkId::FRAME_PASSWORD => {
                    set_once(&mut self.password, StringChunk::from_entry(game, entry)?, id)?
                }
                ChunkId::FRAME_PALETTE => {
                    set_once(&mut self.palette, Palette::from_entry(game, entry)?, id)?
                }
                ChunkId::OBJECT_INSTANCES => set_once(
                    &mut self.object_instances,
                    ObjectInstances::from_entry(game, entry)?,
                    id,
                )?,
                ChunkId::FRAME_FADE_IN_FRAME => {
                    set_once(&mut self.fade_in_frame, entry.into(), id)?
                }
                ChunkId::FRAME_FADE_OUT_FRAME => {
                    set_once(&mut self.fade_out_frame, entry.into(), id)?
                }
                ChunkId::FRAME_FADE_IN => set_once(&mut self.fade_in, entry.into(), id)?,
                ChunkId::FRAME_FADE_OUT => set_once(&mut self.fade_out, entry.into(), id)?,
                ChunkId::FRAME_EVENTS => set_once(&mut self.events, entry.into(), id)?,
                ChunkId::FRAME_PLAY_HEADER => set_once(&mut self.play_header, entry.into(), id)?,
                ChunkId::FRAME_ADDITIONAL_ITEMS => {
                    set_once(&mut self.additional_items, entry.into(), id)?
                }
                ChunkId::FRAME_ADDITIONAL_ITEM_INSTANCES => {
                    set_once(&mut self.additional_item_instances, entry.into(), id)?
                }
                ChunkId::FRAME_LAYERS => set_once(&mut self.layers, entry.into(), id)?,
                ChunkId::FRAME_VIRTUAL_SIZE => set_once(
                    &mut self.virtual_size,
                    VirtualSize::from_entry(game, entry)?,
                    id,
                )?,
                ChunkId::DEMO_FILE_PATH => {
                    set_once(&mut self.demo_file_path, StringChunk::from_entry(game, entry)?, id)?
                }
                // context-sensitive: 0x223F is a random seed only here
                ChunkId::RANDOM_SEED => {
                    set_once(&mut self.random_seed, RandomSeed::from_entry(game, entry)?, id)?
                }
                ChunkId::FRAME_LAYER_EFFECT => set_once(&mut self.layer_effect, entry.into(), id)?,
                ChunkId::FRAME_MOVEMENT_TIME_BASE => {
                    set_once(&mut self.movement_time_base, entry.into(), id)?
                }
                ChunkId::FRAME_MOSAIC_IMAGE_TABLE => {
                    set_once(&mut self.mosaic_image_table, entry.into(), id)?
                }
                ChunkId::FRAME_EFFECTS => set_once(&mut self.effects, entry.into(), id)?,
                ChunkId::FRAME_IPHONE_OPTIONS => {
                    set_once(&mut self.iphone_options, entry.into(), id)?
                }
                _ => self.unknown_chunks.push(entry.into()),
            }
        }
        game.state.pop();
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.name.as_ref().map(|name| name.value.as_str()).unwrap_or("")
    }
}

/// The frame bank: `count` frame containers, then a LAST sentinel.
#[derive(Debug, Clone, Default)]
pub struct FrameBank {
    pub entry: Option<Entry>,
    pub items: Vec<Frame>,
    pub last: Option<Entry>,
}

impl FrameBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::FRAME_BANK);
        let count = super::image::item_count(game, &entry).context("reading frame bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let entry = Entry::read_chunk(strm, game.old_game)
                .with_context(|| format!("reading frame {i}"))?;
            if entry.id() != ChunkId::FRAME {
                return Err(DecodeError::InvalidChunk(entry.id().0))
                    .with_context(|| format!("expected frame chunk, got {}", entry.id()));
            }
            let mut frame = Frame::new(entry);
            let result = frame.read_into(game, strm);
            self.items.push(frame);
            result.with_context(|| format!("frame {i}"))?;
        }
        let end = Entry::read_chunk(strm, game.old_game).context("reading frame bank sentinel")?;
        if end.id() != ChunkId::LAST {
            return Err(DecodeError::InvalidChunk(end.id().0))
                .context("expected frame bank sentinel");
        }
        self.last = Some(end);
        game.state.pop();
        Ok(())
    }
}
