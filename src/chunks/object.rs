//! Object bank: object items, their discriminated payloads and the
//! animation tree inside common objects.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::entry::{BasicChunk, Entry};
use super::strings::StringChunk;
use super::{ChunkId, Color};
use crate::error::DecodeError;
use crate::game::Game;
use crate::stream::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    QuickBackdrop,
    Backdrop,
    Active,
    Text,
    Question,
    Score,
    Lives,
    Counter,
    Rtf,
    SubApplication,
    Unknown(u16),
}

impl ObjectType {
    fn from_u16(value: u16) -> Self {
        match value {
            0 => ObjectType::QuickBackdrop,
            1 => ObjectType::Backdrop,
            2 => ObjectType::Active,
            3 => ObjectType::Text,
            4 => ObjectType::Question,
            5 => ObjectType::Score,
            6 => ObjectType::Lives,
            7 => ObjectType::Counter,
            8 => ObjectType::Rtf,
            9 => ObjectType::SubApplication,
            other => ObjectType::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::QuickBackdrop => "quick backdrop",
            ObjectType::Backdrop => "backdrop",
            ObjectType::Active => "active",
            ObjectType::Text => "text",
            ObjectType::Question => "question",
            ObjectType::Score => "score",
            ObjectType::Lives => "lives",
            ObjectType::Counter => "counter",
            ObjectType::Rtf => "rtf",
            ObjectType::SubApplication => "sub application",
            ObjectType::Unknown(_) => "unknown",
        }
    }
}

fn read_color(strm: &mut Stream) -> Result<Color, DecodeError> {
    let r = strm.read_u8()?;
    let g = strm.read_u8()?;
    let b = strm.read_u8()?;
    strm.skip(1)?;
    Ok(Color::opaque(r, g, b))
}

/// Vector shape used by quick backdrops.
#[derive(Debug, Clone)]
pub struct Shape {
    pub fill: u16,
    pub shape: u16,
    pub line: u16,
    pub gradient: u16,
    pub border_size: u16,
    pub border_color: Color,
    pub color1: Color,
    pub color2: Color,
    pub image_handle: u16,
}

impl Shape {
    fn read(strm: &mut Stream) -> Result<Self, DecodeError> {
        Ok(Shape {
            fill: strm.read_u16()?,
            shape: strm.read_u16()?,
            line: strm.read_u16()?,
            gradient: strm.read_u16()?,
            border_size: strm.read_u16()?,
            border_color: read_color(strm)?,
            color1: read_color(strm)?,
            color2: read_color(strm)?,
            image_handle: strm.read_u16()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QuickBackdrop {
    pub size: u32,
    pub obstacle: u16,
    pub collision: u16,
    pub width: u32,
    pub height: u32,
    pub shape: Shape,
}

#[derive(Debug, Clone)]
pub struct Backdrop {
    pub size: u32,
    pub obstacle: u16,
    pub collision: u16,
    pub width: u32,
    pub height: u32,
    pub image_handle: u16,
}

#[derive(Debug, Clone)]
pub struct AnimationDirection {
    pub min_speed: u8,
    pub max_speed: u8,
    pub repeat: u16,
    pub back_to: u16,
    pub handles: Vec<u16>,
}

impl AnimationDirection {
    fn read(strm: &mut Stream) -> Result<Self, DecodeError> {
        let min_speed = strm.read_u8()?;
        let max_speed = strm.read_u8()?;
        let repeat = strm.read_u16()?;
        let back_to = strm.read_u16()?;
        let count = strm.read_u16()?;
        let mut handles = Vec::with_capacity(count as usize);
        for _ in 0..count {
            handles.push(strm.read_u16()?);
        }
        Ok(AnimationDirection {
            min_speed,
            max_speed,
            repeat,
            back_to,
            handles,
        })
    }
}

pub const DIRECTION_COUNT: usize = 32;

/// One animation: up to 32 directions, addressed by offset table.
#[derive(Debug, Clone)]
pub struct Animation {
    pub directions: Vec<Option<AnimationDirection>>,
}

impl Animation {
    fn read(strm: &mut Stream) -> Result<Self, DecodeError> {
        let base = strm.position();
        let mut offsets = [0u16; DIRECTION_COUNT];
        for offset in offsets.iter_mut() {
            *offset = strm.read_u16()?;
        }
        let mut directions = Vec::with_capacity(DIRECTION_COUNT);
        for &offset in offsets.iter() {
            if offset == 0 {
                directions.push(None);
                continue;
            }
            strm.seek(base + offset as usize)?;
            directions.push(Some(AnimationDirection::read(strm)?));
        }
        Ok(Animation { directions })
    }
}

/// Offset-addressed animation table at the head of a common object's
/// animation block.
#[derive(Debug, Clone)]
pub struct AnimationHeader {
    pub animations: Vec<Option<Animation>>,
}

impl AnimationHeader {
    fn read(strm: &mut Stream) -> Result<Self, DecodeError> {
        let base = strm.position();
        let count = strm.read_u16()?;
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(strm.read_u16()?);
        }
        let mut animations = Vec::with_capacity(count as usize);
        for &offset in offsets.iter() {
            if offset == 0 {
                animations.push(None);
                continue;
            }
            strm.seek(base + offset as usize)?;
            animations.push(Some(Animation::read(strm)?));
        }
        Ok(AnimationHeader { animations })
    }
}

/// Payload shared by every non-backdrop object type.
#[derive(Debug, Clone)]
pub struct ObjectCommon {
    pub size: u32,
    pub animations: Option<AnimationHeader>,
    /// Raw offset-addressed blocks, kept for export
    pub movements: Option<Bytes>,
    pub values: Option<Bytes>,
    pub strings: Option<Bytes>,
    pub extensions: Option<Bytes>,
    pub version: u16,
    pub flags: u32,
    pub new_flags: u32,
    pub preferences: u32,
    pub identifier: u32,
    pub back_color: Color,
}

impl ObjectCommon {
    fn read(buffer: &Bytes) -> Result<Self> {
        let mut strm = Stream::new(buffer.clone());
        let size = strm.read_u32().context("common block size")?;
        let movements_offset = strm.read_u16()?;
        let animations_offset = strm.read_u16()?;
        let _counter_offset = strm.read_u16()?;
        let _system_offset = strm.read_u16()?;
        let _fade_in_offset = strm.read_u32()?;
        let _fade_out_offset = strm.read_u32()?;
        let values_offset = strm.read_u16()?;
        let strings_offset = strm.read_u16()?;
        let extension_offset = strm.read_u16()?;
        let version = strm.read_u16()?;
        let flags = strm.read_u32()?;
        let new_flags = strm.read_u32()?;
        let preferences = strm.read_u32()?;
        let identifier = strm.read_u32()?;
        let back_color = read_color(&mut strm)?;

        let animations = if animations_offset != 0 {
            strm.seek(animations_offset as usize)
                .context("seeking animation block")?;
            Some(AnimationHeader::read(&mut strm).context("reading animation block")?)
        } else {
            None
        };

        let window = |offset: u16| -> Option<Bytes> {
            let offset = offset as usize;
            (offset != 0 && offset < buffer.len()).then(|| buffer.slice(offset..))
        };

        Ok(ObjectCommon {
            size,
            animations,
            movements: window(movements_offset),
            values: window(values_offset),
            strings: window(strings_offset),
            extensions: window(extension_offset),
            version,
            flags,
            new_flags,
            preferences,
            identifier,
            back_color,
        })
    }
}

/// Discriminated payload of an object item, chosen by its type.
#[derive(Debug, Clone)]
pub enum ObjectPayload {
    QuickBackdrop(QuickBackdrop),
    Backdrop(Backdrop),
    Common(ObjectCommon),
}

impl ObjectPayload {
    fn from_entry(game: &Game, object_type: ObjectType, entry: &Entry) -> Result<Self> {
        let bytes = Bytes::from(
            entry
                .decode(&game.decoder)
                .context("decoding object properties")?,
        );
        let mut strm = Stream::new(bytes.clone());
        match object_type {
            ObjectType::QuickBackdrop => {
                let payload = (|| -> Result<QuickBackdrop, DecodeError> {
                    Ok(QuickBackdrop {
                        size: strm.read_u32()?,
                        obstacle: strm.read_u16()?,
                        collision: strm.read_u16()?,
                        width: strm.read_u32()?,
                        height: strm.read_u32()?,
                        shape: Shape::read(&mut strm)?,
                    })
                })()
                .context("reading quick backdrop")?;
                Ok(ObjectPayload::QuickBackdrop(payload))
            }
            ObjectType::Backdrop => {
                let payload = (|| -> Result<Backdrop, DecodeError> {
                    Ok(Backdrop {
                        size: strm.read_u32()?,
                        obstacle: strm.read_u16()?,
                        collision: strm.read_u16()?,
                        width: strm.read_u32()?,
                        height: strm.read_u32()?,
                        image_handle: strm.read_u16()?,
                    })
                })()
                .context("reading backdrop")?;
                Ok(ObjectPayload::Backdrop(payload))
            }
            _ => Ok(ObjectPayload::Common(
                ObjectCommon::read(&bytes).context("reading common object data")?,
            )),
        }
    }

    /// Image handles this payload references, for cross-linking exports.
    pub fn image_handles(&self) -> Vec<u16> {
        match self {
            ObjectPayload::QuickBackdrop(qb) => vec![qb.shape.image_handle],
            ObjectPayload::Backdrop(bd) => vec![bd.image_handle],
            ObjectPayload::Common(common) => common
                .animations
                .iter()
                .flat_map(|header| header.animations.iter().flatten())
                .flat_map(|animation| animation.directions.iter().flatten())
                .flat_map(|direction| direction.handles.iter().copied())
                .collect(),
        }
    }
}

/// One object in the object bank: a LAST-terminated container.
#[derive(Debug, Clone)]
pub struct ObjectItem {
    pub entry: Entry,
    pub handle: u16,
    pub object_type: ObjectType,
    pub ink_effect: u32,
    pub ink_effect_param: u32,
    pub name: Option<StringChunk>,
    pub effect: Option<BasicChunk>,
    pub payload: Option<ObjectPayload>,
    pub unknown_chunks: Vec<BasicChunk>,
    pub last: Option<Entry>,
}

impl ObjectItem {
    fn new(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .context("decoding object header")?;
        let mut strm = Stream::new(Bytes::from(bytes));
        let handle = strm.read_u16().context("object handle")?;
        let object_type = ObjectType::from_u16(strm.read_u16().context("object type")?);
        let ink_effect = strm.read_u32().context("object ink effect")?;
        let ink_effect_param = strm.read_u32().context("object ink effect param")?;
        Ok(ObjectItem {
            entry,
            handle,
            object_type,
            ink_effect,
            ink_effect_param,
            name: None,
            effect: None,
            payload: None,
            unknown_chunks: Vec::new(),
            last: None,
        })
    }

    fn read_into(&mut self, game: &mut Game, strm: &mut Stream) -> Result<()> {
        game.state.push(ChunkId::OBJECT_HEADER);
        loop {
            game.check_cancelled()?;
            let entry = Entry::read_chunk(strm, game.old_game).context("reading object child")?;
            match entry.id() {
                ChunkId::LAST => {
                    self.last = Some(entry);
                    break;
                }
                ChunkId::OBJECT_NAME => {
                    self.name = Some(StringChunk::from_entry(game, entry)?);
                }
                ChunkId::OBJECT_PROPERTIES_ITEM => {
                    self.payload = Some(ObjectPayload::from_entry(game, self.object_type, &entry)?);
                }
                ChunkId::OBJECT_EFFECT => self.effect = Some(entry.into()),
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

/// The object bank: `count` object containers, then a LAST sentinel.
#[derive(Debug, Clone, Default)]
pub struct ObjectBank {
    pub entry: Option<Entry>,
    pub items: Vec<ObjectItem>,
    pub last: Option<Entry>,
}

impl ObjectBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::OBJECT_BANK);
        let count = super::image::item_count(game, &entry).context("reading object bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let entry = Entry::read_chunk(strm, game.old_game)
                .with_context(|| format!("reading object {i}"))?;
            if entry.id() != ChunkId::OBJECT_HEADER {
                return Err(DecodeError::InvalidChunk(entry.id().0))
                    .with_context(|| format!("expected object header, got {}", entry.id()));
            }
            let mut item = ObjectItem::new(game, entry).with_context(|| format!("object {i}"))?;
            let result = item.read_into(game, strm);
            self.items.push(item);
            result.with_context(|| format!("object {i}"))?;
        }
        let end = Entry::read_chunk(strm, game.old_game).context("reading object bank sentinel")?;
        if end.id() != ChunkId::LAST {
            return Err(DecodeError::InvalidChunk(end.id().0))
                .context("expected object bank sentinel");
        }
        self.last = Some(end);
        game.state.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_tree_reads_offset_tables() {
        // one animation, one populated direction with two frame handles
        let mut animation = Vec::new();
        let mut offsets = [0u16; DIRECTION_COUNT];
        offsets[0] = (DIRECTION_COUNT * 2) as u16;
        for offset in offsets {
            animation.extend_from_slice(&offset.to_le_bytes());
        }
        animation.extend_from_slice(&[1, 2]); // min/max speed
        animation.extend_from_slice(&3u16.to_le_bytes()); // repeat
        animation.extend_from_slice(&0u16.to_le_bytes()); // back to
        animation.extend_from_slice(&2u16.to_le_bytes()); // handle count
        animation.extend_from_slice(&7u16.to_le_bytes());
        animation.extend_from_slice(&9u16.to_le_bytes());

        let mut block = Vec::new();
        block.extend_from_slice(&1u16.to_le_bytes()); // animation count
        block.extend_from_slice(&4u16.to_le_bytes()); // offset of animation 0
        block.extend(animation);

        let mut strm = Stream::new(Bytes::from(block));
        let header = AnimationHeader::read(&mut strm).unwrap();
        assert_eq!(header.animations.len(), 1);
        let animation = header.animations[0].as_ref().unwrap();
        let direction = animation.directions[0].as_ref().unwrap();
        assert_eq!(direction.handles, vec![7, 9]);
        assert!(animation.directions[1].is_none());
    }

    #[test]
    fn object_type_discriminates_payload_family() {
        assert_eq!(ObjectType::from_u16(0), ObjectType::QuickBackdrop);
        assert_eq!(ObjectType::from_u16(2), ObjectType::Active);
        assert_eq!(ObjectType::from_u16(42), ObjectType::Unknown(42));
    }

    #[test]
    fn backdrop_payload_reports_its_image_handle() {
        let payload = ObjectPayload::Backdrop(Backdrop {
            size: 0,
            obstacle: 0,
            collision: 0,
            width: 32,
            height: 32,
            image_handle: 11,
        });
        assert_eq!(payload.image_handles(), vec![11]);
    }
}
