//! Image bank: item metadata, lazy pixel decoding to RGBA, and the
//! application icon.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::entry::{BasicChunk, Entry};
use super::{ChunkId, Color};
use crate::codec::Decoder;
use crate::error::DecodeError;
use crate::game::Game;
use crate::stream::Stream;

/// Storage format of an image item's pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsMode {
    TwoBitIndexed,
    FourBitIndexed,
    EightBitIndexed,
    Rgb16,
    Rgb15,
    Rgb24,
    Rgba32,
    Jpeg,
}

impl GraphicsMode {
    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(GraphicsMode::TwoBitIndexed),
            2 => Ok(GraphicsMode::FourBitIndexed),
            3 => Ok(GraphicsMode::EightBitIndexed),
            4 => Ok(GraphicsMode::Rgb16),
            6 => Ok(GraphicsMode::Rgb15),
            7 => Ok(GraphicsMode::Rgb24),
            8 => Ok(GraphicsMode::Rgba32),
            9 => Ok(GraphicsMode::Jpeg),
            other => Err(DecodeError::Str(format!("unknown graphics mode {other}"))),
        }
    }

    fn indexed(self) -> bool {
        matches!(
            self,
            GraphicsMode::TwoBitIndexed
                | GraphicsMode::FourBitIndexed
                | GraphicsMode::EightBitIndexed
        )
    }

    /// Bytes per stored row before padding. None for JPEG.
    fn row_bytes(self, width: usize) -> Option<usize> {
        match self {
            GraphicsMode::TwoBitIndexed => Some(width.div_ceil(4)),
            GraphicsMode::FourBitIndexed => Some(width.div_ceil(2)),
            GraphicsMode::EightBitIndexed => Some(width),
            GraphicsMode::Rgb16 | GraphicsMode::Rgb15 => Some(width * 2),
            GraphicsMode::Rgb24 => Some(width * 3),
            GraphicsMode::Rgba32 => Some(width * 4),
            GraphicsMode::Jpeg => None,
        }
    }
}

/// Image item flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageFlags(pub u8);

impl ImageFlags {
    pub const RLE: u8 = 0x01;
    pub const RLEW: u8 = 0x02;
    pub const RLET: u8 = 0x04;
    pub const LZX: u8 = 0x08;
    pub const ALPHA: u8 = 0x10;
    pub const ACE: u8 = 0x20;
    pub const MAC: u8 = 0x40;

    pub fn rle(self) -> bool {
        self.0 & (Self::RLE | Self::RLEW | Self::RLET) != 0
    }

    pub fn alpha(self) -> bool {
        self.0 & Self::ALPHA != 0
    }
}

/// Stored rows are DWORD aligned in every row-based mode except 32-bit.
fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn padded_row_bytes(mode: GraphicsMode, width: usize) -> Option<usize> {
    mode.row_bytes(width).map(|row| match mode {
        GraphicsMode::Rgba32 => row,
        _ => align4(row),
    })
}

/// One image in the image bank. Metadata is read eagerly; the pixel
/// payload is decoded on demand.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub entry: Entry,
    pub checksum: u32,
    pub reference: u32,
    pub data_size: u32,
    pub width: u16,
    pub height: u16,
    pub graphics_mode: GraphicsMode,
    pub flags: ImageFlags,
    pub hotspot: (u16, u16),
    pub action: (u16, u16),
    pub transparent: Color,
    /// Offset of the pixel payload inside the decoded item bytes
    pub data_position: usize,
}

impl ImageItem {
    pub fn read(game: &Game, strm: &mut Stream) -> Result<Self> {
        let entry = Entry::read_item(strm, game.old_game, !game.old_game, 0, false)
            .context("reading image item entry")?;
        let handle = entry.handle();
        let decoded = entry
            .decode(&game.decoder)
            .with_context(|| format!("decoding image item {handle:#x}"))?;
        let mut strm = Stream::new(Bytes::from(decoded));

        let checksum = if game.old_game {
            strm.read_u16()? as u32
        } else {
            strm.read_u32()?
        };
        let reference = strm.read_u32()?;
        let data_size = strm.read_u32()?;
        let width = strm.read_u16()?;
        let height = strm.read_u16()?;
        let graphics_mode = GraphicsMode::from_u8(strm.read_u8()?)
            .with_context(|| format!("image item {handle:#x}"))?;
        let flags = ImageFlags(strm.read_u8()?);
        if !game.old_game {
            strm.skip(2)?;
        }
        let hotspot = (strm.read_u16()?, strm.read_u16()?);
        let action = (strm.read_u16()?, strm.read_u16()?);
        let transparent = if game.old_game {
            Color::default()
        } else {
            let r = strm.read_u8()?;
            let g = strm.read_u8()?;
            let b = strm.read_u8()?;
            strm.skip(1)?;
            Color::opaque(r, g, b)
        };

        Ok(ImageItem {
            data_position: strm.position(),
            entry,
            checksum,
            reference,
            data_size,
            width,
            height,
            graphics_mode,
            flags,
            hotspot,
            action,
            transparent,
        })
    }

    pub fn handle(&self) -> u32 {
        self.entry.handle()
    }

    /// Whether [`ImageItem::rgba`] needs the owning frame's palette.
    pub fn need_palette(&self) -> bool {
        self.graphics_mode.indexed()
    }

    /// The raw pixel payload (post item decode, pre pixel decode).
    pub fn image_data(&self, decoder: &Decoder) -> Result<Vec<u8>> {
        let decoded = self.entry.decode(decoder)?;
        if self.data_position > decoded.len() {
            return Err(DecodeError::out_of_data(decoded.len(), self.data_position).into());
        }
        Ok(decoded[self.data_position..].to_vec())
    }

    /// Decodes the pixel payload to an RGBA8 buffer of `width * height`
    /// pixels. `color_trans` maps the transparent color to alpha 0 when
    /// the image carries no alpha plane.
    pub fn rgba(
        &self,
        decoder: &Decoder,
        color_trans: bool,
        palette: Option<&[Color; 256]>,
    ) -> Result<Vec<u8>> {
        let handle = self.handle();
        let data = self
            .image_data(decoder)
            .with_context(|| format!("image item {handle:#x}"))?;
        let width = self.width as usize;
        let height = self.height as usize;

        if self.graphics_mode == GraphicsMode::Jpeg {
            let decoded = image::load_from_memory(&data)
                .map_err(|e| DecodeError::Str(format!("JPEG decode failed: {e}")))
                .with_context(|| format!("image item {handle:#x}"))?;
            return Ok(decoded.to_rgba8().into_raw());
        }

        if self.need_palette() && palette.is_none() {
            return Err(DecodeError::Str(format!(
                "image item {handle:#x} needs a palette"
            ))
            .into());
        }

        let padded = padded_row_bytes(self.graphics_mode, width).unwrap();
        let surface_size = padded * height;
        let rle_buf;
        let surface = if self.flags.rle() {
            rle_buf = rle_decode(&data, surface_size)
                .with_context(|| format!("image item {handle:#x} RLE payload"))?;
            &rle_buf[..]
        } else {
            if data.len() < surface_size {
                return Err(DecodeError::out_of_data(data.len(), surface_size))
                    .with_context(|| format!("image item {handle:#x} pixel payload"));
            }
            &data[..surface_size]
        };

        let mut out = vec![0u8; width * height * 4];
        for y in 0..height {
            let row = &surface[y * padded..y * padded + padded];
            for x in 0..width {
                let color = decode_pixel(self.graphics_mode, row, x, palette);
                let color = if color_trans && !self.flags.alpha() && same_rgb(color, self.transparent)
                {
                    Color { a: 0, ..color }
                } else {
                    color
                };
                let at = (y * width + x) * 4;
                out[at] = color.r;
                out[at + 1] = color.g;
                out[at + 2] = color.b;
                out[at + 3] = color.a;
            }
        }

        // the alpha plane is the tail of the payload, DWORD-aligned rows
        if self.flags.alpha() {
            let alpha_row = align4(width);
            let plane_size = alpha_row * height;
            if data.len() < plane_size {
                return Err(DecodeError::out_of_data(data.len(), plane_size))
                    .with_context(|| format!("image item {handle:#x} alpha plane"));
            }
            let plane = &data[data.len() - plane_size..];
            for y in 0..height {
                for x in 0..width {
                    out[(y * width + x) * 4 + 3] = plane[y * alpha_row + x];
                }
            }
        }

        Ok(out)
    }
}

fn same_rgb(a: Color, b: Color) -> bool {
    a.r == b.r && a.g == b.g && a.b == b.b
}

fn decode_pixel(
    mode: GraphicsMode,
    row: &[u8],
    x: usize,
    palette: Option<&[Color; 256]>,
) -> Color {
    match mode {
        GraphicsMode::TwoBitIndexed => {
            let index = (row[x / 4] >> (6 - (x % 4) * 2)) & 0x03;
            palette.unwrap()[index as usize]
        }
        GraphicsMode::FourBitIndexed => {
            let byte = row[x / 2];
            let index = if x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            palette.unwrap()[index as usize]
        }
        GraphicsMode::EightBitIndexed => palette.unwrap()[row[x] as usize],
        GraphicsMode::Rgb15 => {
            let v = u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]);
            Color::opaque(
                (((v >> 10) & 0x1F) as u8) << 3,
                (((v >> 5) & 0x1F) as u8) << 3,
                ((v & 0x1F) as u8) << 3,
            )
        }
        GraphicsMode::Rgb16 => {
            let v = u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]);
            Color::opaque(
                (((v >> 11) & 0x1F) as u8) << 3,
                (((v >> 5) & 0x3F) as u8) << 2,
                ((v & 0x1F) as u8) << 3,
            )
        }
        // stored BGR(A), Windows bitmap order
        GraphicsMode::Rgb24 => Color::opaque(row[x * 3 + 2], row[x * 3 + 1], row[x * 3]),
        GraphicsMode::Rgba32 => Color {
            r: row[x * 4 + 2],
            g: row[x * 4 + 1],
            b: row[x * 4],
            a: row[x * 4 + 3],
        },
        GraphicsMode::Jpeg => unreachable!("JPEG is decoded wholesale"),
    }
}

/// Run-length decode: `0` ends the stream, a count below 0x80 repeats the
/// next byte, `0x80 | n` copies `n` literal bytes.
fn rle_decode(src: &[u8], expected: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(expected);
    let mut at = 0;
    while out.len() < expected {
        let Some(&command) = src.get(at) else {
            return Err(DecodeError::out_of_data(0, expected - out.len()));
        };
        at += 1;
        if command == 0 {
            break;
        }
        if command < 0x80 {
            let Some(&value) = src.get(at) else {
                return Err(DecodeError::out_of_data(0, 1));
            };
            at += 1;
            out.extend(std::iter::repeat(value).take(command as usize));
        } else {
            let run = (command & 0x7F) as usize;
            if at + run > src.len() {
                return Err(DecodeError::out_of_data(src.len() - at, run));
            }
            out.extend_from_slice(&src[at..at + run]);
            at += run;
        }
    }
    if out.len() < expected {
        return Err(DecodeError::out_of_data(out.len(), expected));
    }
    out.truncate(expected);
    Ok(out)
}

/// The image bank: `count` items followed by the image-end sentinel.
#[derive(Debug, Clone, Default)]
pub struct ImageBank {
    pub entry: Option<Entry>,
    pub items: Vec<ImageItem>,
    pub end: Option<BasicChunk>,
}

impl ImageBank {
    pub fn read_into(&mut self, game: &mut Game, strm: &mut Stream, entry: Entry) -> Result<()> {
        game.state.push(ChunkId::IMAGE_BANK);
        let count = item_count(game, &entry).context("reading image bank count")?;
        self.entry = Some(entry);
        for i in 0..count {
            game.check_cancelled()?;
            let item = ImageItem::read(game, strm).with_context(|| format!("image item {i}"))?;
            self.items.push(item);
        }
        self.end = Some(read_bank_end(game, strm, ChunkId::IMAGE_END)?);
        game.state.pop();
        Ok(())
    }
}

/// Bank chunks carry their item count as a single u32 payload.
pub(crate) fn item_count(game: &Game, entry: &Entry) -> Result<u32> {
    let bytes = entry.decode(&game.decoder)?;
    let mut strm = Stream::new(Bytes::from(bytes));
    Ok(strm.read_u32()?)
}

/// Consumes a bank's trailing sentinel chunk.
pub(crate) fn read_bank_end(game: &Game, strm: &mut Stream, id: ChunkId) -> Result<BasicChunk> {
    let end = Entry::read_chunk(strm, game.old_game).context("reading bank sentinel")?;
    if end.id() != id {
        return Err(DecodeError::InvalidChunk(end.id().0))
            .with_context(|| format!("expected bank sentinel {id}"));
    }
    Ok(end.into())
}

/// The application icon: a BMP-style indexed bitmap with an AND mask.
#[derive(Debug, Clone)]
pub struct Icon {
    pub entry: Entry,
    pub width: u32,
    pub height: u32,
    /// RGBA8, `width * height` pixels
    pub pixels: Vec<u8>,
}

impl Icon {
    pub fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry.decode(&game.decoder).context("decoding icon chunk")?;
        let mut strm = Stream::new(Bytes::from(bytes));

        let header_size = strm.read_u32().context("icon header size")?;
        let width = strm.read_i32()? as u32;
        let mut height = strm.read_i32()? as u32;
        // icon resources store the XOR and AND planes as doubled height
        if height == width * 2 {
            height = width;
        }
        strm.skip(2).context("icon planes")?;
        let depth = strm.read_u16().context("icon depth")?;
        if depth != 8 {
            return Err(DecodeError::Str(format!("unsupported icon depth {depth}")).into());
        }
        strm.seek(header_size as usize).context("icon palette")?;

        let mut palette = [Color::default(); 256];
        for color in palette.iter_mut() {
            let b = strm.read_u8()?;
            let g = strm.read_u8()?;
            let r = strm.read_u8()?;
            strm.skip(1)?;
            *color = Color::opaque(r, g, b);
        }

        let (w, h) = (width as usize, height as usize);
        let row = align4(w);
        let indexes = strm.read_span(row * h).context("icon pixels")?;
        let mask_row = align4(w.div_ceil(8));
        let mask = strm.read_span(mask_row * h).context("icon mask")?;

        let mut pixels = vec![0u8; w * h * 4];
        for y in 0..h {
            // rows are stored bottom-up
            let src_y = h - 1 - y;
            for x in 0..w {
                let color = palette[indexes[src_y * row + x] as usize];
                let masked = mask[src_y * mask_row + x / 8] & (0x80 >> (x % 8)) != 0;
                let at = (y * w + x) * 4;
                pixels[at] = color.r;
                pixels[at + 1] = color.g;
                pixels[at + 2] = color.b;
                pixels[at + 3] = if masked { 0 } else { 255 };
            }
        }

        Ok(Icon {
            entry,
            width,
            height,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_runs_and_literals() {
        // 3x "a", then literal "bc", then end marker
        let src = [3, b'a', 0x82, b'b', b'c', 0];
        assert_eq!(rle_decode(&src, 5).unwrap(), b"aaabc");
        assert!(rle_decode(&src, 6).is_err());
    }

    #[test]
    fn row_padding_is_dword_aligned() {
        assert_eq!(padded_row_bytes(GraphicsMode::Rgb24, 2), Some(8));
        assert_eq!(padded_row_bytes(GraphicsMode::EightBitIndexed, 5), Some(8));
        assert_eq!(padded_row_bytes(GraphicsMode::Rgba32, 3), Some(12));
        assert_eq!(padded_row_bytes(GraphicsMode::Jpeg, 3), None);
    }

    #[test]
    fn icon_decodes_palette_and_mask() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&40u32.to_le_bytes()); // header size
        bytes.extend_from_slice(&2i32.to_le_bytes()); // width
        bytes.extend_from_slice(&4i32.to_le_bytes()); // doubled height
        bytes.extend_from_slice(&1u16.to_le_bytes()); // planes
        bytes.extend_from_slice(&8u16.to_le_bytes()); // depth
        bytes.resize(40, 0); // rest of the header
        let mut palette = [0u8; 256 * 4];
        palette[4..8].copy_from_slice(&[0, 0, 255, 0]); // index 1 = red, BGRA
        bytes.extend_from_slice(&palette);
        // two DWORD-padded rows, bottom-up: top-left pixel is index 1
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&[1, 0, 0, 0]);
        // AND mask: bottom-right pixel transparent
        bytes.extend_from_slice(&[0x40, 0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&0x2238u16.to_le_bytes());
        chunk.extend_from_slice(&0u16.to_le_bytes());
        chunk.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&bytes);

        let game = crate::game::Game::new(Bytes::new());
        let entry = Entry::read_chunk(&mut Stream::new(Bytes::from(chunk)), false).unwrap();
        let icon = Icon::from_entry(&game, entry).unwrap();
        assert_eq!((icon.width, icon.height), (2, 2));
        assert_eq!(&icon.pixels[0..4], &[255, 0, 0, 255]); // top-left red
        assert_eq!(icon.pixels[(2 + 1) * 4 + 3], 0); // bottom-right masked out
    }

    #[test]
    fn rgb15_and_rgb16_unpack() {
        let white = 0x7FFFu16.to_le_bytes();
        let color = decode_pixel(GraphicsMode::Rgb15, &white, 0, None);
        assert_eq!((color.r, color.g, color.b), (0xF8, 0xF8, 0xF8));

        let green = 0x07E0u16.to_le_bytes();
        let color = decode_pixel(GraphicsMode::Rgb16, &green, 0, None);
        assert_eq!((color.r, color.g, color.b), (0, 0xFC, 0));
    }
}
