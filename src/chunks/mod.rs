//! Chunk-level building blocks: the id catalogue, encoding modes, and the
//! typed readers for every chunk group in the resource stream.

pub mod banks;
pub mod entry;
pub mod frame;
pub mod header;
pub mod image;
pub mod object;
pub mod strings;

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }
}

/// Runtime generation of the authoring tool. Affects integer widths,
/// string widths and a handful of chunk-id semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    Old,
    #[default]
    V284,
    V288,
}

/// Two-bit encoding selector carried by every chunk entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Stored as-is
    #[default]
    Plain,
    /// XOR stream cipher
    Encrypted,
    /// Standard DEFLATE
    Compressed,
    /// Cipher, then the header-skipping DEFLATE variant
    CompressedEncrypted,
}

impl Encoding {
    pub fn from_u16(mode: u16) -> Option<Self> {
        match mode {
            0 => Some(Encoding::Plain),
            1 => Some(Encoding::Encrypted),
            2 => Some(Encoding::Compressed),
            3 => Some(Encoding::CompressedEncrypted),
            _ => None,
        }
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Encoding::Encrypted | Encoding::CompressedEncrypted)
    }
}

/// A raw chunk id. Known ids are associated constants; anything else is
/// preserved as an unknown chunk, so this stays a transparent newtype
/// rather than a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChunkId(pub u16);

impl ChunkId {
    // header group
    pub const VITALISE_PREVIEW: ChunkId = ChunkId(0x2223);
    pub const HEADER: ChunkId = ChunkId(0x2224);
    pub const TITLE: ChunkId = ChunkId(0x2225);
    pub const AUTHOR: ChunkId = ChunkId(0x2226);
    pub const MENU: ChunkId = ChunkId(0x2227);
    pub const EXTENSION_PATH: ChunkId = ChunkId(0x2228);
    pub const EXTENSIONS: ChunkId = ChunkId(0x2229);
    pub const OBJECT_BANK: ChunkId = ChunkId(0x222A);
    pub const GLOBAL_EVENTS: ChunkId = ChunkId(0x222B);
    pub const FRAME_HANDLES: ChunkId = ChunkId(0x222C);
    pub const FRAME_BANK: ChunkId = ChunkId(0x222D);
    pub const IMAGE_BANK: ChunkId = ChunkId(0x222E);
    pub const SOUND_BANK: ChunkId = ChunkId(0x222F);
    pub const MUSIC_BANK: ChunkId = ChunkId(0x2230);
    pub const FONT_BANK: ChunkId = ChunkId(0x2231);
    pub const COPYRIGHT: ChunkId = ChunkId(0x2232);
    pub const GLOBAL_VALUE_NAMES: ChunkId = ChunkId(0x2233);
    pub const GLOBAL_VALUES: ChunkId = ChunkId(0x2234);
    pub const GLOBAL_STRING_NAMES: ChunkId = ChunkId(0x2235);
    pub const GLOBAL_STRINGS: ChunkId = ChunkId(0x2236);
    pub const EXTENSION_DATA: ChunkId = ChunkId(0x2237);
    pub const ICON: ChunkId = ChunkId(0x2238);
    pub const DEMO_VERSION: ChunkId = ChunkId(0x2239);
    pub const SECURITY_NUMBER: ChunkId = ChunkId(0x223A);
    pub const BINARY_FILES: ChunkId = ChunkId(0x223B);
    pub const MENU_IMAGES: ChunkId = ChunkId(0x223C);
    pub const ABOUT: ChunkId = ChunkId(0x223D);
    pub const PROJECT_PATH: ChunkId = ChunkId(0x223E);
    /// Random seed inside a frame item; unknown anywhere else.
    pub const RANDOM_SEED: ChunkId = ChunkId(0x223F);
    pub const MOVEMENT_EXTENSIONS: ChunkId = ChunkId(0x2240);
    pub const OBJECT_BANK2: ChunkId = ChunkId(0x2241);
    pub const OUTPUT_PATH: ChunkId = ChunkId(0x2242);
    pub const APP_DOC: ChunkId = ChunkId(0x2243);
    pub const OTHER_EXTENSION: ChunkId = ChunkId(0x2244);
    pub const EXTENSION_LIST: ChunkId = ChunkId(0x2245);
    pub const PROTECTION: ChunkId = ChunkId(0x2246);
    pub const SHADERS: ChunkId = ChunkId(0x2247);
    pub const EXTENDED_HEADER: ChunkId = ChunkId(0x2248);
    pub const SPACER: ChunkId = ChunkId(0x2249);
    pub const EXE_ONLY: ChunkId = ChunkId(0x224A);
    pub const TITLE2: ChunkId = ChunkId(0x224D);
    pub const CHUNK_224F: ChunkId = ChunkId(0x224F);
    // recompiled games
    pub const OBJECT_NAMES: ChunkId = ChunkId(0x2251);
    pub const OBJECT_PROPERTIES: ChunkId = ChunkId(0x2252);
    pub const TRUETYPE_FONTS_META: ChunkId = ChunkId(0x2253);
    pub const TRUETYPE_FONTS: ChunkId = ChunkId(0x2254);

    // frame group
    pub const FRAME: ChunkId = ChunkId(0x3333);
    pub const FRAME_NAME: ChunkId = ChunkId(0x3334);
    pub const FRAME_HEADER: ChunkId = ChunkId(0x3335);
    pub const FRAME_PASSWORD: ChunkId = ChunkId(0x3336);
    pub const FRAME_PALETTE: ChunkId = ChunkId(0x3337);
    pub const OBJECT_INSTANCES: ChunkId = ChunkId(0x3338);
    pub const FRAME_FADE_IN_FRAME: ChunkId = ChunkId(0x3339);
    pub const FRAME_FADE_OUT_FRAME: ChunkId = ChunkId(0x333A);
    pub const FRAME_FADE_IN: ChunkId = ChunkId(0x333B);
    pub const FRAME_FADE_OUT: ChunkId = ChunkId(0x333C);
    pub const FRAME_EVENTS: ChunkId = ChunkId(0x333D);
    pub const FRAME_PLAY_HEADER: ChunkId = ChunkId(0x333E);
    pub const FRAME_ADDITIONAL_ITEMS: ChunkId = ChunkId(0x333F);
    pub const FRAME_ADDITIONAL_ITEM_INSTANCES: ChunkId = ChunkId(0x3340);
    pub const FRAME_LAYERS: ChunkId = ChunkId(0x3341);
    pub const FRAME_VIRTUAL_SIZE: ChunkId = ChunkId(0x3342);
    pub const DEMO_FILE_PATH: ChunkId = ChunkId(0x3343);
    pub const FRAME_LAYER_EFFECT: ChunkId = ChunkId(0x3344);
    pub const FRAME_MOVEMENT_TIME_BASE: ChunkId = ChunkId(0x3346);
    pub const FRAME_MOSAIC_IMAGE_TABLE: ChunkId = ChunkId(0x3347);
    pub const FRAME_EFFECTS: ChunkId = ChunkId(0x3348);
    pub const FRAME_IPHONE_OPTIONS: ChunkId = ChunkId(0x334C);

    // object group
    pub const OBJECT_HEADER: ChunkId = ChunkId(0x4444);
    pub const OBJECT_NAME: ChunkId = ChunkId(0x4446);
    pub const OBJECT_PROPERTIES_ITEM: ChunkId = ChunkId(0x4447);
    pub const OBJECT_EFFECT: ChunkId = ChunkId(0x4448);

    // bank item / sentinel ids
    pub const IMAGE_ITEM: ChunkId = ChunkId(0x6666);
    pub const IMAGE_END: ChunkId = ChunkId(0x6667);
    pub const SOUND_ITEM: ChunkId = ChunkId(0x6A00);
    pub const SOUND_END: ChunkId = ChunkId(0x6A01);
    pub const MUSIC_ITEM: ChunkId = ChunkId(0x6B00);
    pub const MUSIC_END: ChunkId = ChunkId(0x6B01);
    pub const FONT_ITEM: ChunkId = ChunkId(0x6C00);
    pub const FONT_END: ChunkId = ChunkId(0x6C01);

    /// Terminator for the root stream and every LAST-terminated container.
    pub const LAST: ChunkId = ChunkId(0x7F7F);

    /// Human-readable name for diagnostics and the `info` dump.
    pub fn name(self) -> &'static str {
        match self {
            ChunkId::VITALISE_PREVIEW => "vitalise preview",
            ChunkId::HEADER => "header",
            ChunkId::TITLE => "title",
            ChunkId::AUTHOR => "author",
            ChunkId::MENU => "menu",
            ChunkId::EXTENSION_PATH => "extension path",
            ChunkId::EXTENSIONS => "extensions",
            ChunkId::OBJECT_BANK => "object bank",
            ChunkId::GLOBAL_EVENTS => "global events",
            ChunkId::FRAME_HANDLES => "frame handles",
            ChunkId::FRAME_BANK => "frame bank",
            ChunkId::IMAGE_BANK => "image bank",
            ChunkId::SOUND_BANK => "sound bank",
            ChunkId::MUSIC_BANK => "music bank",
            ChunkId::FONT_BANK => "font bank",
            ChunkId::COPYRIGHT => "copyright",
            ChunkId::GLOBAL_VALUE_NAMES => "global value names",
            ChunkId::GLOBAL_VALUES => "global values",
            ChunkId::GLOBAL_STRING_NAMES => "global string names",
            ChunkId::GLOBAL_STRINGS => "global strings",
            ChunkId::EXTENSION_DATA => "extension data",
            ChunkId::ICON => "icon",
            ChunkId::DEMO_VERSION => "demo version",
            ChunkId::SECURITY_NUMBER => "security number",
            ChunkId::BINARY_FILES => "binary files",
            ChunkId::MENU_IMAGES => "menu images",
            ChunkId::ABOUT => "about",
            ChunkId::PROJECT_PATH => "project path",
            ChunkId::RANDOM_SEED => "random seed",
            ChunkId::MOVEMENT_EXTENSIONS => "movement extensions",
            ChunkId::OBJECT_BANK2 => "object bank 2",
            ChunkId::OUTPUT_PATH => "output path",
            ChunkId::APP_DOC => "application doc",
            ChunkId::OTHER_EXTENSION => "other extension",
            ChunkId::EXTENSION_LIST => "extension list",
            ChunkId::PROTECTION => "protection",
            ChunkId::SHADERS => "shaders",
            ChunkId::EXTENDED_HEADER => "extended header",
            ChunkId::SPACER => "spacer",
            ChunkId::EXE_ONLY => "exe only",
            ChunkId::TITLE2 => "title 2",
            ChunkId::CHUNK_224F => "chunk 224F",
            ChunkId::OBJECT_NAMES => "object names",
            ChunkId::OBJECT_PROPERTIES => "object properties",
            ChunkId::TRUETYPE_FONTS_META => "truetype fonts meta",
            ChunkId::TRUETYPE_FONTS => "truetype fonts",
            ChunkId::FRAME => "frame",
            ChunkId::FRAME_NAME => "frame name",
            ChunkId::FRAME_HEADER => "frame header",
            ChunkId::FRAME_PASSWORD => "frame password",
            ChunkId::FRAME_PALETTE => "frame palette",
            ChunkId::OBJECT_INSTANCES => "object instances",
            ChunkId::FRAME_FADE_IN_FRAME => "fade in frame",
            ChunkId::FRAME_FADE_OUT_FRAME => "fade out frame",
            ChunkId::FRAME_FADE_IN => "fade in",
            ChunkId::FRAME_FADE_OUT => "fade out",
            ChunkId::FRAME_EVENTS => "frame events",
            ChunkId::FRAME_PLAY_HEADER => "frame play header",
            ChunkId::FRAME_ADDITIONAL_ITEMS => "additional items",
            ChunkId::FRAME_ADDITIONAL_ITEM_INSTANCES => "additional item instances",
            ChunkId::FRAME_LAYERS => "frame layers",
            ChunkId::FRAME_VIRTUAL_SIZE => "frame virtual size",
            ChunkId::DEMO_FILE_PATH => "demo file path",
            ChunkId::FRAME_LAYER_EFFECT => "frame layer effect",
            ChunkId::FRAME_MOVEMENT_TIME_BASE => "movement time base",
            ChunkId::FRAME_MOSAIC_IMAGE_TABLE => "mosaic image table",
            ChunkId::FRAME_EFFECTS => "frame effects",
            ChunkId::FRAME_IPHONE_OPTIONS => "iphone options",
            ChunkId::OBJECT_HEADER => "object header",
            ChunkId::OBJECT_NAME => "object name",
            ChunkId::OBJECT_PROPERTIES_ITEM => "object properties item",
            ChunkId::OBJECT_EFFECT => "object effect",
            ChunkId::IMAGE_ITEM => "image item",
            ChunkId::IMAGE_END => "image end",
            ChunkId::SOUND_ITEM => "sound item",
            ChunkId::SOUND_END => "sound end",
            ChunkId::MUSIC_ITEM => "music item",
            ChunkId::MUSIC_END => "music end",
            ChunkId::FONT_ITEM => "font item",
            ChunkId::FONT_END => "font end",
            ChunkId::LAST => "last",
            _ => "unknown",
        }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x} ({})", self.0, self.name())
    }
}

/// Whether an encrypted chunk's plaintext starts with a 4-byte decoded-size
/// prefix that the dispatch strips. Covers the identifiable metadata and
/// string chunks; `TITLE2` only gained the prefix in the 2.88 runtime.
pub fn strips_size_prefix(id: ChunkId, dialect: Dialect) -> bool {
    match id {
        ChunkId::TITLE
        | ChunkId::AUTHOR
        | ChunkId::COPYRIGHT
        | ChunkId::EXTENSION_PATH
        | ChunkId::ABOUT
        | ChunkId::PROJECT_PATH
        | ChunkId::OUTPUT_PATH
        | ChunkId::DEMO_FILE_PATH
        | ChunkId::GLOBAL_VALUE_NAMES
        | ChunkId::GLOBAL_STRING_NAMES
        | ChunkId::FRAME_NAME
        | ChunkId::FRAME_PASSWORD
        | ChunkId::OBJECT_NAME
        | ChunkId::OBJECT_NAMES => true,
        ChunkId::TITLE2 => dialect == Dialect::V288,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_rejects_out_of_range_modes() {
        assert_eq!(Encoding::from_u16(2), Some(Encoding::Compressed));
        assert_eq!(Encoding::from_u16(4), None);
    }

    #[test]
    fn title2_prefix_is_dialect_dependent() {
        assert!(!strips_size_prefix(ChunkId::TITLE2, Dialect::V284));
        assert!(strips_size_prefix(ChunkId::TITLE2, Dialect::V288));
        assert!(strips_size_prefix(ChunkId::TITLE, Dialect::Old));
        assert!(!strips_size_prefix(ChunkId::HEADER, Dialect::V288));
    }
}
