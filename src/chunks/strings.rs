//! String chunks: single values and NUL-separated lists.

use anyhow::{Context, Result};

use super::entry::{BasicChunk, Entry};
use crate::game::Game;
use crate::stream::Stream;

/// Decoded plaintext interpreted in the game's string width, trailing NUL
/// trimmed.
pub fn decode_string(bytes: &[u8], unicode: bool) -> String {
    if unicode {
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect::<Vec<_>>();
        String::from_utf16_lossy(&units)
    } else {
        bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }
}

/// A chunk whose whole payload is one string (title, author, paths, ...).
#[derive(Debug, Clone)]
pub struct StringChunk {
    pub entry: Entry,
    pub value: String,
}

impl StringChunk {
    pub fn read(game: &Game, strm: &mut Stream) -> Result<Self> {
        let entry = Entry::read_chunk(strm, game.old_game)?;
        Self::from_entry(game, entry)
    }

    pub fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .with_context(|| format!("decoding string chunk {}", entry.id()))?;
        Ok(StringChunk {
            value: decode_string(&bytes, game.unicode),
            entry,
        })
    }
}

/// A chunk holding a NUL-separated list of strings.
#[derive(Debug, Clone)]
pub struct StringsChunk {
    pub entry: Entry,
    pub values: Vec<String>,
}

impl StringsChunk {
    pub fn from_entry(game: &Game, entry: Entry) -> Result<Self> {
        let bytes = entry
            .decode(&game.decoder)
            .with_context(|| format!("decoding strings chunk {}", entry.id()))?;
        Ok(StringsChunk {
            values: split_strings(&bytes, game.unicode),
            entry,
        })
    }

    /// On-demand string view of a raw-retained chunk (the unknown-chunk
    /// sibling lists keep bytes undecoded until someone asks).
    pub fn decode(game: &Game, chunk: &BasicChunk) -> Result<Vec<String>> {
        let bytes = chunk
            .decoded(&game.decoder)
            .with_context(|| format!("decoding raw chunk {}", chunk.entry.id()))?;
        Ok(split_strings(&bytes, game.unicode))
    }
}

fn split_strings(bytes: &[u8], unicode: bool) -> Vec<String> {
    let mut values = Vec::new();
    if unicode {
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        for part in units.split(|&unit| unit == 0) {
            if !part.is_empty() {
                values.push(String::from_utf16_lossy(part));
            }
        }
    } else {
        for part in bytes.split(|&b| b == 0) {
            if !part.is_empty() {
                values.push(part.iter().map(|&b| b as char).collect());
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_string_trims_trailing_nul() {
        assert_eq!(decode_string(b"Hello\0\0", false), "Hello");
        assert_eq!(decode_string(b"Hello", false), "Hello");
    }

    #[test]
    fn wide_string_reads_utf16le() {
        let bytes = [b'H', 0, b'i', 0, 0, 0];
        assert_eq!(decode_string(&bytes, true), "Hi");
    }

    #[test]
    fn string_lists_split_on_nul() {
        assert_eq!(split_strings(b"one\0two\0\0", false), vec!["one", "two"]);
        let wide = [b'a', 0, 0, 0, b'b', 0, 0, 0];
        assert_eq!(split_strings(&wide, true), vec!["a", "b"]);
    }
}
