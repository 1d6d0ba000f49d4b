//! High level commands for working with decoded games

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::game::{DecodeOptions, Game};

pub mod dump_binary;
pub mod dump_images;
pub mod dump_music;
pub mod dump_sounds;
pub mod info;

/// Slurps a game executable and runs the decode pass.
pub fn load_game(path: &Path, force_compat: bool) -> Result<Game> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read game executable {path:?}"))?;
    let mut game = Game::new(Bytes::from(bytes));
    game.decode(&DecodeOptions {
        force_compat,
        cancel: None,
    })
    .with_context(|| format!("Failed to decode {path:?}"))?;
    Ok(game)
}

/// Makes an embedded name safe to use as a file name.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
