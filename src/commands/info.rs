use std::io;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::exe::ProductCode;
use crate::game::Game;

#[derive(Serialize)]
struct PackFileInfo {
    name: String,
    bingo: u32,
    size: usize,
}

#[derive(Serialize)]
struct FrameInfo {
    name: String,
    width: Option<i32>,
    height: Option<i32>,
    object_instances: usize,
}

#[derive(Serialize)]
struct BankCounts {
    frames: usize,
    objects: usize,
    images: usize,
    sounds: usize,
    music: usize,
    fonts: usize,
}

#[derive(Serialize)]
struct GameInfo {
    title: Option<String>,
    author: Option<String>,
    copyright: Option<String>,
    project_path: Option<String>,
    output_path: Option<String>,
    runtime: Option<ProductCode>,
    runtime_subversion: Option<u16>,
    product_version: Option<u32>,
    product_build: Option<u32>,
    unicode: bool,
    old_game: bool,
    compat: bool,
    cnc: bool,
    recompiled: bool,
    banks: BankCounts,
    frames: Vec<FrameInfo>,
    pack_files: Vec<PackFileInfo>,
    unknown_chunks: usize,
}

fn string_of(chunk: &Option<crate::chunks::strings::StringChunk>) -> Option<String> {
    chunk.as_ref().map(|chunk| chunk.value.clone())
}

/// Dump the game's metadata and bank shape as JSON on stdout.
pub fn dump_info(game: &Game) -> Result<()> {
    let header = &game.header;
    let info = GameInfo {
        title: string_of(&header.title),
        author: string_of(&header.author),
        copyright: string_of(&header.copyright),
        project_path: string_of(&header.project_path),
        output_path: string_of(&header.output_path),
        runtime: game.product.as_ref().map(|p| p.runtime_version),
        runtime_subversion: game.product.as_ref().map(|p| p.runtime_subversion),
        product_version: game.product.as_ref().map(|p| p.product_version),
        product_build: game.product.as_ref().map(|p| p.product_build),
        unicode: game.unicode,
        old_game: game.old_game,
        compat: game.compat,
        cnc: game.cnc,
        recompiled: game.recompiled,
        banks: BankCounts {
            frames: header.frame_bank.as_ref().map_or(0, |b| b.items.len()),
            objects: header.object_bank.as_ref().map_or(0, |b| b.items.len()),
            images: header.image_bank.as_ref().map_or(0, |b| b.items.len()),
            sounds: header.sound_bank.as_ref().map_or(0, |b| b.items.len()),
            music: header.music_bank.as_ref().map_or(0, |b| b.items.len()),
            fonts: header.font_bank.as_ref().map_or(0, |b| b.items.len()),
        },
        frames: header
            .frame_bank
            .iter()
            .flat_map(|bank| bank.items.iter())
            .map(|frame| FrameInfo {
                name: frame.name().to_string(),
                width: frame.header.as_ref().map(|h| h.width),
                height: frame.header.as_ref().map(|h| h.height),
                object_instances: frame
                    .object_instances
                    .as_ref()
                    .map_or(0, |i| i.instances.len()),
            })
            .collect(),
        pack_files: game
            .pack_files
            .iter()
            .map(|file| PackFileInfo {
                name: file.name.clone(),
                bingo: file.bingo,
                size: file.data.len(),
            })
            .collect(),
        unknown_chunks: header.unknown_chunks.len()
            + header.unknown_strings.len()
            + header.unknown_compressed.len(),
    };

    serde_json::to_writer_pretty(io::stdout(), &info).context("Failed to serialise game info")?;
    println!();
    Ok(())
}
