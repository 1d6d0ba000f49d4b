use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::Pattern;
use mmf_data_tools::{
    commands::{
        dump_binary::dump_binary_files, dump_images::dump_images, dump_music::dump_music,
        dump_sounds::dump_sounds, info::dump_info, load_game,
    },
    VERBOSE,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Dump game metadata and bank shape as JSON
    Info,
    /// Export images as PNG
    DumpImages {
        /// Path to the folder to output the extracted images
        output_folder: PathBuf,
        /// Glob patterns to filter the exported images, matched against <handle>.png
        #[clap(default_value = "*")]
        #[arg(num_args = 1..)]
        globs: Vec<Pattern>,
    },
    /// Export sounds in their embedded formats
    DumpSounds {
        output_folder: PathBuf,
        #[clap(default_value = "*")]
        #[arg(num_args = 1..)]
        globs: Vec<Pattern>,
    },
    /// Export music in their embedded formats
    DumpMusic {
        output_folder: PathBuf,
        #[clap(default_value = "*")]
        #[arg(num_args = 1..)]
        globs: Vec<Pattern>,
    },
    /// Export embedded binary files and pack files
    DumpBinaryFiles { output_folder: PathBuf },
}

/// A CLI tool that inspects and extracts assets from Multimedia Fusion
/// game executables.
#[derive(Parser, Debug)]
#[command(name = "mmf_data_tools")]
#[clap(version)]
struct Cli {
    /// Path to the game executable
    exe: PathBuf,

    /// Treat the game as a compatibility build
    #[arg(long, default_value_t = false)]
    force_compat: bool,

    /// Verbose printing of non-fatal error messages
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    VERBOSE.set(cli.verbose).unwrap();

    let game = load_game(&cli.exe, cli.force_compat).context("Failed to load game")?;

    match cli.command {
        Command::Info => dump_info(&game).context("Info command failed")?,
        Command::DumpImages {
            output_folder,
            globs,
        } => dump_images(&game, &globs, &output_folder).context("Dump Images command failed")?,
        Command::DumpSounds {
            output_folder,
            globs,
        } => dump_sounds(&game, &globs, &output_folder).context("Dump Sounds command failed")?,
        Command::DumpMusic {
            output_folder,
            globs,
        } => dump_music(&game, &globs, &output_folder).context("Dump Music command failed")?,
        Command::DumpBinaryFiles { output_folder } => {
            dump_binary_files(&game, &output_folder).context("Dump Binary Files command failed")?
        }
    }

    Ok(())
}
