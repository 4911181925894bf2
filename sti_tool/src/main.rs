mod commands;
mod filemanager;
mod portraits;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, LevelFilter};

use commands::GameFiles;
use filemanager::{load_config, ToolError};

/// Inspect and edit STCI sprite containers and SLF libraries
#[derive(Parser)]
#[command(name = "sti-tool")]
#[command(version)]
struct Cli {
    /// TOML file with codec settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More output; repeat for debug logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and frame table of an STI or TGA file
    Info { file: PathBuf },

    /// Write every frame of an STI (or a TGA image) as PNG
    Export { file: PathBuf, dir: PathBuf },

    /// Replace one frame with an image file and re-encode
    Import {
        file: PathBuf,
        frame: usize,
        image: PathBuf,
        /// Output path; defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Re-encode even if the container's payload was cut short
        #[arg(long)]
        allow_truncated: bool,
    },

    /// List the entries of an SLF library
    List { library: PathBuf },

    /// Copy one entry out of an SLF library
    Extract {
        library: PathBuf,
        name: String,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Add or replace an entry in an override library
    PatchSet {
        patch: PathBuf,
        name: String,
        file: PathBuf,
    },

    /// Remove an entry from an override library; an empty library is deleted
    PatchRemove { patch: PathBuf, name: String },

    /// Edit character portraits in a game installation
    Portraits {
        /// Game directory holding Data/DATA.SLF and Patches/PATCH.010
        #[arg(long, default_value = ".")]
        game_dir: PathBuf,

        #[command(subcommand)]
        action: PortraitAction,
    },
}

#[derive(Subcommand)]
enum PortraitAction {
    /// List portrait names; modified ones are marked with `*`
    List,

    /// Write a character's portraits as PNG
    Export { name: String, dir: PathBuf },

    /// Replace portraits with PNG or STI files, routed by resolution
    Set {
        name: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// First medium frame replaced by PNG files
        #[arg(long, default_value_t = 0)]
        frame: usize,
    },

    /// Drop the overrides of one character, or of all of them
    Restore {
        #[arg(required_unless_present = "all")]
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
}

fn run(cli: Cli) -> Result<(), ToolError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file } => print!("{}", commands::info(&file)?),
        Commands::Export { file, dir } => {
            for path in commands::export(&file, &dir)? {
                println!("{}", path.display());
            }
        }
        Commands::Import {
            file,
            frame,
            image,
            output,
            allow_truncated,
        } => {
            let output = output.unwrap_or_else(|| file.clone());
            commands::import(&file, frame, &image, &output, allow_truncated, &config)?;
            println!("Saved {}", output.display());
        }
        Commands::List { library } => print!("{}", commands::list(&library)?),
        Commands::Extract {
            library,
            name,
            output,
        } => commands::extract(&library, &name, &output)?,
        Commands::PatchSet { patch, name, file } => commands::patch_set(&patch, &name, &file)?,
        Commands::PatchRemove { patch, name } => {
            if !commands::patch_remove(&patch, &name)? {
                println!("No override for {}", name);
            }
        }
        Commands::Portraits { game_dir, action } => {
            let game = GameFiles::in_dir(&game_dir);
            match action {
                PortraitAction::List => print!("{}", commands::portrait_list(&game)?),
                PortraitAction::Export { name, dir } => {
                    for path in commands::portrait_export(&game, &name, &dir)? {
                        println!("{}", path.display());
                    }
                }
                PortraitAction::Set { name, files, frame } => {
                    for key in commands::portrait_set(&game, &name, &files, frame, &config)? {
                        println!("Saved {}", key);
                    }
                }
                PortraitAction::Restore { name, all: _ } => {
                    let removed = commands::portrait_restore(&game, name.as_deref())?;
                    println!("Removed {} overrides", removed);
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    lib_sti::init_logging(level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
