use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::QualitySetting;

#[derive(Parser, Debug)]
#[command(
    name = "shaderz",
    author,
    version,
    about = "Browse, check, preview, and install animated GLSL shaders"
)]
pub struct Cli {
    /// Additional catalog directory, searched before the default roots.
    #[arg(long = "catalog", value_name = "DIR", global = true)]
    pub catalog: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the shaders available in the catalog.
    List(ListArgs),
    /// Copy shaders into a project.
    Add(AddArgs),
    /// Translate and validate shaders without opening a window.
    Check(CheckArgs),
    /// Open a preview window for a shader.
    Preview(PreviewArgs),
    /// Print resolved directories and catalog roots.
    Where,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Print the catalog as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Shader names to install.
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// Project directory to install into (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Create the components directory without asking.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Shader names to check; every catalog entry when omitted.
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Shader name or path to a shader directory.
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Quality tier; overrides the config file.
    #[arg(long, value_enum, value_name = "TIER")]
    pub quality: Option<QualitySetting>,

    /// Pin shader time and ask shaders for calmer output.
    #[arg(long)]
    pub reduced_motion: bool,

    /// Window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}
