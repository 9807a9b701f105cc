use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use catalog::{Catalog, ShaderPack};
use renderer::{check_program, run_preview, validate_descriptors, PreviewConfig, RuntimeOptions};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::bindings::{descriptors, preview_shader, shader_source};
use crate::cli::{AddArgs, CheckArgs, Cli, Command, ListArgs, PreviewArgs};
use crate::config::AppConfig;
use crate::install::{install, InstallOptions, InstallReport};
use crate::paths::AppPaths;

const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    let config = AppConfig::load_or_default(&paths.config_file())?;
    let mut extra_roots = cli.catalog.clone();
    extra_roots.extend(config.catalog_roots.iter().cloned());
    let catalog = Catalog::new(paths.catalog_roots(&extra_roots));
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        share = %paths.share_dir().display(),
        roots = catalog.roots().len(),
        "resolved shaderz paths"
    );

    match cli.command {
        Command::List(args) => list(&catalog, &args),
        Command::Add(args) => add(&catalog, &args),
        Command::Check(args) => check(&catalog, &args),
        Command::Preview(args) => preview(&catalog, &config, &args),
        Command::Where => show_paths(&paths, &catalog),
    }
}

fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // stderr keeps `list --json` parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, Serialize)]
struct ListedShader<'a> {
    name: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    tags: &'a [String],
    path: &'a Path,
    asset: Option<PathBuf>,
}

impl<'a> ListedShader<'a> {
    fn from_pack(pack: &'a ShaderPack) -> Self {
        let manifest = pack.manifest();
        Self {
            name: pack.name(),
            title: manifest.display_title(),
            description: manifest.description.as_deref(),
            tags: &manifest.tags,
            path: pack.root(),
            asset: manifest.asset.as_ref().map(|asset| asset.path.clone()),
        }
    }
}

fn list(catalog: &Catalog, args: &ListArgs) -> Result<()> {
    let packs = catalog.list().context("failed to read the shader catalog")?;
    let listed: Vec<ListedShader<'_>> = packs.iter().map(ListedShader::from_pack).collect();

    if args.json {
        let json = serde_json::to_string_pretty(&listed).context("failed to encode catalog")?;
        println!("{json}");
        return Ok(());
    }

    if listed.is_empty() {
        println!("No shaders found. Searched:");
        for root in catalog.roots() {
            println!("  {}", root.display());
        }
        return Ok(());
    }
    let width = listed.iter().map(|shader| shader.name.len()).max().unwrap_or(0);
    for shader in &listed {
        let mut line = format!("{:<width$}  {}", shader.name, shader.title);
        if shader.asset.is_some() {
            line.push_str(" [video]");
        }
        println!("{line}");
        if let Some(description) = shader.description {
            println!("{:<width$}  {description}", "");
        }
    }
    Ok(())
}

fn add(catalog: &Catalog, args: &AddArgs) -> Result<()> {
    if args.names.is_empty() {
        println!("No shaders selected. Exiting.");
        return Ok(());
    }

    let project = match &args.dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("failed to read the current directory")?,
    };
    if !project.is_dir() {
        bail!("project directory {} does not exist", project.display());
    }

    let packs = args
        .names
        .iter()
        .map(|name| catalog.resolve(name))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(project = %project.display(), shaders = packs.len(), "installing shaders");

    let report = install(
        &project,
        &packs,
        InstallOptions {
            create_missing: args.yes,
        },
    )?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &InstallReport) {
    if report.created_components {
        println!("Created {}", report.components.display());
    }
    for shader in &report.installed {
        println!("Installed {} ({})", shader.name, shader.title);
        for file in &shader.files {
            println!("  {}", file.display());
        }
        if let Some(asset) = &shader.asset {
            println!("  {}", asset.display());
        }
    }
}

fn check(catalog: &Catalog, args: &CheckArgs) -> Result<()> {
    let mut results: Vec<(String, Result<()>)> = Vec::new();
    if args.names.is_empty() {
        for entry in catalog.entries()? {
            let name = entry.name();
            let outcome = entry
                .pack
                .map_err(anyhow::Error::from)
                .and_then(|pack| check_pack(&pack));
            results.push((name, outcome));
        }
    } else {
        for name in &args.names {
            let outcome = catalog
                .resolve(name)
                .map_err(anyhow::Error::from)
                .and_then(|pack| check_pack(&pack));
            results.push((name.clone(), outcome));
        }
    }

    if results.is_empty() {
        println!("No shaders found.");
        return Ok(());
    }

    let mut failed = 0usize;
    for (name, outcome) in &results {
        match outcome {
            Ok(()) => println!("ok    {name}"),
            Err(err) => {
                failed += 1;
                println!("FAIL  {name}");
                for line in format!("{err:#}").lines() {
                    println!("      {line}");
                }
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{failed} of {} shaders failed", results.len()));
    }
    Ok(())
}

fn check_pack(pack: &ShaderPack) -> Result<()> {
    let uniforms = descriptors(pack.manifest());
    validate_descriptors(&uniforms)?;
    let source = shader_source(pack)?;
    check_program(&source, &uniforms)?;
    tracing::debug!(shader = pack.name(), "shader validated");
    Ok(())
}

fn preview(catalog: &Catalog, config: &AppConfig, args: &PreviewArgs) -> Result<()> {
    let first = catalog.resolve(&args.name)?;
    let mut shaders = vec![preview_shader(&first)?];

    // Remaining catalog entries follow for the space-bar cycle.
    for pack in catalog.list()? {
        if pack.name() == first.name() {
            continue;
        }
        match preview_shader(&pack) {
            Ok(shader) => shaders.push(shader),
            Err(err) => tracing::warn!(shader = pack.name(), "skipping shader: {err:#}"),
        }
    }

    let options = RuntimeOptions {
        quality: args.quality.unwrap_or(config.quality).into(),
        reduced_motion: args.reduced_motion || config.reduced_motion,
        release_when_hidden: config.release_when_hidden,
        ..RuntimeOptions::default()
    };
    let size = args
        .size
        .unwrap_or((config.window.width, config.window.height));
    tracing::info!(
        shader = first.name(),
        quality = %options.quality,
        reduced_motion = options.reduced_motion,
        "opening preview"
    );

    run_preview(PreviewConfig {
        title: "shaderz".to_string(),
        size,
        options,
        shaders,
    })
}

fn show_paths(paths: &AppPaths, catalog: &Catalog) -> Result<()> {
    println!("config file: {}", paths.config_file().display());
    println!("config dir:  {}", paths.config_dir().display());
    println!("data dir:    {}", paths.data_dir().display());
    println!("share dir:   {}", paths.share_dir().display());
    println!("catalog roots:");
    for root in catalog.roots() {
        let marker = if root.is_dir() { "" } else { " (missing)" };
        println!("  {}{marker}", root.display());
    }
    Ok(())
}
