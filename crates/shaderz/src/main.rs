mod bindings;
mod cli;
mod config;
mod install;
mod paths;
mod run;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
