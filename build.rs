//! Renders the `metered_listener(1)` man page from the `clap` definition.

use std::{fs, path::Path};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[allow(dead_code, reason = "only the argument definitions are rendered here")]
mod cli;

const MAN_DIR: &str = "target/generated-man";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let cmd = cli::Cli::command();
    let page = Path::new(MAN_DIR).join(format!("{}.1", cmd.get_name()));
    fs::create_dir_all(MAN_DIR)?;

    let mut roff = Vec::new();
    Man::new(cmd).render(&mut roff)?;
    fs::write(page, roff)?;
    Ok(())
}
