//! See https://github.com/matklad/cargo-xtask
//! This is kind of like "Justfile but in Rust".

use color_eyre::eyre::{Context, Report};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[allow(clippy::type_complexity)]
const TASKS: &[(&str, fn(&Shell) -> Result<()>)] =
    &[("build", build), ("lint", lint), ("test", test)];

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;
    let sh = Shell::new()?;
    // Tasks run from the workspace root
    let toplevel = cmd!(sh, "git rev-parse --show-toplevel")
        .read()
        .context("Invoking git rev-parse")?;
    sh.change_dir(toplevel.trim());

    let task = std::env::args().nth(1);
    if let Some(cmd) = task.as_deref() {
        let f = TASKS
            .iter()
            .find_map(|(k, f)| (*k == cmd).then_some(*f))
            .unwrap_or(print_help);
        f(&sh)?;
    } else {
        print_help(&sh)?;
    }
    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo build -p vdisk --release").run()?;
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo fmt --all --check").run()?;
    cmd!(sh, "cargo clippy --workspace --all-targets").run()?;
    Ok(())
}

/// Unit tests, then the integration tests against the freshly built binary
fn test(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test -p vdisk").run()?;
    build(sh)?;
    let vdisk = sh.current_dir().join("target/release/vdisk");
    tracing::info!("Running integration tests with {}", vdisk.display());
    let _env = sh.push_env("VDISK_PATH", &vdisk);
    cmd!(sh, "cargo test -p integration-tests").run()?;
    Ok(())
}

fn print_help(_sh: &Shell) -> Result<()> {
    println!("Tasks:");
    for (name, _) in TASKS {
        println!("  - {name}");
    }
    Ok(())
}
