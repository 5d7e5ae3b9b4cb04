use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};

mod cli;

/// Create disk images and libvirt disk definitions for VM tests.
///
/// Disk images are created with qemu-img on the local host, or on a remote
/// host or guest over SSH. Disk definitions are printed as libvirt `<disk>`
/// XML (or JSON) ready to be attached to a domain.
#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available vdisk commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a disk image locally or on a remote host
    #[clap(name = "create-disk")]
    CreateDisk(cli::CreateDiskCliOpts),

    /// Print a disk definition with optional source and auth blocks
    #[clap(name = "primitive-xml")]
    PrimitiveXml(cli::PrimitiveXmlOpts),

    /// Print a disk definition with a qcow2 metadata cache limit
    #[clap(name = "custom-metadata-xml")]
    CustomMetadataXml(cli::CustomMetadataXmlOpts),

    /// Show qemu-img information for a disk image
    Info(cli::InfoOpts),
}

/// Install and configure the tracing/logging system.
///
/// Sets up structured logging with environment-based filtering,
/// error layer integration, and console output formatting.
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
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

    let cli = Cli::parse();

    match cli.command {
        Commands::CreateDisk(opts) => cli::create_disk(opts)?,
        Commands::PrimitiveXml(opts) => cli::primitive_xml(opts)?,
        Commands::CustomMetadataXml(opts) => cli::custom_metadata_xml(opts)?,
        Commands::Info(opts) => cli::info(opts)?,
    }
    Ok(())
}
