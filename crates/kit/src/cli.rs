//! Command line options for the `vdisk` binary

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::{eyre::Context, Result};
use tracing::info;

use vdisk::disk::{self, CreateDiskOpts};
use vdisk::disk_xml::{Disk, DiskAuth, DiskSource};
use vdisk::qemu_img;
use vdisk::session::{Session, SshSession};

fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(s)
}

/// Remote host options; without `--ssh-host` the disk is created locally
#[derive(Debug, Parser)]
pub struct SshOpts {
    /// Create the disk on this host over SSH
    #[clap(long)]
    pub ssh_host: Option<String>,

    /// SSH user name
    #[clap(long, requires = "ssh_host")]
    pub ssh_user: Option<String>,

    /// SSH port
    #[clap(long, requires = "ssh_host")]
    pub ssh_port: Option<u16>,

    /// SSH private key file
    #[clap(long, requires = "ssh_host")]
    pub ssh_identity: Option<Utf8PathBuf>,

    /// SSH connection timeout in seconds
    #[clap(long, default_value = "30")]
    pub ssh_timeout: u32,

    /// Use strict host key checking
    #[clap(long)]
    pub strict_host_keys: bool,
}

impl SshOpts {
    fn session(&self) -> Option<SshSession> {
        let host = self.ssh_host.as_deref()?;
        Some(SshSession {
            user: self.ssh_user.clone(),
            port: self.ssh_port,
            identity: self.ssh_identity.clone(),
            connect_timeout: self.ssh_timeout,
            strict_host_keys: self.strict_host_keys,
            ..SshSession::new(host)
        })
    }
}

/// Create a disk image locally or on a remote host
#[derive(Debug, Parser)]
pub struct CreateDiskCliOpts {
    #[clap(flatten)]
    pub disk: CreateDiskOpts,

    #[clap(flatten)]
    pub ssh: SshOpts,
}

/// Output format for disk definitions
#[derive(Debug, Parser)]
pub struct OutputOpts {
    /// Print the disk as JSON instead of XML
    #[clap(long)]
    pub json: bool,
}

impl OutputOpts {
    fn print(&self, disk: &Disk) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(disk)?);
        } else {
            println!("{}", disk.to_xml());
        }
        Ok(())
    }
}

/// Build a disk definition with optional source and auth blocks
#[derive(Debug, Parser)]
pub struct PrimitiveXmlOpts {
    /// Disk type (file, block, network, ...)
    #[clap(long, default_value = "file")]
    pub type_name: String,

    /// Device kind (disk, cdrom, lun, ...)
    #[clap(long, default_value = "disk")]
    pub device: String,

    /// Target device name in the guest
    #[clap(long)]
    pub target: String,

    /// Target bus
    #[clap(long, default_value = "virtio")]
    pub bus: String,

    /// Image format used for the driver
    #[clap(long, default_value = disk::DEFAULT_FORMAT)]
    pub format: String,

    /// Source as JSON, e.g. '{"attrs": {"protocol": "rbd", "name": "pool/img"}, "hosts": [{"name": "192.0.2.1", "port": "6789"}]}'
    #[clap(long, value_parser = parse_json::<DiskSource>)]
    pub source: Option<DiskSource>,

    /// Auth as JSON, e.g. '{"auth_user": "admin", "secret_type": "ceph", "secret_uuid": "..."}'
    #[clap(long, value_parser = parse_json::<DiskAuth>)]
    pub auth: Option<DiskAuth>,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// Build (or update) a disk definition with a qcow2 metadata cache limit
#[derive(Debug, Parser)]
pub struct CustomMetadataXmlOpts {
    /// Path of the disk image
    #[clap(long, default_value = "")]
    pub path: String,

    /// Image format used for the driver
    #[clap(long)]
    pub format: String,

    /// Device kind (disk, cdrom, lun, ...)
    #[clap(long, default_value = "")]
    pub device: String,

    /// Target device name in the guest
    #[clap(long, default_value = "")]
    pub target: String,

    /// Target bus
    #[clap(long, default_value = "")]
    pub bus: String,

    /// Maximum metadata cache size in bytes
    #[clap(long)]
    pub max_size: u64,

    /// Update the disk stored as JSON in this file instead of creating one
    #[clap(long)]
    pub existing: Option<Utf8PathBuf>,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// Show qemu-img information for an image
#[derive(Debug, Parser)]
pub struct InfoOpts {
    /// Path of the disk image
    pub path: Utf8PathBuf,

    /// Print the raw JSON details
    #[clap(long)]
    pub json: bool,
}

pub fn create_disk(opts: CreateDiskCliOpts) -> Result<()> {
    let session = opts.ssh.session();
    let path = disk::create_disk(&opts.disk, session.as_ref().map(|s| s as &dyn Session))?;
    info!("Created {} disk at {path}", opts.disk.disk_type);
    println!("{path}");
    Ok(())
}

pub fn primitive_xml(opts: PrimitiveXmlOpts) -> Result<()> {
    let disk = disk::create_primitive_disk_xml(
        &opts.type_name,
        &opts.device,
        &opts.target,
        &opts.bus,
        &opts.format,
        opts.source,
        opts.auth,
    );
    opts.output.print(&disk)
}

pub fn custom_metadata_xml(opts: CustomMetadataXmlOpts) -> Result<()> {
    let existing = opts
        .existing
        .as_ref()
        .map(|p| -> Result<Disk> {
            let buf = std::fs::read_to_string(p).with_context(|| format!("Reading {p}"))?;
            serde_json::from_str(&buf).with_context(|| format!("Parsing disk JSON from {p}"))
        })
        .transpose()?;
    let disk = disk::create_custom_metadata_disk(
        &opts.path,
        &opts.format,
        &opts.device,
        &opts.target,
        &opts.bus,
        opts.max_size,
        existing,
    );
    opts.output.print(&disk)
}

pub fn info(opts: InfoOpts) -> Result<()> {
    let info = qemu_img::info(&opts.path)?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Image:        {}", info.filename);
        println!("Format:       {}", info.format);
        println!("Virtual size: {} bytes", info.virtual_size);
        if let Some(actual) = info.actual_size {
            println!("Disk size:    {actual} bytes");
        }
        if let Some(ref backing) = info.backing_filename {
            println!("Backing file: {backing}");
        }
    }
    Ok(())
}
