//! Disk image and disk device helpers for test setups
//!
//! Three independent helpers:
//!
//! - [`create_disk`] creates a backing image, either through a [`Session`] on
//!   a remote host or guest, or on the local host.
//! - [`create_primitive_disk_xml`] builds a [`Disk`] from type, target, format
//!   and optional source/auth blocks.
//! - [`create_custom_metadata_disk`] builds or updates a [`Disk`] whose driver
//!   carries a qcow2 metadata cache limit.
//!
//! The two builders treat a missing source differently: the primitive builder
//! leaves the source unset, while the metadata builder always assigns one,
//! even when no path is given.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use tracing::{debug, instrument};

use crate::disk_xml::{
    Disk, DiskAuth, DiskDriver, DiskSource, DiskTarget, DriverMetadata, MetadataCache,
};
use crate::local::{HostDiskCreator, LocalDiskCreator};
use crate::qemu_img;
use crate::session::Session;

/// Default size of a created image
pub const DEFAULT_SIZE: &str = "500M";
/// Default image format
pub const DEFAULT_FORMAT: &str = "raw";
/// Unit used for the metadata cache size
pub const METADATA_CACHE_UNIT: &str = "bytes";

/// Errors raised by the disk helpers themselves
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    /// The disk type cannot be created in this context
    #[error("Unknown disk type {0}")]
    UnknownDiskType(String),
    /// The image creation command exited with a nonzero status
    #[error("Failed to create img on remote: cmd: {cmd} status: {status}, stdout: {output}")]
    RemoteCreate {
        /// Command line that was run
        cmd: String,
        /// Its exit status
        status: i32,
        /// Its captured output
        output: String,
    },
}

/// Options for creating a disk image
#[derive(Debug, Clone, Parser)]
pub struct CreateDiskOpts {
    /// Disk type (only `file` is supported through a remote session)
    pub disk_type: String,

    /// Path of the disk image
    pub path: Utf8PathBuf,

    /// Size of the image (e.g. 500M, 10G); a bare number means gigabytes locally
    #[clap(long, default_value = DEFAULT_SIZE)]
    pub size: String,

    /// Image format
    #[clap(long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Extra arguments passed to qemu-img before the path
    #[clap(long, default_value = "", allow_hyphen_values = true)]
    pub extra: String,
}

impl CreateDiskOpts {
    /// Options for a disk of `disk_type` at `path` with default size and format
    pub fn new(disk_type: &str, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            disk_type: disk_type.to_owned(),
            path: path.into(),
            size: DEFAULT_SIZE.to_owned(),
            format: DEFAULT_FORMAT.to_owned(),
            extra: String::new(),
        }
    }
}

/// Create a disk image on the local host, or through `session` when given.
///
/// Through a session only `file` disks are supported; the command is
/// `qemu-img create -f <format> <extra> <path> <size>` and the given path is
/// returned unchanged once it exits successfully. Without a session the work
/// is handed to [`HostDiskCreator`].
pub fn create_disk(opts: &CreateDiskOpts, session: Option<&dyn Session>) -> Result<Utf8PathBuf> {
    create_disk_with(opts, session, &HostDiskCreator)
}

/// Like [`create_disk`], with an explicit local creator.
#[instrument(level = "debug", skip(session, local))]
pub fn create_disk_with(
    opts: &CreateDiskOpts,
    session: Option<&dyn Session>,
    local: &dyn LocalDiskCreator,
) -> Result<Utf8PathBuf> {
    let Some(session) = session else {
        return local.create(
            &opts.disk_type,
            &opts.path,
            &opts.size,
            &opts.format,
            &opts.extra,
        );
    };

    if opts.disk_type != "file" {
        // TODO: support block and network disks through a session
        return Err(DiskError::UnknownDiskType(opts.disk_type.clone()).into());
    }
    let cmd = qemu_img::create_command_line(&opts.format, &opts.extra, &opts.path, &opts.size)?;
    let out = session.cmd_status_output(&cmd)?;
    if !out.success() {
        return Err(DiskError::RemoteCreate {
            cmd,
            status: out.status,
            output: out.output,
        }
        .into());
    }
    debug!(path = %opts.path, "Created disk image through session");
    Ok(opts.path.clone())
}

/// Build a disk device of `type_name` with a qemu driver for `format`.
///
/// Source and auth are assigned whenever they are given, even if every field
/// is unset: an empty source still renders as `<source/>`.
#[instrument(level = "debug")]
pub fn create_primitive_disk_xml(
    type_name: &str,
    device: &str,
    target: &str,
    bus: &str,
    format: &str,
    source: Option<DiskSource>,
    auth: Option<DiskAuth>,
) -> Disk {
    let mut disk = Disk::new(type_name)
        .with_device(device)
        .with_target(target, bus)
        .with_driver(DiskDriver::qemu(format));
    if let Some(source) = source {
        disk = disk.with_source(source);
    }
    if let Some(auth) = auth {
        disk = disk.with_auth(auth);
    }
    debug!(%disk, "Created primitive disk");
    disk
}

/// Build a `file` disk whose driver limits the qcow2 metadata cache to
/// `max_size` bytes, or apply the same settings to `existing`.
///
/// Empty `path`, `device` or `target` leave the respective setting alone,
/// except that a source is always assigned: without a path it is empty.
#[instrument(level = "debug", skip(existing))]
pub fn create_custom_metadata_disk(
    path: &str,
    format: &str,
    device: &str,
    target: &str,
    bus: &str,
    max_size: u64,
    existing: Option<Disk>,
) -> Disk {
    let mut disk = existing.unwrap_or_else(|| Disk::new("file"));
    apply_custom_metadata(&mut disk, path, format, device, target, bus, max_size);
    disk
}

/// In-place form of [`create_custom_metadata_disk`].
pub fn apply_custom_metadata(
    disk: &mut Disk,
    path: &str,
    format: &str,
    device: &str,
    target: &str,
    bus: &str,
    max_size: u64,
) {
    if !device.is_empty() {
        disk.device = Some(device.to_owned());
    }
    disk.source = Some(if path.is_empty() {
        DiskSource::default()
    } else {
        DiskSource::file(path)
    });
    if !target.is_empty() {
        disk.target = Some(DiskTarget::new(target, bus));
    }
    let driver = DiskDriver::qemu(format);
    disk.driver = Some(driver.clone());
    disk.driver_metadata = Some(DriverMetadata {
        attrs: driver,
        metadata_cache: Some(MetadataCache {
            max_size: Some(max_size),
            max_size_unit: Some(METADATA_CACHE_UNIT.to_owned()),
        }),
    });
    debug!(%disk, "Disk with custom metadata cache");
}
