//! Disk image creation on the local host

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use crate::disk::DiskError;
use crate::qemu_img::qemu_img_binary;

/// Size of the zero-filled image created for floppy disks
const FLOPPY_SIZE: u64 = 1024 * 1024;

/// Disk types that can be created on the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LocalDiskType {
    /// An image file created with qemu-img
    File,
    /// A 1 MiB zero-filled image
    Floppy,
}

/// Creates disk images on the machine running the tests
pub trait LocalDiskCreator: std::fmt::Debug {
    /// Create a disk of `disk_type` at `path` and return the resulting path
    fn create(
        &self,
        disk_type: &str,
        path: &Utf8Path,
        size: &str,
        format: &str,
        extra: &str,
    ) -> Result<Utf8PathBuf>;
}

/// Creates disks directly on the host with qemu-img
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDiskCreator;

impl LocalDiskCreator for HostDiskCreator {
    #[instrument(skip(self))]
    fn create(
        &self,
        disk_type: &str,
        path: &Utf8Path,
        size: &str,
        format: &str,
        extra: &str,
    ) -> Result<Utf8PathBuf> {
        let kind: LocalDiskType = disk_type
            .parse()
            .map_err(|_| DiskError::UnknownDiskType(disk_type.to_owned()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating directory {parent}"))?;
        }

        match kind {
            LocalDiskType::File => {
                let mut cmd = qemu_img_create_command(path, size, format, extra)?;
                debug!("Running {cmd:?}");
                let output = cmd.output().context("Failed to run qemu-img create")?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(eyre!("qemu-img create failed for {path}: {stderr}"));
                }
            }
            LocalDiskType::Floppy => {
                let f = std::fs::File::create(path)
                    .with_context(|| format!("Creating floppy image {path}"))?;
                f.set_len(FLOPPY_SIZE)?;
            }
        }
        Ok(path.to_owned())
    }
}

/// A bare number is taken as gigabytes.
fn normalize_size(size: &str) -> String {
    let size = size.trim();
    if size.parse::<f64>().is_ok() {
        format!("{size}G")
    } else {
        size.to_owned()
    }
}

fn qemu_img_create_command(path: &Utf8Path, size: &str, format: &str, extra: &str) -> Result<Command> {
    let extra = shlex::split(extra).ok_or_else(|| eyre!("Invalid quoting in extra arguments: {extra}"))?;
    let mut cmd = Command::new(qemu_img_binary());
    cmd.args(["create", "-f", format]);
    cmd.args(extra);
    cmd.arg(path.as_str());
    cmd.arg(normalize_size(size));
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn test_normalize_size() {
        assert_eq!(normalize_size("10"), "10G");
        assert_eq!(normalize_size("0.5"), "0.5G");
        assert_eq!(normalize_size("500M"), "500M");
        assert_eq!(normalize_size(" 2G "), "2G");
    }

    #[test]
    fn test_qemu_img_create_command() {
        let cmd = qemu_img_create_command(
            Utf8Path::new("/tmp/a.qcow2"),
            "1",
            "qcow2",
            "-o 'cluster_size=2M'",
        )
        .unwrap();
        let args: Vec<_> = cmd.get_args().filter_map(OsStr::to_str).collect();
        assert_eq!(
            args,
            ["create", "-f", "qcow2", "-o", "cluster_size=2M", "/tmp/a.qcow2", "1G"]
        );

        assert!(qemu_img_create_command(Utf8Path::new("/tmp/a"), "1G", "raw", "'unterminated").is_err());
    }

    #[test]
    fn test_parse_local_disk_type() {
        assert_eq!("file".parse::<LocalDiskType>().unwrap(), LocalDiskType::File);
        assert_eq!(LocalDiskType::Floppy.to_string(), "floppy");
        assert!("lvm".parse::<LocalDiskType>().is_err());
    }

    #[test]
    fn test_create_floppy() {
        let td = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let path = dir.join("nested/floppy.img");
        let r = HostDiskCreator
            .create("floppy", &path, "500M", "raw", "")
            .unwrap();
        assert_eq!(r, path);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), FLOPPY_SIZE);
    }

    #[test]
    fn test_unknown_local_type() {
        let err = HostDiskCreator
            .create("iscsi", Utf8Path::new("/nonexistent/x"), "1G", "raw", "")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiskError>(),
            Some(DiskError::UnknownDiskType(t)) if t == "iscsi"
        ));
    }
}
