//! Helper functions for interacting with qemu-img

use std::process::Command;
use std::sync::OnceLock;

use camino::Utf8Path;
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use serde::{Deserialize, Serialize};

/// Name of the tool in command lines run through a session
pub const QEMU_IMG: &str = "qemu-img";

/// The qemu-img binary used on the local host.
///
/// Can be overridden with `VDISK_QEMU_IMG`.
pub(crate) fn qemu_img_binary() -> &'static str {
    static BIN: OnceLock<String> = OnceLock::new();
    BIN.get_or_init(|| std::env::var("VDISK_QEMU_IMG").unwrap_or_else(|_| QEMU_IMG.to_string()))
}

/// Build `qemu-img create -f <format> <extra> <path> <size>` as a shell
/// command line.
///
/// `extra` is passed through verbatim and skipped when empty; the path is
/// quoted only if the shell would otherwise split or expand it.
pub fn create_command_line(format: &str, extra: &str, path: &Utf8Path, size: &str) -> Result<String> {
    let path = shlex::try_quote(path.as_str())
        .map_err(|e| eyre!("Cannot quote disk path {path}: {e}"))?;
    let mut parts = vec![QEMU_IMG, "create", "-f", format];
    if !extra.trim().is_empty() {
        parts.push(extra.trim());
    }
    parts.push(&path);
    parts.push(size);
    Ok(parts.join(" "))
}

/// Information returned by `qemu-img info --output=json`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QemuImgInfo {
    /// Size seen by the guest, in bytes
    pub virtual_size: u64,
    /// Image file name
    pub filename: String,
    /// Image format
    pub format: String,
    /// Space used on the host, in bytes
    pub actual_size: Option<u64>,
    /// qcow2 cluster size
    pub cluster_size: Option<u64>,
    /// Backing file as recorded in the image
    pub backing_filename: Option<String>,
    /// Whether the image was not closed cleanly
    pub dirty_flag: Option<bool>,
}

/// Run `qemu-img info --force-share --output=json` on a disk image
///
/// The `--force-share` flag allows reading disk info even when the image
/// is locked by a running VM.
pub fn info(path: &Utf8Path) -> Result<QemuImgInfo> {
    let output = Command::new(qemu_img_binary())
        .args(["info", "--force-share", "--output=json", path.as_str()])
        .output()
        .with_context(|| format!("Failed to run qemu-img info on {:?}", path))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(eyre!("qemu-img info failed for {:?}: {}", path, stderr));
    }

    parse_info(&output.stdout).with_context(|| format!("Failed to parse qemu-img info JSON for {:?}", path))
}

fn parse_info(buf: &[u8]) -> Result<QemuImgInfo> {
    Ok(serde_json::from_slice(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_command_line() {
        let cmd = create_command_line("qcow2", "", Utf8Path::new("/var/lib/disk.qcow2"), "1G").unwrap();
        assert_eq!(cmd, "qemu-img create -f qcow2 /var/lib/disk.qcow2 1G");

        let cmd = create_command_line(
            "qcow2",
            "-o preallocation=metadata",
            Utf8Path::new("/tmp/d.qcow2"),
            "500M",
        )
        .unwrap();
        assert_eq!(
            cmd,
            "qemu-img create -f qcow2 -o preallocation=metadata /tmp/d.qcow2 500M"
        );
    }

    #[test]
    fn test_create_command_line_quotes_path() {
        let cmd = create_command_line("raw", "", Utf8Path::new("/tmp/my disk.img"), "1G").unwrap();
        assert_eq!(cmd, "qemu-img create -f raw '/tmp/my disk.img' 1G");
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(
            br#"{
                "virtual-size": 1073741824,
                "filename": "/tmp/test.qcow2",
                "cluster-size": 65536,
                "format": "qcow2",
                "actual-size": 200704,
                "dirty-flag": false
            }"#,
        )
        .unwrap();
        assert_eq!(info.virtual_size, 1073741824);
        assert_eq!(info.format, "qcow2");
        assert_eq!(info.cluster_size, Some(65536));
        assert_eq!(info.backing_filename, None);
    }
}
