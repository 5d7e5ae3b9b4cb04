use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};

mod tests {
    pub mod create_disk;
    pub mod disk_xml;
}

/// Get the path to the vdisk binary, checking VDISK_PATH env var first, then falling back to "vdisk"
pub(crate) fn get_vdisk_command() -> Result<String> {
    if let Ok(path) = std::env::var("VDISK_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/vdisk", "target/release/vdisk"]
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set VDISK_PATH={path} to run using this binary"
        ));
    }
    Ok("vdisk".to_owned())
}

/// Whether qemu-img is available on this host
pub(crate) fn have_qemu_img() -> bool {
    std::process::Command::new("qemu-img")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn main() {
    let args = Arguments::from_args();
    let no_qemu_img = !have_qemu_img();

    let tests = vec![
        Trial::test("create_disk_help", || {
            tests::create_disk::test_create_disk_help()?;
            Ok(())
        }),
        Trial::test("create_disk_local_qcow2", || {
            tests::create_disk::test_create_disk_local_qcow2()?;
            Ok(())
        })
        .with_ignored_flag(no_qemu_img),
        Trial::test("create_disk_local_floppy", || {
            tests::create_disk::test_create_disk_local_floppy()?;
            Ok(())
        }),
        Trial::test("create_disk_unknown_local_type", || {
            tests::create_disk::test_create_disk_unknown_local_type()?;
            Ok(())
        }),
        Trial::test("custom_metadata_xml", || {
            tests::disk_xml::test_custom_metadata_xml()?;
            Ok(())
        }),
        Trial::test("custom_metadata_xml_update_existing", || {
            tests::disk_xml::test_custom_metadata_xml_update_existing()?;
            Ok(())
        }),
        Trial::test("primitive_xml_network", || {
            tests::disk_xml::test_primitive_xml_network()?;
            Ok(())
        }),
        Trial::test("primitive_xml_rejects_bad_source", || {
            tests::disk_xml::test_primitive_xml_rejects_bad_source()?;
            Ok(())
        }),
    ];

    libtest_mimic::run(&args, tests).exit();
}
