use indoc::{formatdoc, indoc};
use similar_asserts::assert_eq;
use vdisk::disk::{
    create_custom_metadata_disk, create_disk, create_primitive_disk_xml, CreateDiskOpts, DiskError,
};
use vdisk::disk_xml::{Disk, DiskAuth, DiskSource};
use vdisk::session::LocalSession;

#[test]
fn test_custom_metadata_disk_xml() {
    let disk = create_custom_metadata_disk(
        "/var/lib/disk.qcow2",
        "qcow2",
        "disk",
        "vdb",
        "virtio",
        1048576,
        None,
    );
    assert_eq!(
        disk.to_xml(),
        indoc! {r#"
            <disk type="file" device="disk">
              <driver name="qemu" type="qcow2">
                <metadata_cache>
                  <max_size unit="bytes">1048576</max_size>
                </metadata_cache>
              </driver>
              <source file="/var/lib/disk.qcow2"/>
              <target dev="vdb" bus="virtio"/>
            </disk>"#}
    );
}

#[test]
fn test_rbd_disk_xml() {
    let secret_uuid = uuid::Uuid::new_v4().to_string();
    let source: DiskSource = serde_json::from_value(serde_json::json!({
        "attrs": {"protocol": "rbd", "name": "libvirt-pool/vm-disk"},
        "hosts": [{"name": "192.0.2.20", "port": "6789"}],
    }))
    .unwrap();
    let auth: DiskAuth = serde_json::from_value(serde_json::json!({
        "auth_user": "libvirt",
        "secret_type": "ceph",
        "secret_uuid": &secret_uuid,
    }))
    .unwrap();

    let disk = create_primitive_disk_xml(
        "network",
        "disk",
        "vdb",
        "virtio",
        "raw",
        Some(source),
        Some(auth),
    );
    let expected = formatdoc! {r#"
            <disk type="network" device="disk">
              <driver name="qemu" type="raw"/>
              <source protocol="rbd" name="libvirt-pool/vm-disk">
                <host name="192.0.2.20" port="6789"/>
              </source>
              <auth username="libvirt">
                <secret type="ceph" uuid="{}"/>
              </auth>
              <target dev="vdb" bus="virtio"/>
            </disk>"#,
        secret_uuid
    };
    assert_eq!(disk.to_xml(), expected);
}

#[test]
fn test_updated_disk_survives_json() {
    let base = create_primitive_disk_xml("file", "disk", "vdc", "scsi", "raw", None, None);
    let json = serde_json::to_string(&base).unwrap();
    let existing: Disk = serde_json::from_str(&json).unwrap();
    assert_eq!(existing, base);

    let disk = create_custom_metadata_disk("/tmp/c.qcow2", "qcow2", "", "", "", 8192, Some(existing));
    assert_eq!(disk.device.as_deref(), Some("disk"));
    assert_eq!(disk.target.as_ref().map(|t| t.dev.as_str()), Some("vdc"));
    assert!(disk.to_xml().contains("<max_size unit=\"bytes\">8192</max_size>"));
}

#[test]
fn test_remote_create_through_local_shell() {
    // Fails on the unknown format, or with 127 where qemu-img is missing.
    let td = tempfile::tempdir().unwrap();
    let path = camino::Utf8Path::from_path(td.path()).unwrap().join("bad.img");
    let opts = CreateDiskOpts {
        format: "no-such-format".into(),
        ..CreateDiskOpts::new("file", path.clone())
    };
    let err = create_disk(&opts, Some(&LocalSession)).unwrap_err();
    let Some(DiskError::RemoteCreate { cmd, status, .. }) = err.downcast_ref::<DiskError>() else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(cmd, &format!("qemu-img create -f no-such-format {path} 500M"));
    assert_ne!(*status, 0);
}
