//! Typed model of a libvirt `<disk>` device element
//!
//! A [`Disk`] is built either through the chained `with_*` methods or by
//! assigning its public fields directly when an existing disk is updated in
//! place. Sub-objects for the source and auth blocks deserialize from the
//! mapping shapes used by test parameters, e.g.
//!
//! ```json
//! {"attrs": {"protocol": "rbd", "name": "pool/image"},
//!  "hosts": [{"name": "192.0.2.10", "port": "6789"}]}
//! ```
//!
//! [`Disk::to_xml`] renders the element for inclusion in a domain definition.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::escape::escape;
use serde::{Deserialize, Deserializer, Serialize};

/// Target block device as seen by the guest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTarget {
    /// Device name in the guest, e.g. `vdb`
    pub dev: String,
    /// Bus type, e.g. `virtio`, `scsi`, `sata`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
}

impl DiskTarget {
    /// Create a target; an empty bus leaves the bus unset.
    pub fn new(dev: &str, bus: &str) -> Self {
        Self {
            dev: dev.to_owned(),
            bus: (!bus.is_empty()).then(|| bus.to_owned()),
        }
    }
}

/// Hypervisor driver and image format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDriver {
    /// Driver name, `qemu` for every disk built here
    pub name: String,
    /// Image format, e.g. `raw` or `qcow2`
    #[serde(rename = "type")]
    pub driver_type: String,
}

impl DiskDriver {
    /// The `qemu` driver with the given image format
    pub fn qemu(format: &str) -> Self {
        Self {
            name: "qemu".to_owned(),
            driver_type: format.to_owned(),
        }
    }
}

/// A scalar attribute value; accepted as a JSON string or integer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// String value
    Str(String),
    /// Integer value, rendered in decimal
    Int(i64),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Attributes of the `<source>` element
///
/// The common attributes have their own fields. Any other key, such as
/// `startupPolicy` or `index`, is kept in [`SourceAttrs::other`] and
/// rendered after them in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttrs {
    /// Image path for `file` disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Device path for `block` disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,
    /// Directory for `dir` disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Network protocol, e.g. `rbd`, `iscsi`, `nbd`, `gluster`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Network image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Storage pool for `volume` disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    /// Storage volume for `volume` disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Remaining attributes
    #[serde(flatten)]
    pub other: BTreeMap<String, AttrValue>,
}

impl SourceAttrs {
    fn pairs(&self) -> [(&'static str, Option<&str>); 7] {
        [
            ("file", self.file.as_deref()),
            ("dev", self.dev.as_deref()),
            ("dir", self.dir.as_deref()),
            ("protocol", self.protocol.as_deref()),
            ("name", self.name.as_deref()),
            ("pool", self.pool.as_deref()),
            ("volume", self.volume.as_deref()),
        ]
    }
}

/// A `<host>` entry of a network source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceHost {
    /// Host name or address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port; accepted as a JSON string or number
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<String>,
    /// Transport, e.g. `tcp` or `unix`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Socket path for the `unix` transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<AttrValue>::deserialize(deserializer)?.map(|v| v.to_string()))
}

/// The `<source>` block of a disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskSource {
    /// Attributes of the element itself
    #[serde(default)]
    pub attrs: SourceAttrs,
    /// Hosts of a network source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<SourceHost>,
}

impl DiskSource {
    /// A source pointing at an image file
    pub fn file(path: &str) -> Self {
        Self {
            attrs: SourceAttrs {
                file: Some(path.to_owned()),
                ..Default::default()
            },
            hosts: Vec::new(),
        }
    }
}

/// The `<auth>` block of a network disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskAuth {
    /// User name presented to the storage backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_user: Option<String>,
    /// Secret type, e.g. `ceph` or `iscsi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
    /// UUID of the libvirt secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_uuid: Option<String>,
    /// Usage name of the libvirt secret, alternative to the UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_usage: Option<String>,
}

/// qcow2 metadata cache limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCache {
    /// Maximum cache size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Unit of `max_size`, e.g. `bytes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_unit: Option<String>,
}

/// A `<driver>` element carrying nested metadata settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverMetadata {
    /// Attributes of the `<driver>` element
    pub attrs: DiskDriver,
    /// Nested `<metadata_cache>` element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_cache: Option<MetadataCache>,
}

/// A virtual disk device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Disk type: `file`, `block`, `network`, `dir`, `volume`
    pub type_name: String,
    /// Device kind: `disk`, `cdrom`, `floppy`, `lun`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Guest target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DiskTarget>,
    /// Plain driver attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DiskDriver>,
    /// Backing source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DiskSource>,
    /// Authentication for network sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<DiskAuth>,
    /// Driver with nested metadata; rendered in place of `driver` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_metadata: Option<DriverMetadata>,
}

impl Disk {
    /// Create an empty disk of the given type
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_owned(),
            ..Default::default()
        }
    }

    /// Set the device kind
    pub fn with_device(mut self, device: &str) -> Self {
        self.device = Some(device.to_owned());
        self
    }

    /// Set the guest target
    pub fn with_target(mut self, dev: &str, bus: &str) -> Self {
        self.target = Some(DiskTarget::new(dev, bus));
        self
    }

    /// Set the driver
    pub fn with_driver(mut self, driver: DiskDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: DiskSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the auth block
    pub fn with_auth(mut self, auth: DiskAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Render the `<disk>` element
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<disk");
        push_attrs(
            &mut xml,
            &[
                ("type", Some(self.type_name.as_str())),
                ("device", self.device.as_deref()),
            ],
        );
        xml.push('>');

        if let Some(ref metadata) = self.driver_metadata {
            xml.push_str("\n  <driver");
            push_driver_attrs(&mut xml, &metadata.attrs);
            match metadata.metadata_cache {
                Some(ref cache) => {
                    xml.push_str(">\n    <metadata_cache");
                    match cache.max_size {
                        Some(max_size) => {
                            xml.push_str(">\n      <max_size");
                            push_attrs(&mut xml, &[("unit", cache.max_size_unit.as_deref())]);
                            xml.push_str(&format!(">{max_size}</max_size>\n    </metadata_cache>"));
                        }
                        None => xml.push_str("/>"),
                    }
                    xml.push_str("\n  </driver>");
                }
                None => xml.push_str("/>"),
            }
        } else if let Some(ref driver) = self.driver {
            xml.push_str("\n  <driver");
            push_driver_attrs(&mut xml, driver);
            xml.push_str("/>");
        }

        if let Some(ref source) = self.source {
            xml.push_str("\n  <source");
            push_attrs(&mut xml, &source.attrs.pairs());
            for (key, value) in &source.attrs.other {
                push_attr(&mut xml, key, &value.to_string());
            }
            if source.hosts.is_empty() {
                xml.push_str("/>");
            } else {
                xml.push('>');
                for host in &source.hosts {
                    xml.push_str("\n    <host");
                    push_attrs(
                        &mut xml,
                        &[
                            ("name", host.name.as_deref()),
                            ("port", host.port.as_deref()),
                            ("transport", host.transport.as_deref()),
                            ("socket", host.socket.as_deref()),
                        ],
                    );
                    xml.push_str("/>");
                }
                xml.push_str("\n  </source>");
            }
        }

        if let Some(ref auth) = self.auth {
            xml.push_str("\n  <auth");
            push_attrs(&mut xml, &[("username", auth.auth_user.as_deref())]);
            if auth.secret_type.is_some() || auth.secret_uuid.is_some() || auth.secret_usage.is_some()
            {
                xml.push_str(">\n    <secret");
                push_attrs(
                    &mut xml,
                    &[
                        ("type", auth.secret_type.as_deref()),
                        ("uuid", auth.secret_uuid.as_deref()),
                        ("usage", auth.secret_usage.as_deref()),
                    ],
                );
                xml.push_str("/>\n  </auth>");
            } else {
                xml.push_str("/>");
            }
        }

        if let Some(ref target) = self.target {
            xml.push_str("\n  <target");
            push_attrs(
                &mut xml,
                &[("dev", Some(target.dev.as_str())), ("bus", target.bus.as_deref())],
            );
            xml.push_str("/>");
        }

        xml.push_str("\n</disk>");
        xml
    }
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn push_driver_attrs(xml: &mut String, driver: &DiskDriver) {
    push_attrs(
        xml,
        &[
            ("name", Some(driver.name.as_str())),
            ("type", Some(driver.driver_type.as_str())),
        ],
    );
}

fn push_attrs(xml: &mut String, attrs: &[(&str, Option<&str>)]) {
    for (key, value) in attrs {
        if let Some(value) = value {
            push_attr(xml, key, value);
        }
    }
}

fn push_attr(xml: &mut String, key: &str, value: &str) {
    xml.push_str(&format!(" {key}=\"{}\"", escape(value)));
}
