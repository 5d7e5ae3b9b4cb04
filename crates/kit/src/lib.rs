//! Disk image and disk device helpers for libvirt-based test setups.
//!
//! Backing images are created locally or through a command [`session`], and
//! `<disk>` device definitions are built as typed [`disk_xml::Disk`] values
//! ready to be attached to a domain.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the caller.

pub mod disk;
pub mod disk_xml;
pub mod local;
pub mod qemu_img;
pub mod session;
