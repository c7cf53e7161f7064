//! Package identifiers, versions, version ranges, and manifest parsing for modorder.
//!
//! This crate defines the schema layer: the strict dotted package id grammar
//! (`PackageId`), numeric semantic versions with strict and loose parsing
//! (`Version`), node-style version range expressions (`Range`), the declarative
//! per-package manifest file (`ManifestFile`), the host package descriptor
//! (`PackageDescriptor`), and the per-package user data record (`UserData`).

pub mod descriptor;
pub mod manifest;
pub mod range;
pub mod types;
pub mod userdata;
pub mod version;

pub use descriptor::{
    parse_descriptor_file, parse_descriptor_str, PackageDescriptor, DESCRIPTOR_PATH,
};
pub use manifest::{
    parse_declaration, parse_manifest_file, parse_manifest_str, Declaration, ManifestError,
    ManifestFile, MANIFEST_PATH,
};
pub use range::{Range, RangeError};
pub use types::{strip_name, ContentHash, PackageId};
pub use userdata::UserData;
pub use version::{probe_file_version, Version, VersionError};
