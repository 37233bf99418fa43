//! Fetch, verify and place architecture-specific native tool binaries.
//!
//! [`provision::Provisioner`] drives the pipeline; the other modules are its
//! gates and plumbing.

pub mod config;
pub mod logging;

pub mod arch;
pub mod checksum;
pub mod control;
pub mod elf;
pub mod error;
pub mod fetch;
pub mod local_props;
pub mod provision;
