//! CLI command handlers, one per file.

mod checksum;
mod inspect;
mod provision;
mod verify;

pub use checksum::run_checksum;
pub use inspect::run_inspect;
pub use provision::run_provision;
pub use verify::run_verify;
