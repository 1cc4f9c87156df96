//! Discovery registrar.
//!
//! Runs as a companion container inside the composed pod. At startup it
//! resolves the pod's own address, writes one directory row per task name
//! and then idles until terminated, so peers that cannot use cluster DNS can
//! still find the pod's workloads.

pub mod address;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod registrar;

pub use address::{AddressResolver, HostnameResolver, StaticResolver};
pub use directory::{
    normalize_task_name, Directory, DirectoryEntry, MemoryDirectory, MySqlDirectory,
};
pub use error::RegistrarError;
pub use registrar::{Registrar, RegistrarState, Registration};
