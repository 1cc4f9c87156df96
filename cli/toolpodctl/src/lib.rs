//! toolpodctl - compose the tool's workload pod and drive the cluster.
//!
//! The catalog and composer live in `toolpod-manifest`; this crate adds
//! the front end and the apply/delete driver.

pub mod cli;
pub mod driver;
pub mod environment;
pub mod error;
pub mod logging;
pub mod output;
