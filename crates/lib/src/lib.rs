//! fsprov-lib: manifest-driven provisioning of the fastStructure toolchain.
//!
//! This crate provides the pieces the `fsprov` CLI drives:
//! - `Manifest`: the ordered dependency chain and its build templates
//! - `Provisioner`: fetch, unpack, build and install each descriptor in order
//! - `BuildEnv`: the explicit build environment shared across the chain
//! - `check`: verification of an existing installation
//! - `runner`: parallel fastStructure runs over a K range and model choice

pub mod check;
pub mod consts;
pub mod env;
pub mod execute;
pub mod fetch;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod placeholder;
pub mod platform;
pub mod prefix_lock;
pub mod provision;
pub mod receipt;
pub mod runner;
pub mod unpack;
pub mod util;
