//! End-to-end CLI tests against a local HTTP server.
//!
//! Build steps run through `/bin/sh`, so these only run on Unix.

#![cfg(unix)]

mod common;
mod fetch_tests;
mod install_tests;
mod run_tests;
