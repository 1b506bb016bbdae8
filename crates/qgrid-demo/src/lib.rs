#![forbid(unsafe_code)]

//! Headless driver for qgrid.
//!
//! # Role in qgrid
//! `qgrid-demo` is the quickest way to watch a row window work end to end.
//! It runs one sample query against the in-process mock backend, replays a
//! scripted sequence of visible ranges and prints what ended up loaded.
//!
//! # How it fits in the system
//! The driver is a consumer of every other crate: it takes its config from
//! `qgrid-core`, browses through a `qgrid-window` session and fetches from
//! `qgrid-mock`. Integration tests call [`run::run_with_config`] directly.

pub mod cli;
pub mod format;
pub mod run;
