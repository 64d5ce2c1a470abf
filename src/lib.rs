//! Core library for the wycennik command line application.
//!
//! The library keeps a cost estimate in memory and persists it to xlsx files
//! confined to one directory tree. The modules keep responsibilities narrow:
//! the table and its line items live in [`model`], spreadsheet reading and
//! writing in [`io`], path confinement in [`path_guard`], file management in
//! [`files`], and the interactive loop in [`session`].

pub mod config;
pub mod error;
pub mod files;
pub mod io;
pub mod logging;
pub mod model;
pub mod path_guard;
pub mod session;

pub use error::{ErrorKind, EstimateError, Result};
