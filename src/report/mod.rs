//! Renderers for the outcome of an identification run.
//!
//! - [`terminal`]: summary box plus tables of identifications and skipped files;
//!   respects `--verbose` / `--quiet`.
//! - [`json`]: the same data as a single JSON document on stdout.

pub mod json;
pub mod terminal;
