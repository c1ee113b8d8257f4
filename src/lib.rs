//! `license-autoid`: confirm pending code matches on a code-inspection server.
//!
//! The [`engine`] walks a project's code tree through a [`client::RemoteTreeMatchClient`],
//! picks the best pending match for each file and hands it to an
//! [`strategy::IdentificationStrategy`], keeping an [`audit::IdentificationLog`]
//! of everything it recorded.

pub mod audit;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod strategy;
