//! Blob storage for resource bundles and page content.
//!
//! Every backend speaks the same small [`StorageBackend`] contract over
//! root-relative paths. [`BackendFactory`] turns a type tag plus a JSON
//! configuration map into a [`BackendHandle`], and [`BlockingBackend`] drives
//! any handle from synchronous code.

pub mod backend;
mod blocking;
pub mod error;
mod factory;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::blocking::BlockingBackend;
pub use crate::factory::{BackendFactory, BackendKind};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
