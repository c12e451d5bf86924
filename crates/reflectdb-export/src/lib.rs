//! Relocatable binary export of a reflectdb source database
//!
//! The source database links primitives by name hash; this crate lowers it
//! into a single contiguous memory image whose cross-references are offsets
//! from the image base, then wraps that image in a blob carrying the schema
//! and relocation tables a consumer needs to rebase it after mapping.
//!
//! The pipeline is [`export::export`] (build and verify the image),
//! optionally [`dump::dump_text`], then [`export::save`] or
//! [`export::save_to_file`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod arena;
pub mod copy;
pub mod dump;
pub mod export;
pub mod finish;
pub mod format;
pub mod hierarchy;
pub mod image;
pub mod layout;
pub mod names;
pub mod relocate;
pub mod verify;

pub use dump::{dump_text, dump_to_file};
pub use export::{export, save, save_to_file, ExportError};
pub use format::{decode_blob, FormatError, LoadedBlob};
pub use image::DatabaseImage;
pub use verify::{Unresolved, VerifyReport};
