//! Source reflection-database model for reflectdb
//!
//! This crate defines the hash-linked, pointer-free database produced by the
//! upstream source-analysis step. Primitives reference each other purely by
//! 32-bit name hashes; the exporter (`reflectdb-export`) reconstructs the
//! object graph and lays it out as a relocatable binary blob.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod db;
pub mod name;

pub use db::{
    Class, Database, Enum, EnumConstant, Field, FlagAttribute, FloatAttribute, Function,
    IntAttribute, Modifier, NameAttribute, Namespace, Template, TemplateType, TextAttribute, Type,
    MAX_TEMPLATE_ARGS,
};
pub use name::hash_name;
