//! The hash-linked source database
//!
//! Primitives are stored in flat per-kind lists in the order the producer
//! emitted them (typically declaration order). Ownership and cross-references
//! are expressed as name hashes only: a primitive's `parent` is the hash of
//! its owner's name, a field's `ty` is the hash of the declared type's name,
//! and so on. Hash value `0` always means "none".

use crate::name::hash_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of type arguments recorded for a template instantiation.
pub const MAX_TEMPLATE_ARGS: usize = 4;

/// Field modifier: how the declared type is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// Held by value.
    #[default]
    Value,
    /// Held through a pointer.
    Pointer,
    /// Held through a reference.
    Reference,
}

/// A named type with a byte size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` if unparented.
    #[serde(default)]
    pub parent: u32,
    /// Byte size of the type.
    pub size: u32,
}

/// A single enum constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumConstant {
    /// Name hash.
    pub name: u32,
    /// Owning enum name hash.
    #[serde(default)]
    pub parent: u32,
    /// Constant value.
    pub value: i32,
}

/// An enumeration type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enum {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` if unparented.
    #[serde(default)]
    pub parent: u32,
    /// Byte size of the underlying type.
    pub size: u32,
}

/// A data member of a class, or a function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Name hash.
    pub name: u32,
    /// Owner name hash (class or function).
    #[serde(default)]
    pub parent: u32,
    /// Declared type name hash.
    pub ty: u32,
    /// How the type is held.
    #[serde(default)]
    pub modifier: Modifier,
    /// Const qualification.
    #[serde(default)]
    pub is_const: bool,
    /// Byte offset within the owning struct, or the parameter ordinal when
    /// the field is a function parameter.
    #[serde(default)]
    pub offset: u32,
    /// Unique id of the owning function, disambiguating parameter ownership
    /// between overloads that share a name hash. `0` for struct members.
    #[serde(default)]
    pub parent_unique_id: u32,
}

/// A free function or class method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` if unparented.
    #[serde(default)]
    pub parent: u32,
    /// Runtime entry-point address, `0` when the function is not a callable
    /// export.
    #[serde(default)]
    pub address: u64,
    /// Process-wide unique id, referenced by parameter fields.
    pub unique_id: u32,
}

/// A class or struct type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` if unparented.
    #[serde(default)]
    pub parent: u32,
    /// Byte size of the class.
    pub size: u32,
    /// Base class name hash, `0` if the class has no base.
    #[serde(default)]
    pub base_class: u32,
}

/// A class or function template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` if unparented.
    #[serde(default)]
    pub parent: u32,
}

/// A concrete template instantiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateType {
    /// Name hash.
    pub name: u32,
    /// Owning template name hash.
    #[serde(default)]
    pub parent: u32,
    /// Byte size of the instantiated type.
    pub size: u32,
    /// Name hashes of the type arguments; `0` marks unused slots.
    #[serde(default)]
    pub parameter_types: [u32; MAX_TEMPLATE_ARGS],
    /// Whether each argument slot is a pointer to its type.
    #[serde(default)]
    pub parameter_ptrs: [bool; MAX_TEMPLATE_ARGS],
}

/// A namespace scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    /// Name hash.
    pub name: u32,
    /// Owner name hash, `0` for top-level namespaces.
    #[serde(default)]
    pub parent: u32,
}

/// An attribute with no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagAttribute {
    /// Name hash.
    pub name: u32,
    /// Owner name hash.
    #[serde(default)]
    pub parent: u32,
}

/// An attribute carrying an integer value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntAttribute {
    /// Name hash.
    pub name: u32,
    /// Owner name hash.
    #[serde(default)]
    pub parent: u32,
    /// Attribute value.
    pub value: i32,
}

/// An attribute carrying a floating-point value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatAttribute {
    /// Name hash.
    pub name: u32,
    /// Owner name hash.
    #[serde(default)]
    pub parent: u32,
    /// Attribute value.
    pub value: f64,
}

/// An attribute whose value is another registered name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAttribute {
    /// Name hash.
    pub name: u32,
    /// Owner name hash.
    #[serde(default)]
    pub parent: u32,
    /// Hash of the value name.
    pub value: u32,
}

/// An attribute carrying free-form text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAttribute {
    /// Name hash.
    pub name: u32,
    /// Owner name hash.
    #[serde(default)]
    pub parent: u32,
    /// Attribute text.
    pub value: String,
}

/// The complete source database handed over by the producer.
///
/// `names` maps every registered hash to its text; iteration order is
/// ascending by hash, which the exporter relies on when emitting its
/// binary-searchable name table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    /// Every registered name, keyed by hash.
    #[serde(default)]
    pub names: BTreeMap<u32, String>,
    /// Plain types.
    #[serde(default)]
    pub types: Vec<Type>,
    /// Enum constants.
    #[serde(default)]
    pub enum_constants: Vec<EnumConstant>,
    /// Enumerations.
    #[serde(default)]
    pub enums: Vec<Enum>,
    /// Fields and function parameters.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Functions and methods.
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Classes.
    #[serde(default)]
    pub classes: Vec<Class>,
    /// Templates.
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Template instantiations.
    #[serde(default)]
    pub template_types: Vec<TemplateType>,
    /// Namespaces.
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    /// Flag attributes.
    #[serde(default)]
    pub flag_attributes: Vec<FlagAttribute>,
    /// Integer attributes.
    #[serde(default)]
    pub int_attributes: Vec<IntAttribute>,
    /// Floating-point attributes.
    #[serde(default)]
    pub float_attributes: Vec<FloatAttribute>,
    /// Name-valued attributes.
    #[serde(default)]
    pub name_attributes: Vec<NameAttribute>,
    /// Text attributes.
    #[serde(default)]
    pub text_attributes: Vec<TextAttribute>,
}

impl Database {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name, returning its hash.
    ///
    /// Re-registering the same text is a no-op that returns the same hash.
    pub fn add_name(&mut self, text: &str) -> u32 {
        let hash = hash_name(text);
        self.names.entry(hash).or_insert_with(|| text.to_string());
        hash
    }

    /// Resolve a hash back to its registered text.
    pub fn name_text(&self, hash: u32) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    /// Parse a database from its JSON interchange form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize the database to its JSON interchange form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
