//! Memory-image record shapes and the export image container
//!
//! One layout static per primitive kind, all embedding the shared
//! `Primitive` prefix at offset zero so generic passes can reach the kind
//! tag, name, and parent of any record through one set of descriptors. The
//! root `DatabaseMem` record sits at arena offset zero and owns every flat
//! record array, the two text blobs, the type-primitive lookup array, and
//! the embedded unnamed global namespace.

use crate::arena::Arena;
use crate::layout::{
    array_elem, FieldArray, FieldF64, FieldI32, FieldRef, FieldU32, FieldU64, Layout,
    LayoutBuilder, NameField,
};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// Number of type-argument slots in a template instantiation record.
pub const MAX_TEMPLATE_ARGS: usize = reflectdb_core::MAX_TEMPLATE_ARGS;

/// Kind tag stored in the first word of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Kind {
    /// Unset; only the zero-initialized root carries it before setup.
    None = 0,
    /// Plain type.
    Type = 1,
    /// Class.
    Class = 2,
    /// Enumeration.
    Enum = 3,
    /// Enum constant.
    EnumConstant = 4,
    /// Field or function parameter.
    Field = 5,
    /// Function or method.
    Function = 6,
    /// Template.
    Template = 7,
    /// Template instantiation.
    TemplateType = 8,
    /// Namespace.
    Namespace = 9,
    /// Attribute without payload.
    FlagAttribute = 10,
    /// Integer attribute.
    IntAttribute = 11,
    /// Floating-point attribute.
    FloatAttribute = 12,
    /// Name-valued attribute.
    NameAttribute = 13,
    /// Text attribute.
    TextAttribute = 14,
}

/// Shared prefix of every record: kind tag, name, owning parent.
pub struct PrimitiveLayout {
    /// Kind tag.
    pub kind: FieldU32,
    /// Name hash and text reference.
    pub name: NameField,
    /// Owning parent reference.
    pub parent: FieldRef,
    /// Record shape.
    pub layout: Layout,
}

/// The `Primitive` record shape.
pub static PRIMITIVE: Lazy<PrimitiveLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Primitive");
    let kind = b.u32();
    let name = b.name_field();
    let parent = b.reference();
    PrimitiveLayout {
        kind,
        name,
        parent,
        layout: b.finish(),
    }
});

/// A standalone name-table entry.
pub struct NameLayout {
    /// Name hash.
    pub hash: FieldU32,
    /// Reference to the null-terminated text.
    pub text: FieldRef,
    /// Record shape.
    pub layout: Layout,
}

/// The `Name` record shape.
pub static NAME: Lazy<NameLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Name");
    let name = b.name_field();
    NameLayout {
        hash: name.hash,
        text: name.text,
        layout: b.finish(),
    }
});

/// A plain type: primitive prefix plus byte size.
pub struct TypeLayout {
    /// Byte size of the described type.
    pub size: FieldU32,
    /// Record shape.
    pub layout: Layout,
}

/// The `Type` record shape.
pub static TYPE: Lazy<TypeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Type");
    b.embed(&PRIMITIVE.layout);
    let size = b.u32();
    TypeLayout {
        size,
        layout: b.finish(),
    }
});

/// An enum constant: primitive prefix plus value.
pub struct EnumConstantLayout {
    /// Constant value.
    pub value: FieldI32,
    /// Record shape.
    pub layout: Layout,
}

/// The `EnumConstant` record shape.
pub static ENUM_CONSTANT: Lazy<EnumConstantLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("EnumConstant");
    b.embed(&PRIMITIVE.layout);
    let value = b.i32();
    EnumConstantLayout {
        value,
        layout: b.finish(),
    }
});

/// An enumeration: type prefix plus constants and attributes.
pub struct EnumLayout {
    /// Owned constants, sorted by name hash after the sort pass.
    pub constants: FieldArray,
    /// Owned attributes.
    pub attributes: FieldArray,
    /// Record shape.
    pub layout: Layout,
}

/// The `Enum` record shape.
pub static ENUM: Lazy<EnumLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Enum");
    b.embed(&TYPE.layout);
    let constants = b.array();
    let attributes = b.array();
    EnumLayout {
        constants,
        attributes,
        layout: b.finish(),
    }
});

/// A field or function parameter.
pub struct FieldLayout {
    /// Declared type reference.
    pub ty: FieldRef,
    /// Modifier tag: 0 value, 1 pointer, 2 reference.
    pub modifier: FieldU32,
    /// Const qualification, 0 or 1.
    pub is_const: FieldU32,
    /// Struct byte offset, or parameter ordinal.
    pub offset: FieldU32,
    /// Owning-function correlation id.
    pub parent_unique_id: FieldU32,
    /// Owned attributes.
    pub attributes: FieldArray,
    /// Record shape.
    pub layout: Layout,
}

/// The `Field` record shape.
pub static FIELD: Lazy<FieldLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Field");
    b.embed(&PRIMITIVE.layout);
    let ty = b.reference();
    let modifier = b.u32();
    let is_const = b.u32();
    let offset = b.u32();
    let parent_unique_id = b.u32();
    let attributes = b.array();
    FieldLayout {
        ty,
        modifier,
        is_const,
        offset,
        parent_unique_id,
        attributes,
        layout: b.finish(),
    }
});

/// A function or method.
pub struct FunctionLayout {
    /// Extracted return pseudo-parameter, if any.
    pub return_parameter: FieldRef,
    /// Owned ordinal parameters.
    pub parameters: FieldArray,
    /// Owned attributes.
    pub attributes: FieldArray,
    /// Runtime entry-point address, 0 when not callable.
    pub address: FieldU64,
    /// Process-wide unique id.
    pub unique_id: FieldU32,
    /// Record shape.
    pub layout: Layout,
}

/// The `Function` record shape.
pub static FUNCTION: Lazy<FunctionLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Function");
    b.embed(&PRIMITIVE.layout);
    let return_parameter = b.reference();
    let parameters = b.array();
    let attributes = b.array();
    let address = b.u64();
    let unique_id = b.u32();
    FunctionLayout {
        return_parameter,
        parameters,
        attributes,
        address,
        unique_id,
        layout: b.finish(),
    }
});

/// A class: type prefix, base class, discovered constructor/destructor, and
/// six owned child arrays.
pub struct ClassLayout {
    /// Base class reference.
    pub base_class: FieldRef,
    /// Constructor method, discovered by name convention.
    pub constructor: FieldRef,
    /// Destructor method, discovered by name convention.
    pub destructor: FieldRef,
    /// Nested enums.
    pub enums: FieldArray,
    /// Nested classes.
    pub classes: FieldArray,
    /// Methods.
    pub methods: FieldArray,
    /// Data members.
    pub fields: FieldArray,
    /// Owned attributes.
    pub attributes: FieldArray,
    /// Nested template instantiations.
    pub templates: FieldArray,
    /// Record shape.
    pub layout: Layout,
}

/// The `Class` record shape.
pub static CLASS: Lazy<ClassLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Class");
    b.embed(&TYPE.layout);
    let base_class = b.reference();
    let constructor = b.reference();
    let destructor = b.reference();
    let enums = b.array();
    let classes = b.array();
    let methods = b.array();
    let fields = b.array();
    let attributes = b.array();
    let templates = b.array();
    ClassLayout {
        base_class,
        constructor,
        destructor,
        enums,
        classes,
        methods,
        fields,
        attributes,
        templates,
        layout: b.finish(),
    }
});

/// A template: primitive prefix plus instantiations.
pub struct TemplateLayout {
    /// Owned instantiations.
    pub instances: FieldArray,
    /// Record shape.
    pub layout: Layout,
}

/// The `Template` record shape.
pub static TEMPLATE: Lazy<TemplateLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Template");
    b.embed(&PRIMITIVE.layout);
    let instances = b.array();
    TemplateLayout {
        instances,
        layout: b.finish(),
    }
});

/// A template instantiation: type prefix plus fixed argument slots.
pub struct TemplateTypeLayout {
    /// Type-argument references.
    pub parameter_types: [FieldRef; MAX_TEMPLATE_ARGS],
    /// Per-slot is-pointer flags.
    pub parameter_ptrs: [FieldU32; MAX_TEMPLATE_ARGS],
    /// Record shape.
    pub layout: Layout,
}

/// The `TemplateType` record shape.
pub static TEMPLATE_TYPE: Lazy<TemplateTypeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("TemplateType");
    b.embed(&TYPE.layout);
    let parameter_types = [b.reference(), b.reference(), b.reference(), b.reference()];
    let parameter_ptrs = [b.u32(), b.u32(), b.u32(), b.u32()];
    TemplateTypeLayout {
        parameter_types,
        parameter_ptrs,
        layout: b.finish(),
    }
});

/// A namespace with its six owned child arrays.
pub struct NamespaceLayout {
    /// Nested namespaces.
    pub namespaces: FieldArray,
    /// Plain types.
    pub types: FieldArray,
    /// Enums.
    pub enums: FieldArray,
    /// Classes.
    pub classes: FieldArray,
    /// Functions.
    pub functions: FieldArray,
    /// Templates.
    pub templates: FieldArray,
    /// Record shape.
    pub layout: Layout,
}

/// The `Namespace` record shape.
pub static NAMESPACE: Lazy<NamespaceLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("Namespace");
    b.embed(&PRIMITIVE.layout);
    let namespaces = b.array();
    let types = b.array();
    let enums = b.array();
    let classes = b.array();
    let functions = b.array();
    let templates = b.array();
    NamespaceLayout {
        namespaces,
        types,
        enums,
        classes,
        functions,
        templates,
        layout: b.finish(),
    }
});

/// An integer attribute.
pub struct IntAttributeLayout {
    /// Attribute value.
    pub value: FieldI32,
    /// Record shape.
    pub layout: Layout,
}

/// The `IntAttribute` record shape.
pub static INT_ATTRIBUTE: Lazy<IntAttributeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("IntAttribute");
    b.embed(&PRIMITIVE.layout);
    let value = b.i32();
    IntAttributeLayout {
        value,
        layout: b.finish(),
    }
});

/// A floating-point attribute.
pub struct FloatAttributeLayout {
    /// Attribute value.
    pub value: FieldF64,
    /// Record shape.
    pub layout: Layout,
}

/// The `FloatAttribute` record shape.
pub static FLOAT_ATTRIBUTE: Lazy<FloatAttributeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("FloatAttribute");
    b.embed(&PRIMITIVE.layout);
    let value = b.f64();
    FloatAttributeLayout {
        value,
        layout: b.finish(),
    }
});

/// A name-valued attribute.
pub struct NameAttributeLayout {
    /// Value name: hash plus deferred text reference.
    pub value: NameField,
    /// Record shape.
    pub layout: Layout,
}

/// The `NameAttribute` record shape.
pub static NAME_ATTRIBUTE: Lazy<NameAttributeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("NameAttribute");
    b.embed(&PRIMITIVE.layout);
    let value = b.name_field();
    NameAttributeLayout {
        value,
        layout: b.finish(),
    }
});

/// A text attribute.
pub struct TextAttributeLayout {
    /// Reference into the attribute text blob.
    pub value: FieldRef,
    /// Record shape.
    pub layout: Layout,
}

/// The `TextAttribute` record shape.
pub static TEXT_ATTRIBUTE: Lazy<TextAttributeLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("TextAttribute");
    b.embed(&PRIMITIVE.layout);
    let value = b.reference();
    TextAttributeLayout {
        value,
        layout: b.finish(),
    }
});

/// The root record owning everything in the image.
pub struct DatabaseLayout {
    /// Name text blob.
    pub name_text_data: FieldRef,
    /// Binary-searchable name table.
    pub names: FieldArray,
    /// Flat record arrays, one per kind.
    pub types: FieldArray,
    /// Enum constants.
    pub enum_constants: FieldArray,
    /// Enums.
    pub enums: FieldArray,
    /// Fields.
    pub fields: FieldArray,
    /// Functions.
    pub functions: FieldArray,
    /// Classes.
    pub classes: FieldArray,
    /// Templates.
    pub templates: FieldArray,
    /// Template instantiations.
    pub template_types: FieldArray,
    /// Namespaces.
    pub namespaces: FieldArray,
    /// Attribute text blob.
    pub text_attribute_data: FieldRef,
    /// Flag attributes.
    pub flag_attributes: FieldArray,
    /// Integer attributes.
    pub int_attributes: FieldArray,
    /// Floating-point attributes.
    pub float_attributes: FieldArray,
    /// Name-valued attributes.
    pub name_attributes: FieldArray,
    /// Text attributes.
    pub text_attributes: FieldArray,
    /// References to every type-kind record, for type lookups.
    pub type_primitives: FieldArray,
    /// Offset of the embedded unnamed global namespace record.
    pub global_namespace: u64,
    /// Record shape (includes the embedded namespace's pointer offsets).
    pub layout: Layout,
}

/// The `DatabaseMem` record shape.
pub static DATABASE: Lazy<DatabaseLayout> = Lazy::new(|| {
    let mut b = LayoutBuilder::new("DatabaseMem");
    let name_text_data = b.reference();
    let names = b.array();
    let types = b.array();
    let enum_constants = b.array();
    let enums = b.array();
    let fields = b.array();
    let functions = b.array();
    let classes = b.array();
    let templates = b.array();
    let template_types = b.array();
    let namespaces = b.array();
    let text_attribute_data = b.reference();
    let flag_attributes = b.array();
    let int_attributes = b.array();
    let float_attributes = b.array();
    let name_attributes = b.array();
    let text_attributes = b.array();
    let type_primitives = b.array();
    let global_namespace = b.embed(&NAMESPACE.layout);
    DatabaseLayout {
        name_text_data,
        names,
        types,
        enum_constants,
        enums,
        fields,
        functions,
        classes,
        templates,
        template_types,
        namespaces,
        text_attribute_data,
        flag_attributes,
        int_attributes,
        float_attributes,
        name_attributes,
        text_attributes,
        type_primitives,
        global_namespace,
        layout: b.finish(),
    }
});

/// A contiguous run of same-shaped records inside the arena.
#[derive(Debug, Clone, Copy)]
pub struct Run {
    /// Offset of the first record.
    pub off: u64,
    /// Record count.
    pub count: u32,
    /// Record stride in bytes.
    pub stride: u64,
}

impl Run {
    /// An empty run.
    pub fn empty() -> Self {
        Run {
            off: 0,
            count: 0,
            stride: 0,
        }
    }

    /// Iterate over the record offsets.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let off = self.off;
        let stride = self.stride;
        (0..self.count as u64).map(move |i| off + i * stride)
    }

    /// Whether `addr` is the offset of one of this run's records.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.off
            && addr < self.off + self.count as u64 * self.stride
            && (addr - self.off) % self.stride == 0
    }
}

/// The in-progress export image: the arena plus build-side lookup state.
pub struct DatabaseImage {
    /// The arena holding the whole memory image; the root record is at
    /// offset zero.
    pub arena: Arena,
    /// Interned hash to text-blob offset, used by linking diagnostics and
    /// attribute fix-up.
    pub name_map: FxHashMap<u32, u64>,
    /// Offsets of every type-kind record in gather order (Type, Class,
    /// Enum, TemplateType), the link target list.
    pub type_primitives: Vec<u64>,
}

impl DatabaseImage {
    /// Allocate an image containing only the zeroed root record.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(DATABASE.layout.size, 8);
        debug_assert_eq!(root, 0);
        // The embedded global namespace is a real record; give it its tag.
        PRIMITIVE
            .kind
            .set(&mut arena, DATABASE.global_namespace, Kind::Namespace as u32);
        Self {
            arena,
            name_map: FxHashMap::default(),
            type_primitives: Vec::new(),
        }
    }

    /// Offset of the embedded global namespace record.
    pub fn global_namespace(&self) -> u64 {
        DATABASE.global_namespace
    }

    /// Read a flat record run out of a root array field.
    pub fn run(&self, field: FieldArray, stride: u64) -> Run {
        let (data, len) = field.get(&self.arena, 0);
        match data.addr() {
            Some(off) if len > 0 => Run {
                off,
                count: len,
                stride,
            },
            _ => Run::empty(),
        }
    }

    /// The flat run for a record kind.
    pub fn kind_run(&self, kind: Kind) -> Run {
        match kind {
            Kind::Type => self.run(DATABASE.types, TYPE.layout.size),
            Kind::EnumConstant => self.run(DATABASE.enum_constants, ENUM_CONSTANT.layout.size),
            Kind::Enum => self.run(DATABASE.enums, ENUM.layout.size),
            Kind::Field => self.run(DATABASE.fields, FIELD.layout.size),
            Kind::Function => self.run(DATABASE.functions, FUNCTION.layout.size),
            Kind::Class => self.run(DATABASE.classes, CLASS.layout.size),
            Kind::Template => self.run(DATABASE.templates, TEMPLATE.layout.size),
            Kind::TemplateType => self.run(DATABASE.template_types, TEMPLATE_TYPE.layout.size),
            Kind::Namespace => self.run(DATABASE.namespaces, NAMESPACE.layout.size),
            Kind::FlagAttribute => self.run(DATABASE.flag_attributes, PRIMITIVE.layout.size),
            Kind::IntAttribute => self.run(DATABASE.int_attributes, INT_ATTRIBUTE.layout.size),
            Kind::FloatAttribute => {
                self.run(DATABASE.float_attributes, FLOAT_ATTRIBUTE.layout.size)
            }
            Kind::NameAttribute => self.run(DATABASE.name_attributes, NAME_ATTRIBUTE.layout.size),
            Kind::TextAttribute => self.run(DATABASE.text_attributes, TEXT_ATTRIBUTE.layout.size),
            Kind::None => Run::empty(),
        }
    }

    /// The name text for a record, read through its embedded name reference.
    pub fn record_name(&self, record: u64) -> String {
        match PRIMITIVE.name.text.get(&self.arena, record) {
            crate::layout::Ref::Addr(text) => self.arena.read_cstr(text),
            _ => String::new(),
        }
    }
}

impl Default for DatabaseImage {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary-search a hash-sorted child array for a record with `hash`,
/// returning its offset.
pub fn find_in_sorted(arena: &Arena, data: u64, len: u32, hash: u32) -> Option<u64> {
    let mut lo = 0u32;
    let mut hi = len;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let target = array_elem(arena, data, mid).addr()?;
        let target_hash = PRIMITIVE.name.hash.get(arena, target);
        if target_hash < hash {
            lo = mid + 1;
        } else if target_hash > hash {
            hi = mid;
        } else {
            return Some(target);
        }
    }
    None
}
