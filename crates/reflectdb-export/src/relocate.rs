//! Pointer schema registry and relocation table
//!
//! The emitted blob stores references as offsets from the start of the data
//! image. So a consumer can rebase them after mapping the file, the exporter
//! records where every reference lives: one schema per record shape listing
//! its reference offsets, and one relocation entry per contiguous run of
//! records sharing a schema.

use crate::arena::Arena;
use crate::image::{
    DatabaseImage, Kind, CLASS, DATABASE, ENUM, ENUM_CONSTANT, FIELD, FLOAT_ATTRIBUTE, FUNCTION,
    INT_ATTRIBUTE, NAME, NAMESPACE, NAME_ATTRIBUTE, PRIMITIVE, TEMPLATE, TEMPLATE_TYPE,
    TEXT_ATTRIBUTE, TYPE,
};
use crate::layout::{FieldArray, Layout, Ref, ARRAY_ELEM_SIZE};

/// Index of a registered schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaHandle(pub u32);

/// The reference positions of one record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtrSchema {
    /// Record stride in bytes.
    pub stride: u64,
    /// Byte offsets of every reference cell within one record.
    pub ptr_offsets: Vec<u64>,
}

/// One run of records whose references need rebasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtrRelocation {
    /// Schema describing each record in the run.
    pub schema: SchemaHandle,
    /// Offset of the first record.
    pub offset: u64,
    /// Number of records in the run.
    pub nb_objects: u32,
}

/// Registry of schemas and relocations for one image.
#[derive(Debug, Default)]
pub struct PtrRelocator {
    schemas: Vec<PtrSchema>,
    relocations: Vec<PtrRelocation>,
}

impl PtrRelocator {
    /// Create an empty relocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record shape's schema.
    pub fn add_schema(&mut self, layout: &Layout) -> SchemaHandle {
        self.add_raw_schema(layout.size, layout.ptr_offsets.clone())
    }

    /// Register a schema that no layout describes, such as the bare
    /// reference cells of a child array.
    pub fn add_raw_schema(&mut self, stride: u64, ptr_offsets: Vec<u64>) -> SchemaHandle {
        let handle = SchemaHandle(self.schemas.len() as u32);
        self.schemas.push(PtrSchema {
            stride,
            ptr_offsets,
        });
        handle
    }

    /// Record that `nb_objects` records of `schema` live at `offset`.
    pub fn add_pointers(&mut self, schema: SchemaHandle, offset: u64, nb_objects: u32) {
        if nb_objects == 0 {
            return;
        }
        self.relocations.push(PtrRelocation {
            schema,
            offset,
            nb_objects,
        });
    }

    /// The registered schemas, indexed by handle.
    pub fn schemas(&self) -> &[PtrSchema] {
        &self.schemas
    }

    /// The recorded relocations.
    pub fn relocations(&self) -> &[PtrRelocation] {
        &self.relocations
    }

    /// Total number of reference offsets across all schemas.
    pub fn nb_ptr_offsets(&self) -> usize {
        self.schemas.iter().map(|s| s.ptr_offsets.len()).sum()
    }

    /// Normalize every registered reference cell to its on-disk form:
    /// resolved cells keep their offset, null stays zero, and unresolved
    /// cells degrade to their bare hash.
    pub fn make_relative(&self, arena: &mut Arena) {
        for reloc in &self.relocations {
            let schema = &self.schemas[reloc.schema.0 as usize];
            for i in 0..reloc.nb_objects as u64 {
                let base = reloc.offset + i * schema.stride;
                for &ptr_offset in &schema.ptr_offsets {
                    let bits = arena.read_u64(base + ptr_offset);
                    arena.write_u64(base + ptr_offset, Ref::from_bits(bits).to_wire());
                }
            }
        }
    }
}

fn add_child_array(
    relocator: &mut PtrRelocator,
    arena: &Arena,
    ptr_schema: SchemaHandle,
    record: u64,
    array: FieldArray,
) {
    let (data, len) = array.get(arena, record);
    if let Some(data) = data.addr() {
        relocator.add_pointers(ptr_schema, data, len);
    }
}

/// Register every record run and child array of the finished image.
pub fn build_relocator(image: &DatabaseImage) -> PtrRelocator {
    let mut relocator = PtrRelocator::new();
    let arena = &image.arena;

    let schema_database = relocator.add_schema(&DATABASE.layout);
    let schema_name = relocator.add_schema(&NAME.layout);
    let schema_primitive = relocator.add_schema(&PRIMITIVE.layout);
    let schema_type = relocator.add_schema(&TYPE.layout);
    let schema_enum_constant = relocator.add_schema(&ENUM_CONSTANT.layout);
    let schema_enum = relocator.add_schema(&ENUM.layout);
    let schema_field = relocator.add_schema(&FIELD.layout);
    let schema_function = relocator.add_schema(&FUNCTION.layout);
    let schema_class = relocator.add_schema(&CLASS.layout);
    let schema_template = relocator.add_schema(&TEMPLATE.layout);
    let schema_template_type = relocator.add_schema(&TEMPLATE_TYPE.layout);
    let schema_namespace = relocator.add_schema(&NAMESPACE.layout);
    let schema_int_attribute = relocator.add_schema(&INT_ATTRIBUTE.layout);
    let schema_float_attribute = relocator.add_schema(&FLOAT_ATTRIBUTE.layout);
    let schema_name_attribute = relocator.add_schema(&NAME_ATTRIBUTE.layout);
    let schema_text_attribute = relocator.add_schema(&TEXT_ATTRIBUTE.layout);
    // Child arrays are bare reference cells.
    let schema_ptr = relocator.add_raw_schema(ARRAY_ELEM_SIZE, vec![0]);

    // The root record, including the embedded global namespace.
    relocator.add_pointers(schema_database, 0, 1);

    let (names, nb_names) = DATABASE.names.get(arena, 0);
    if let Some(names) = names.addr() {
        relocator.add_pointers(schema_name, names, nb_names);
    }

    let kind_schemas = [
        (Kind::Type, schema_type),
        (Kind::EnumConstant, schema_enum_constant),
        (Kind::Enum, schema_enum),
        (Kind::Field, schema_field),
        (Kind::Function, schema_function),
        (Kind::Class, schema_class),
        (Kind::Template, schema_template),
        (Kind::TemplateType, schema_template_type),
        (Kind::Namespace, schema_namespace),
        (Kind::FlagAttribute, schema_primitive),
        (Kind::IntAttribute, schema_int_attribute),
        (Kind::FloatAttribute, schema_float_attribute),
        (Kind::NameAttribute, schema_name_attribute),
        (Kind::TextAttribute, schema_text_attribute),
    ];
    for (kind, schema) in kind_schemas {
        let run = image.kind_run(kind);
        if run.count > 0 {
            relocator.add_pointers(schema, run.off, run.count);
        }
    }

    let (types, nb_types) = DATABASE.type_primitives.get(arena, 0);
    if let Some(types) = types.addr() {
        relocator.add_pointers(schema_ptr, types, nb_types);
    }

    for en in image.kind_run(Kind::Enum).iter() {
        add_child_array(&mut relocator, arena, schema_ptr, en, ENUM.constants);
        add_child_array(&mut relocator, arena, schema_ptr, en, ENUM.attributes);
    }
    for field in image.kind_run(Kind::Field).iter() {
        add_child_array(&mut relocator, arena, schema_ptr, field, FIELD.attributes);
    }
    for func in image.kind_run(Kind::Function).iter() {
        add_child_array(&mut relocator, arena, schema_ptr, func, FUNCTION.parameters);
        add_child_array(&mut relocator, arena, schema_ptr, func, FUNCTION.attributes);
    }
    for cls in image.kind_run(Kind::Class).iter() {
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.enums);
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.classes);
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.methods);
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.fields);
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.attributes);
        add_child_array(&mut relocator, arena, schema_ptr, cls, CLASS.templates);
    }
    for tpl in image.kind_run(Kind::Template).iter() {
        add_child_array(&mut relocator, arena, schema_ptr, tpl, TEMPLATE.instances);
    }
    let global = image.global_namespace();
    let mut namespaces: Vec<u64> = image.kind_run(Kind::Namespace).iter().collect();
    namespaces.push(global);
    for ns in namespaces {
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.namespaces);
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.types);
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.enums);
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.classes);
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.functions);
        add_child_array(&mut relocator, arena, schema_ptr, ns, NAMESPACE.templates);
    }

    relocator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutBuilder;

    #[test]
    fn test_make_relative_normalizes_cells() {
        let mut b = LayoutBuilder::new("rec");
        let link = b.reference();
        let layout = b.finish();

        let mut arena = Arena::new();
        arena.alloc(8, 8); // keep record offsets nonzero
        let run = arena.alloc_array(layout.size, 3);
        link.set(&mut arena, run, Ref::Addr(run));
        link.set(&mut arena, run + layout.size, Ref::Unresolved(0x1234));
        link.set(&mut arena, run + 2 * layout.size, Ref::Null);

        let mut relocator = PtrRelocator::new();
        let schema = relocator.add_schema(&layout);
        relocator.add_pointers(schema, run, 3);
        relocator.make_relative(&mut arena);

        assert_eq!(arena.read_u64(run), run);
        assert_eq!(arena.read_u64(run + layout.size), 0x1234);
        assert_eq!(arena.read_u64(run + 2 * layout.size), 0);
    }

    #[test]
    fn test_empty_runs_are_not_recorded() {
        let mut relocator = PtrRelocator::new();
        let schema = relocator.add_raw_schema(8, vec![0]);
        relocator.add_pointers(schema, 64, 0);
        assert!(relocator.relocations().is_empty());
    }

    #[test]
    fn test_build_relocator_covers_all_runs() {
        use crate::copy::{copy_database, gather_type_primitives};
        use crate::names::build_names;
        use reflectdb_core::{Database, Type};

        let mut db = Database::new();
        let int = db.add_name("int");
        db.types.push(Type {
            name: int,
            parent: 0,
            size: 4,
        });
        let mut image = DatabaseImage::new();
        build_names(&mut image, &db);
        copy_database(&mut image, &db);
        gather_type_primitives(&mut image);

        let relocator = build_relocator(&image);
        // Root, names, types run, type_primitives run.
        assert_eq!(relocator.relocations().len(), 4);
        let types = image.kind_run(Kind::Type);
        assert!(relocator
            .relocations()
            .iter()
            .any(|r| r.offset == types.off && r.nb_objects == 1));
    }
}
