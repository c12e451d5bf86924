//! The export driver
//!
//! Runs the fixed pass pipeline over a source database: copy, parent, link,
//! finish, verify. Pass order matters; each stage assumes the resolution
//! state the previous one left behind.

use crate::copy::{copy_database, gather_type_primitives};
use crate::finish::{
    assign_return_parameters, build_global_namespace, find_class_constructors, sort_primitives,
};
use crate::format::encode_blob;
use crate::hierarchy::{any_parent, build_link_map, link_references, parent_children};
use crate::image::{
    DatabaseImage, Kind, CLASS, ENUM, FIELD, FUNCTION, NAMESPACE, TEMPLATE, TEMPLATE_TYPE,
};
use crate::names::build_names;
use crate::relocate::build_relocator;
use crate::verify::{verify, VerifyReport};
use reflectdb_core::{Database, MAX_TEMPLATE_ARGS};
use std::path::Path;
use thiserror::Error;

/// Errors writing an exported blob out.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The output file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

fn records(image: &DatabaseImage, kind: Kind) -> Vec<u64> {
    image.kind_run(kind).iter().collect()
}

/// Build the memory image for `db` and verify it.
///
/// The image is complete either way; the report lists any references the
/// source database left dangling.
pub fn export(db: &Database) -> (DatabaseImage, VerifyReport) {
    let mut image = DatabaseImage::new();
    build_names(&mut image, db);
    copy_database(&mut image, db);
    gather_type_primitives(&mut image);

    let types = records(&image, Kind::Type);
    let enums = records(&image, Kind::Enum);
    let constants = records(&image, Kind::EnumConstant);
    let fields = records(&image, Kind::Field);
    let functions = records(&image, Kind::Function);
    let classes = records(&image, Kind::Class);
    let templates = records(&image, Kind::Template);
    let template_types = records(&image, Kind::TemplateType);
    let namespaces = records(&image, Kind::Namespace);

    let enum_run = image.kind_run(Kind::Enum);
    let function_run = image.kind_run(Kind::Function);
    let class_run = image.kind_run(Kind::Class);
    let template_run = image.kind_run(Kind::Template);
    let field_run = image.kind_run(Kind::Field);
    let namespace_run = image.kind_run(Kind::Namespace);

    let arena = &mut image.arena;
    parent_children(arena, enum_run, ENUM.constants, &constants, any_parent);
    // Parameters resolve against the owning function's correlation id, not
    // just its name hash, so overload sets parent correctly.
    parent_children(
        arena,
        function_run,
        FUNCTION.parameters,
        &fields,
        |arena, parent, child| {
            FUNCTION.unique_id.get(arena, parent) == FIELD.parent_unique_id.get(arena, child)
        },
    );
    parent_children(arena, class_run, CLASS.enums, &enums, any_parent);
    parent_children(arena, class_run, CLASS.classes, &classes, any_parent);
    parent_children(arena, class_run, CLASS.methods, &functions, any_parent);
    parent_children(arena, class_run, CLASS.fields, &fields, any_parent);
    parent_children(arena, class_run, CLASS.templates, &templates, any_parent);
    parent_children(
        arena,
        namespace_run,
        NAMESPACE.namespaces,
        &namespaces,
        any_parent,
    );
    parent_children(arena, namespace_run, NAMESPACE.types, &types, any_parent);
    parent_children(arena, namespace_run, NAMESPACE.enums, &enums, any_parent);
    parent_children(arena, namespace_run, NAMESPACE.classes, &classes, any_parent);
    parent_children(
        arena,
        namespace_run,
        NAMESPACE.functions,
        &functions,
        any_parent,
    );
    parent_children(
        arena,
        namespace_run,
        NAMESPACE.templates,
        &templates,
        any_parent,
    );
    parent_children(
        arena,
        template_run,
        TEMPLATE.instances,
        &template_types,
        any_parent,
    );

    // Attributes of every payload kind compete for the same owner arrays,
    // so each owner kind is parented once against the combined list.
    let mut attributes = Vec::new();
    for kind in [
        Kind::FlagAttribute,
        Kind::IntAttribute,
        Kind::FloatAttribute,
        Kind::NameAttribute,
        Kind::TextAttribute,
    ] {
        attributes.extend(image.kind_run(kind).iter());
    }
    let arena = &mut image.arena;
    parent_children(arena, enum_run, ENUM.attributes, &attributes, any_parent);
    parent_children(arena, field_run, FIELD.attributes, &attributes, any_parent);
    parent_children(
        arena,
        function_run,
        FUNCTION.attributes,
        &attributes,
        any_parent,
    );
    parent_children(arena, class_run, CLASS.attributes, &attributes, any_parent);

    // Link every type reference against the gathered type table.
    let link_map = build_link_map(&image.arena, &image.type_primitives);
    let arena = &mut image.arena;
    link_references(arena, field_run, FIELD.ty, &link_map);
    link_references(arena, class_run, CLASS.base_class, &link_map);
    let template_type_run = image.kind_run(Kind::TemplateType);
    for slot in 0..MAX_TEMPLATE_ARGS {
        link_references(
            &mut image.arena,
            template_type_run,
            TEMPLATE_TYPE.parameter_types[slot],
            &link_map,
        );
    }

    assign_return_parameters(&mut image);
    build_global_namespace(&mut image);
    sort_primitives(&mut image);
    find_class_constructors(&mut image);

    let report = verify(&image);
    (image, report)
}

/// Serialize a finished image into its relocatable blob.
///
/// Normalizes every reference cell to its on-disk form in place, so this is
/// the last thing done with an image; run [`crate::dump::dump_text`] first
/// if a text dump is wanted.
pub fn save(image: &mut DatabaseImage) -> Vec<u8> {
    let relocator = build_relocator(image);
    relocator.make_relative(&mut image.arena);
    encode_blob(&image.arena, &relocator)
}

/// Serialize a finished image and write it to `path`.
///
/// The blob is built fully in memory first; a failed write never leaves a
/// partially exported file behind an earlier successful one.
pub fn save_to_file(image: &mut DatabaseImage, path: &Path) -> Result<(), ExportError> {
    let blob = save(image);
    std::fs::write(path, blob).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PRIMITIVE;
    use crate::layout::Ref;
    use reflectdb_core::{Class, Enum, EnumConstant, Namespace, Template, TemplateType, Type};

    fn sample_db() -> Database {
        let mut db = Database::new();
        let int = db.add_name("int");
        let game = db.add_name("game");
        let player = db.add_name("game::Player");
        let state = db.add_name("game::Player::State");
        let idle = db.add_name("game::Player::State::Idle");
        let list = db.add_name("List");
        let list_int = db.add_name("List<int>");
        db.types.push(Type {
            name: int,
            parent: 0,
            size: 4,
        });
        db.namespaces.push(Namespace {
            name: game,
            parent: 0,
        });
        db.classes.push(Class {
            name: player,
            parent: game,
            size: 16,
            base_class: 0,
        });
        db.enums.push(Enum {
            name: state,
            parent: player,
            size: 4,
        });
        db.enum_constants.push(EnumConstant {
            name: idle,
            parent: state,
            value: 0,
        });
        db.templates.push(Template {
            name: list,
            parent: 0,
        });
        db.template_types.push(TemplateType {
            name: list_int,
            parent: list,
            size: 24,
            parameter_types: [int, 0, 0, 0],
            parameter_ptrs: [false; 4],
        });
        db
    }

    #[test]
    fn test_export_resolves_everything() {
        let db = sample_db();
        let (image, report) = export(&db);
        assert!(report.is_ok(), "unresolved: {:?}", report.unresolved);

        // The nested enum hangs off the class, not a namespace.
        let cls = image.kind_run(Kind::Class).off;
        let en = image.kind_run(Kind::Enum).off;
        assert_eq!(PRIMITIVE.parent.get(&image.arena, en), Ref::Addr(cls));
        let (_, nb_enums) = CLASS.enums.get(&image.arena, cls);
        assert_eq!(nb_enums, 1);

        // The instantiation links its first argument to the int type.
        let tt = image.kind_run(Kind::TemplateType).off;
        let arg = TEMPLATE_TYPE.parameter_types[0].get(&image.arena, tt);
        assert_eq!(arg, Ref::Addr(image.kind_run(Kind::Type).off));
    }

    #[test]
    fn test_save_normalizes_unresolved_to_bare_hash() {
        let mut db = Database::new();
        let x = db.add_name("x");
        let missing = db.add_name("Missing");
        db.fields.push(reflectdb_core::Field {
            name: x,
            parent: 0,
            ty: missing,
            modifier: reflectdb_core::Modifier::Value,
            is_const: false,
            offset: 0,
            parent_unique_id: 0,
        });
        let (mut image, report) = export(&db);
        assert!(!report.is_ok());

        let field = image.kind_run(Kind::Field).off;
        let blob = save(&mut image);
        assert!(!blob.is_empty());
        // After normalization the cell holds the bare hash, untagged.
        assert_eq!(FIELD.ty.get(&image.arena, field), Ref::Addr(missing as u64));
    }
}
