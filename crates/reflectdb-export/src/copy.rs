//! Flat copy of the source database into the memory image
//!
//! One contiguous record run is allocated per primitive kind, in source
//! order. Every cross-reference starts out as an unresolved name hash; the
//! hierarchy and link passes replace them with offsets later. The only
//! references resolved here are the ones that never need linking: name text,
//! name-attribute value text, and text-attribute payloads.

use crate::arena::Arena;
use crate::image::{
    DatabaseImage, Kind, CLASS, DATABASE, ENUM, ENUM_CONSTANT, FIELD, FLOAT_ATTRIBUTE, FUNCTION,
    INT_ATTRIBUTE, NAMESPACE, NAME_ATTRIBUTE, PRIMITIVE, TEMPLATE, TEMPLATE_TYPE, TEXT_ATTRIBUTE,
    TYPE,
};
use crate::layout::{set_array_elem, FieldArray, Ref, ARRAY_ELEM_SIZE};
use reflectdb_core::{Database, Modifier, MAX_TEMPLATE_ARGS};
use rustc_hash::FxHashMap;

fn text_ref(name_map: &FxHashMap<u32, u64>, hash: u32) -> Ref {
    match name_map.get(&hash) {
        Some(&off) => Ref::Addr(off),
        None => Ref::Null,
    }
}

fn set_prefix(
    arena: &mut Arena,
    name_map: &FxHashMap<u32, u64>,
    rec: u64,
    kind: Kind,
    name: u32,
    parent: u32,
) {
    PRIMITIVE.kind.set(arena, rec, kind as u32);
    PRIMITIVE.name.hash.set(arena, rec, name);
    PRIMITIVE.name.text.set(arena, rec, text_ref(name_map, name));
    PRIMITIVE.parent.set(arena, rec, Ref::from_hash(parent));
}

fn copy_run<T>(
    image: &mut DatabaseImage,
    items: &[T],
    stride: u64,
    root: FieldArray,
    kind: Kind,
    prefix: impl Fn(&T) -> (u32, u32),
    extra: impl Fn(&mut Arena, &FxHashMap<u32, u64>, u64, &T),
) {
    if items.is_empty() {
        root.set(&mut image.arena, 0, Ref::Null, 0);
        return;
    }
    let run = image.arena.alloc_array(stride, items.len() as u64);
    for (i, item) in items.iter().enumerate() {
        let rec = run + i as u64 * stride;
        let (name, parent) = prefix(item);
        set_prefix(&mut image.arena, &image.name_map, rec, kind, name, parent);
        extra(&mut image.arena, &image.name_map, rec, item);
    }
    root.set(&mut image.arena, 0, Ref::Addr(run), items.len() as u32);
}

fn copy_text_attributes(image: &mut DatabaseImage, db: &Database) {
    let total: u64 = db
        .text_attributes
        .iter()
        .map(|attr| attr.value.len() as u64 + 1)
        .sum();
    let blob = if total > 0 {
        Some(image.arena.alloc(total, 1))
    } else {
        None
    };
    let data = match blob {
        Some(off) => Ref::Addr(off),
        None => Ref::Null,
    };
    DATABASE.text_attribute_data.set(&mut image.arena, 0, data);

    if db.text_attributes.is_empty() {
        DATABASE
            .text_attributes
            .set(&mut image.arena, 0, Ref::Null, 0);
        return;
    }
    let stride = TEXT_ATTRIBUTE.layout.size;
    let run = image
        .arena
        .alloc_array(stride, db.text_attributes.len() as u64);
    let mut cursor = blob.unwrap_or(0);
    for (i, attr) in db.text_attributes.iter().enumerate() {
        let rec = run + i as u64 * stride;
        set_prefix(
            &mut image.arena,
            &image.name_map,
            rec,
            Kind::TextAttribute,
            attr.name,
            attr.parent,
        );
        image.arena.write_bytes(cursor, attr.value.as_bytes());
        TEXT_ATTRIBUTE.value.set(&mut image.arena, rec, Ref::Addr(cursor));
        cursor += attr.value.len() as u64 + 1;
    }
    DATABASE.text_attributes.set(
        &mut image.arena,
        0,
        Ref::Addr(run),
        db.text_attributes.len() as u32,
    );
}

/// Copy every primitive out of `db` into flat per-kind record runs and hook
/// them onto the root record.
pub fn copy_database(image: &mut DatabaseImage, db: &Database) {
    copy_run(
        image,
        &db.types,
        TYPE.layout.size,
        DATABASE.types,
        Kind::Type,
        |t| (t.name, t.parent),
        |arena, _, rec, t| TYPE.size.set(arena, rec, t.size),
    );
    copy_run(
        image,
        &db.enum_constants,
        ENUM_CONSTANT.layout.size,
        DATABASE.enum_constants,
        Kind::EnumConstant,
        |c| (c.name, c.parent),
        |arena, _, rec, c| ENUM_CONSTANT.value.set(arena, rec, c.value),
    );
    copy_run(
        image,
        &db.enums,
        ENUM.layout.size,
        DATABASE.enums,
        Kind::Enum,
        |e| (e.name, e.parent),
        |arena, _, rec, e| TYPE.size.set(arena, rec, e.size),
    );
    copy_run(
        image,
        &db.fields,
        FIELD.layout.size,
        DATABASE.fields,
        Kind::Field,
        |f| (f.name, f.parent),
        |arena, _, rec, f| {
            FIELD.ty.set(arena, rec, Ref::from_hash(f.ty));
            let modifier = match f.modifier {
                Modifier::Value => 0,
                Modifier::Pointer => 1,
                Modifier::Reference => 2,
            };
            FIELD.modifier.set(arena, rec, modifier);
            FIELD.is_const.set(arena, rec, f.is_const as u32);
            FIELD.offset.set(arena, rec, f.offset);
            FIELD.parent_unique_id.set(arena, rec, f.parent_unique_id);
        },
    );
    copy_run(
        image,
        &db.functions,
        FUNCTION.layout.size,
        DATABASE.functions,
        Kind::Function,
        |f| (f.name, f.parent),
        |arena, _, rec, f| {
            FUNCTION.address.set(arena, rec, f.address);
            FUNCTION.unique_id.set(arena, rec, f.unique_id);
        },
    );
    copy_run(
        image,
        &db.classes,
        CLASS.layout.size,
        DATABASE.classes,
        Kind::Class,
        |c| (c.name, c.parent),
        |arena, _, rec, c| {
            TYPE.size.set(arena, rec, c.size);
            CLASS.base_class.set(arena, rec, Ref::from_hash(c.base_class));
        },
    );
    copy_run(
        image,
        &db.templates,
        TEMPLATE.layout.size,
        DATABASE.templates,
        Kind::Template,
        |t| (t.name, t.parent),
        |_, _, _, _| {},
    );
    copy_run(
        image,
        &db.template_types,
        TEMPLATE_TYPE.layout.size,
        DATABASE.template_types,
        Kind::TemplateType,
        |t| (t.name, t.parent),
        |arena, _, rec, t| {
            TYPE.size.set(arena, rec, t.size);
            for slot in 0..MAX_TEMPLATE_ARGS {
                TEMPLATE_TYPE.parameter_types[slot].set(
                    arena,
                    rec,
                    Ref::from_hash(t.parameter_types[slot]),
                );
                TEMPLATE_TYPE.parameter_ptrs[slot].set(arena, rec, t.parameter_ptrs[slot] as u32);
            }
        },
    );
    copy_run(
        image,
        &db.namespaces,
        NAMESPACE.layout.size,
        DATABASE.namespaces,
        Kind::Namespace,
        |n| (n.name, n.parent),
        |_, _, _, _| {},
    );
    copy_run(
        image,
        &db.flag_attributes,
        PRIMITIVE.layout.size,
        DATABASE.flag_attributes,
        Kind::FlagAttribute,
        |a| (a.name, a.parent),
        |_, _, _, _| {},
    );
    copy_run(
        image,
        &db.int_attributes,
        INT_ATTRIBUTE.layout.size,
        DATABASE.int_attributes,
        Kind::IntAttribute,
        |a| (a.name, a.parent),
        |arena, _, rec, a| INT_ATTRIBUTE.value.set(arena, rec, a.value),
    );
    copy_run(
        image,
        &db.float_attributes,
        FLOAT_ATTRIBUTE.layout.size,
        DATABASE.float_attributes,
        Kind::FloatAttribute,
        |a| (a.name, a.parent),
        |arena, _, rec, a| FLOAT_ATTRIBUTE.value.set(arena, rec, a.value),
    );
    copy_run(
        image,
        &db.name_attributes,
        NAME_ATTRIBUTE.layout.size,
        DATABASE.name_attributes,
        Kind::NameAttribute,
        |a| (a.name, a.parent),
        |arena, name_map, rec, a| {
            // The value is a registered name: store both its hash and a
            // direct reference into the name text blob.
            NAME_ATTRIBUTE.value.hash.set(arena, rec, a.value);
            NAME_ATTRIBUTE
                .value
                .text
                .set(arena, rec, text_ref(name_map, a.value));
        },
    );
    copy_text_attributes(image, db);
}

/// Build the flat type-lookup array referencing everything that is a type:
/// plain types first, then classes, enums, and template instantiations.
///
/// The gather order is also the tie-break order for link targets that share
/// a name hash.
pub fn gather_type_primitives(image: &mut DatabaseImage) {
    let mut offsets = Vec::new();
    for kind in [Kind::Type, Kind::Class, Kind::Enum, Kind::TemplateType] {
        let run = image.kind_run(kind);
        offsets.extend(run.iter());
    }
    image.type_primitives = offsets;

    if image.type_primitives.is_empty() {
        DATABASE
            .type_primitives
            .set(&mut image.arena, 0, Ref::Null, 0);
        return;
    }
    let count = image.type_primitives.len();
    let data = image.arena.alloc_array(ARRAY_ELEM_SIZE, count as u64);
    for i in 0..count {
        let target = image.type_primitives[i];
        set_array_elem(&mut image.arena, data, i as u32, Ref::Addr(target));
    }
    DATABASE
        .type_primitives
        .set(&mut image.arena, 0, Ref::Addr(data), count as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::build_names;
    use reflectdb_core::{Class, Enum, Field, NameAttribute, TextAttribute, Type};

    fn image_for(db: &Database) -> DatabaseImage {
        let mut image = DatabaseImage::new();
        build_names(&mut image, db);
        copy_database(&mut image, db);
        image
    }

    #[test]
    fn test_copy_sets_prefix_and_extras() {
        let mut db = Database::new();
        let int = db.add_name("int");
        let ns = db.add_name("game");
        let cls = db.add_name("game::Player");
        db.types.push(Type {
            name: int,
            parent: 0,
            size: 4,
        });
        db.classes.push(Class {
            name: cls,
            parent: ns,
            size: 16,
            base_class: 0,
        });

        let image = image_for(&db);
        let types = image.kind_run(Kind::Type);
        assert_eq!(types.count, 1);
        let rec = types.off;
        assert_eq!(PRIMITIVE.kind.get(&image.arena, rec), Kind::Type as u32);
        assert_eq!(PRIMITIVE.name.hash.get(&image.arena, rec), int);
        assert_eq!(image.record_name(rec), "int");
        assert_eq!(PRIMITIVE.parent.get(&image.arena, rec), Ref::Null);
        assert_eq!(TYPE.size.get(&image.arena, rec), 4);

        let classes = image.kind_run(Kind::Class);
        let rec = classes.off;
        assert_eq!(
            PRIMITIVE.parent.get(&image.arena, rec),
            Ref::Unresolved(ns)
        );
        assert_eq!(CLASS.base_class.get(&image.arena, rec), Ref::Null);
    }

    #[test]
    fn test_field_references_start_unresolved() {
        let mut db = Database::new();
        let ty = db.add_name("float");
        let name = db.add_name("velocity");
        db.fields.push(Field {
            name,
            parent: 0,
            ty,
            modifier: Modifier::Pointer,
            is_const: true,
            offset: 8,
            parent_unique_id: 0,
        });

        let image = image_for(&db);
        let rec = image.kind_run(Kind::Field).off;
        assert_eq!(FIELD.ty.get(&image.arena, rec), Ref::Unresolved(ty));
        assert_eq!(FIELD.modifier.get(&image.arena, rec), 1);
        assert_eq!(FIELD.is_const.get(&image.arena, rec), 1);
        assert_eq!(FIELD.offset.get(&image.arena, rec), 8);
    }

    #[test]
    fn test_attribute_text_is_resolved_immediately() {
        let mut db = Database::new();
        let owner = db.add_name("game::Player");
        let desc = db.add_name("description");
        let group = db.add_name("group");
        let gameplay = db.add_name("gameplay");
        db.name_attributes.push(NameAttribute {
            name: group,
            parent: owner,
            value: gameplay,
        });
        db.text_attributes.push(TextAttribute {
            name: desc,
            parent: owner,
            value: "the player pawn".to_string(),
        });

        let image = image_for(&db);
        let rec = image.kind_run(Kind::NameAttribute).off;
        assert_eq!(NAME_ATTRIBUTE.value.hash.get(&image.arena, rec), gameplay);
        let text = NAME_ATTRIBUTE.value.text.get(&image.arena, rec).addr().unwrap();
        assert_eq!(image.arena.read_cstr(text), "gameplay");

        let rec = image.kind_run(Kind::TextAttribute).off;
        let text = TEXT_ATTRIBUTE.value.get(&image.arena, rec).addr().unwrap();
        assert_eq!(image.arena.read_cstr(text), "the player pawn");
        let blob = DATABASE.text_attribute_data.get(&image.arena, 0);
        assert_eq!(blob, Ref::Addr(text));
    }

    #[test]
    fn test_gather_type_primitives_order() {
        let mut db = Database::new();
        let int = db.add_name("int");
        let cls = db.add_name("Player");
        let en = db.add_name("Color");
        db.types.push(Type {
            name: int,
            parent: 0,
            size: 4,
        });
        db.classes.push(Class {
            name: cls,
            parent: 0,
            size: 16,
            base_class: 0,
        });
        db.enums.push(Enum {
            name: en,
            parent: 0,
            size: 4,
        });

        let mut image = image_for(&db);
        gather_type_primitives(&mut image);
        assert_eq!(image.type_primitives.len(), 3);
        let hashes: Vec<u32> = image
            .type_primitives
            .iter()
            .map(|&rec| PRIMITIVE.name.hash.get(&image.arena, rec))
            .collect();
        // Gather order is types, classes, enums, template instantiations.
        assert_eq!(hashes, vec![int, cls, en]);

        let (data, len) = DATABASE.type_primitives.get(&image.arena, 0);
        assert_eq!(len, 3);
        let data = data.addr().unwrap();
        for i in 0..3 {
            assert_eq!(
                crate::layout::array_elem(&image.arena, data, i).addr(),
                Some(image.type_primitives[i as usize])
            );
        }
    }
}
