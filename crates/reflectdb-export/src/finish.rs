//! Late passes that shape the image for consumers
//!
//! Runs after parenting and linking: return-parameter extraction, gathering
//! of unparented primitives into the global namespace, hash-sorting of every
//! child array for binary search, and constructor discovery.

use crate::image::{find_in_sorted, DatabaseImage, Kind, CLASS, ENUM, FIELD, FUNCTION, NAMESPACE, PRIMITIVE, TEMPLATE, DATABASE};
use crate::layout::{array_elem, set_array_elem, FieldArray, Ref, ARRAY_ELEM_SIZE};
use reflectdb_core::hash_name;

/// Move each function's `return` pseudo-parameter out of its parameter list
/// and into the dedicated return slot.
///
/// The remaining parameters keep their relative order; the list shrinks by
/// one in place.
pub fn assign_return_parameters(image: &mut DatabaseImage) {
    let return_hash = hash_name("return");
    let functions = image.kind_run(Kind::Function);
    for func in functions.iter() {
        let (data, len) = FUNCTION.parameters.get(&image.arena, func);
        let Some(data) = data.addr() else {
            continue;
        };
        let found = (0..len).find_map(|i| {
            let param = array_elem(&image.arena, data, i).addr()?;
            (PRIMITIVE.name.hash.get(&image.arena, param) == return_hash).then_some((i, param))
        });
        let Some((index, param)) = found else {
            continue;
        };
        FUNCTION
            .return_parameter
            .set(&mut image.arena, func, Ref::Addr(param));
        for i in index..len - 1 {
            let next = array_elem(&image.arena, data, i + 1);
            set_array_elem(&mut image.arena, data, i, next);
        }
        FUNCTION.parameters.set_len(&mut image.arena, func, len - 1);
    }
}

fn gather_global(image: &mut DatabaseImage, kind: Kind, array: FieldArray) {
    let run = image.kind_run(kind);
    let members: Vec<u64> = run
        .iter()
        .filter(|&rec| PRIMITIVE.parent.get(&image.arena, rec) == Ref::Null)
        .collect();
    if members.is_empty() {
        return;
    }
    let data = image.arena.alloc_array(ARRAY_ELEM_SIZE, members.len() as u64);
    for (i, &member) in members.iter().enumerate() {
        set_array_elem(&mut image.arena, data, i as u32, Ref::Addr(member));
    }
    let ns = image.global_namespace();
    array.set(&mut image.arena, ns, Ref::Addr(data), members.len() as u32);
}

/// Gather every primitive that ended up without a parent into the embedded
/// global namespace.
pub fn build_global_namespace(image: &mut DatabaseImage) {
    gather_global(image, Kind::Namespace, NAMESPACE.namespaces);
    gather_global(image, Kind::Type, NAMESPACE.types);
    gather_global(image, Kind::Enum, NAMESPACE.enums);
    gather_global(image, Kind::Class, NAMESPACE.classes);
    gather_global(image, Kind::Function, NAMESPACE.functions);
    gather_global(image, Kind::Template, NAMESPACE.templates);
}

fn sort_child_array(image: &mut DatabaseImage, record: u64, array: FieldArray) {
    let (data, len) = array.get(&image.arena, record);
    let Some(data) = data.addr() else {
        return;
    };
    let mut elems: Vec<u64> = (0..len)
        .filter_map(|i| array_elem(&image.arena, data, i).addr())
        .collect();
    let arena = &image.arena;
    elems.sort_by_key(|&rec| PRIMITIVE.name.hash.get(arena, rec));
    for (i, &rec) in elems.iter().enumerate() {
        set_array_elem(&mut image.arena, data, i as u32, Ref::Addr(rec));
    }
}

fn sort_namespace_arrays(image: &mut DatabaseImage, ns: u64) {
    sort_child_array(image, ns, NAMESPACE.namespaces);
    sort_child_array(image, ns, NAMESPACE.types);
    sort_child_array(image, ns, NAMESPACE.enums);
    sort_child_array(image, ns, NAMESPACE.classes);
    sort_child_array(image, ns, NAMESPACE.functions);
    sort_child_array(image, ns, NAMESPACE.templates);
}

/// Sort every child array ascending by name hash so consumers can binary
/// search them, including the global namespace and the type lookup table.
pub fn sort_primitives(image: &mut DatabaseImage) {
    for en in image.kind_run(Kind::Enum).iter() {
        sort_child_array(image, en, ENUM.constants);
        sort_child_array(image, en, ENUM.attributes);
    }
    for field in image.kind_run(Kind::Field).iter() {
        sort_child_array(image, field, FIELD.attributes);
    }
    for func in image.kind_run(Kind::Function).iter() {
        sort_child_array(image, func, FUNCTION.parameters);
        sort_child_array(image, func, FUNCTION.attributes);
    }
    for cls in image.kind_run(Kind::Class).iter() {
        sort_child_array(image, cls, CLASS.enums);
        sort_child_array(image, cls, CLASS.classes);
        sort_child_array(image, cls, CLASS.methods);
        sort_child_array(image, cls, CLASS.fields);
        sort_child_array(image, cls, CLASS.attributes);
        sort_child_array(image, cls, CLASS.templates);
    }
    for tpl in image.kind_run(Kind::Template).iter() {
        sort_child_array(image, tpl, TEMPLATE.instances);
    }
    for ns in image.kind_run(Kind::Namespace).iter() {
        sort_namespace_arrays(image, ns);
    }
    sort_namespace_arrays(image, image.global_namespace());
    sort_child_array(image, 0, DATABASE.type_primitives);
}

/// Find each class's constructor and destructor in its sorted method list.
///
/// Methods carry fully scoped names, so the lookups hash
/// `<ClassName>::ConstructObject` and `<ClassName>::DestructObject`. Must
/// run after [`sort_primitives`].
pub fn find_class_constructors(image: &mut DatabaseImage) {
    let classes = image.kind_run(Kind::Class);
    for cls in classes.iter() {
        let name = image.record_name(cls);
        if name.is_empty() {
            continue;
        }
        let construct_hash = hash_name(&format!("{name}::ConstructObject"));
        let destruct_hash = hash_name(&format!("{name}::DestructObject"));

        let (data, len) = CLASS.methods.get(&image.arena, cls);
        let Some(data) = data.addr() else {
            continue;
        };
        if let Some(method) = find_in_sorted(&image.arena, data, len, construct_hash) {
            CLASS.constructor.set(&mut image.arena, cls, Ref::Addr(method));
        }
        if let Some(method) = find_in_sorted(&image.arena, data, len, destruct_hash) {
            CLASS.destructor.set(&mut image.arena, cls, Ref::Addr(method));
        }
    }
}
