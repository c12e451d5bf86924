//! End-to-end export: database in, relocatable blob out.

use reflectdb_core::{
    Class, Database, Enum, EnumConstant, Field, Function, Modifier, Namespace, Type,
};
use reflectdb_export::arena::Arena;
use reflectdb_export::image::{Kind, CLASS, FUNCTION, PRIMITIVE};
use reflectdb_export::layout::{array_elem, Ref};
use reflectdb_export::{decode_blob, dump_text, export, save, save_to_file};

/// A small game module: a namespace holding a class with fields, methods
/// (including the conventional constructor pair), and a nested enum.
fn game_db() -> Database {
    let mut db = Database::new();
    let int = db.add_name("int");
    let float = db.add_name("float");
    let game = db.add_name("game");
    let player = db.add_name("game::Player");
    let health = db.add_name("health");
    let speed = db.add_name("speed");
    let update = db.add_name("game::Player::Update");
    let ctor = db.add_name("game::Player::ConstructObject");
    let dtor = db.add_name("game::Player::DestructObject");
    let dt = db.add_name("dt");
    let ret = db.add_name("return");
    let state = db.add_name("game::Player::State");
    let idle = db.add_name("game::Player::State::Idle");
    let running = db.add_name("game::Player::State::Running");

    for (name, size) in [(int, 4u32), (float, 4)] {
        db.types.push(Type {
            name,
            parent: 0,
            size,
        });
    }
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
    for (name, ty, offset) in [(health, int, 0u32), (speed, float, 4)] {
        db.fields.push(Field {
            name,
            parent: player,
            ty,
            modifier: Modifier::Value,
            is_const: false,
            offset,
            parent_unique_id: 0,
        });
    }
    for (name, unique_id) in [(update, 1u32), (ctor, 2), (dtor, 3)] {
        db.functions.push(Function {
            name,
            parent: player,
            address: 0x1000 + unique_id as u64,
            unique_id,
        });
    }
    // Update(float dt) -> int
    db.fields.push(Field {
        name: dt,
        parent: update,
        ty: float,
        modifier: Modifier::Value,
        is_const: false,
        offset: 0,
        parent_unique_id: 1,
    });
    db.fields.push(Field {
        name: ret,
        parent: update,
        ty: int,
        modifier: Modifier::Value,
        is_const: false,
        offset: 0,
        parent_unique_id: 1,
    });
    db.enums.push(Enum {
        name: state,
        parent: player,
        size: 4,
    });
    for (name, value) in [(idle, 0i32), (running, 1)] {
        db.enum_constants.push(EnumConstant {
            name,
            parent: state,
            value,
        });
    }
    db
}

#[test]
fn exports_game_database_fully_resolved() {
    let db = game_db();
    let (image, report) = export(&db);
    assert!(report.is_ok(), "unresolved: {:?}", report.unresolved);

    let cls = image.kind_run(Kind::Class).off;
    let (methods, nb_methods) = CLASS.methods.get(&image.arena, cls);
    assert_eq!(nb_methods, 3);
    let methods = methods.addr().unwrap();

    // Method list is sorted ascending by name hash for binary search.
    let mut last = 0;
    for i in 0..nb_methods {
        let m = array_elem(&image.arena, methods, i).addr().unwrap();
        let hash = PRIMITIVE.name.hash.get(&image.arena, m);
        assert!(hash > last);
        last = hash;
    }

    // Constructor and destructor were discovered by scoped-name convention.
    let ctor = CLASS.constructor.get(&image.arena, cls).addr().unwrap();
    let dtor = CLASS.destructor.get(&image.arena, cls).addr().unwrap();
    assert_eq!(
        image.record_name(ctor),
        "game::Player::ConstructObject"
    );
    assert_eq!(image.record_name(dtor), "game::Player::DestructObject");

    // Update lost its return pseudo-parameter but kept dt.
    let update = image
        .kind_run(Kind::Function)
        .iter()
        .find(|&f| image.record_name(f) == "game::Player::Update")
        .unwrap();
    let ret = FUNCTION
        .return_parameter
        .get(&image.arena, update)
        .addr()
        .unwrap();
    assert_eq!(image.record_name(ret), "return");
    let (_, nb_params) = FUNCTION.parameters.get(&image.arena, update);
    assert_eq!(nb_params, 1);
}

#[test]
fn blob_round_trips_through_rebase() {
    let db = game_db();
    let (mut image, report) = export(&db);
    assert!(report.is_ok());

    let blob = save(&mut image);
    let mut loaded = decode_blob(&blob).unwrap();
    let flat = loaded.data.clone();

    let base = 0x5540_0000_0000u64;
    loaded.apply_base(base);
    assert_ne!(loaded.data, flat);
    loaded.apply_base(base.wrapping_neg());
    assert_eq!(loaded.data, flat);
}

#[test]
fn rebased_references_point_at_rebased_records() {
    let db = game_db();
    let (mut image, report) = export(&db);
    assert!(report.is_ok());
    let cls = image.kind_run(Kind::Class).off;
    let ctor = CLASS.constructor.get(&image.arena, cls).addr().unwrap();

    let blob = save(&mut image);
    let mut loaded = decode_blob(&blob).unwrap();
    let base = 1 << 20;
    loaded.apply_base(base);

    // Read the rebased image back through the record accessors: the
    // constructor cell now carries its offset shifted by the base.
    let rebased = Arena::from_bytes(loaded.data);
    assert_eq!(
        CLASS.constructor.get(&rebased, cls),
        Ref::Addr(ctor + base)
    );
}

#[test]
fn saves_blob_to_file() {
    let db = game_db();
    let (mut image, report) = export(&db);
    assert!(report.is_ok());
    let text = dump_text(&image);
    assert!(text.contains("class game::Player"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.rdb");
    save_to_file(&mut image, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let loaded = decode_blob(&bytes).unwrap();
    assert!(!loaded.relocations.is_empty());
    assert_eq!(loaded.data.len() as u64, image.arena.len());
}

#[test]
fn unresolved_reference_survives_to_report_and_blob() {
    let mut db = game_db();
    let phantom = db.add_name("PhantomType");
    let cursed = db.add_name("cursed");
    db.fields.push(Field {
        name: cursed,
        parent: 0,
        ty: phantom,
        modifier: Modifier::Pointer,
        is_const: false,
        offset: 0,
        parent_unique_id: 0,
    });

    let (mut image, report) = export(&db);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].name.as_deref(), Some("PhantomType"));

    // The blob still gets written; the dangling cell carries the bare hash.
    let blob = save(&mut image);
    assert!(decode_blob(&blob).is_ok());
}
