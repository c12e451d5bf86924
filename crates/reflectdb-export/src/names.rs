//! Name text blob and the binary-searchable name table

use crate::image::{DatabaseImage, DATABASE, NAME};
use crate::layout::Ref;
use reflectdb_core::Database;

/// Copy every registered name into the image.
///
/// Each text is written null-terminated into one contiguous blob, and the
/// root `names` array is filled with one entry per hash, ascending, so
/// consumers can binary-search it. The hash-to-text-offset map is retained
/// on the image for attribute fix-up and diagnostics.
pub fn build_names(image: &mut DatabaseImage, db: &Database) {
    let mut blob_start = None;
    for (&hash, text) in &db.names {
        let off = image.arena.alloc(text.len() as u64 + 1, 1);
        image.arena.write_bytes(off, text.as_bytes());
        blob_start.get_or_insert(off);
        image.name_map.insert(hash, off);
    }

    let data = match blob_start {
        Some(off) => Ref::Addr(off),
        None => Ref::Null,
    };
    DATABASE.name_text_data.set(&mut image.arena, 0, data);

    if db.names.is_empty() {
        return;
    }
    let count = db.names.len() as u64;
    let run = image.arena.alloc_array(NAME.layout.size, count);
    // BTreeMap iteration is ascending by hash, which is exactly the table
    // order consumers expect.
    for (i, &hash) in db.names.keys().enumerate() {
        let rec = run + i as u64 * NAME.layout.size;
        NAME.hash.set(&mut image.arena, rec, hash);
        let text = Ref::Addr(image.name_map[&hash]);
        NAME.text.set(&mut image.arena, rec, text);
    }
    DATABASE
        .names
        .set(&mut image.arena, 0, Ref::Addr(run), count as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_table_is_sorted_by_hash() {
        let mut db = Database::new();
        for text in ["zeta", "alpha", "game::Player", "x"] {
            db.add_name(text);
        }
        let mut image = DatabaseImage::new();
        build_names(&mut image, &db);

        let (data, len) = DATABASE.names.get(&image.arena, 0);
        let data = data.addr().unwrap();
        assert_eq!(len, 4);
        let mut last = 0;
        for i in 0..len {
            let rec = data + i as u64 * NAME.layout.size;
            let hash = NAME.hash.get(&image.arena, rec);
            assert!(hash > last);
            last = hash;
            let text = NAME.text.get(&image.arena, rec).addr().unwrap();
            assert_eq!(image.arena.read_cstr(text), db.names[&hash]);
        }
    }

    #[test]
    fn test_empty_database_has_no_table() {
        let db = Database::new();
        let mut image = DatabaseImage::new();
        build_names(&mut image, &db);
        assert_eq!(DATABASE.name_text_data.get(&image.arena, 0), Ref::Null);
        let (data, len) = DATABASE.names.get(&image.arena, 0);
        assert_eq!(data, Ref::Null);
        assert_eq!(len, 0);
    }
}
