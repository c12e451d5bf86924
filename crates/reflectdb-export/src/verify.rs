//! Final integrity check over the finished image
//!
//! Every cross-reference must be null or resolved by now. A cell still
//! holding a name hash means the source database referenced a primitive it
//! never defined; each one is reported with the hash, its registered text if
//! known, and where it was found.

use crate::image::{DatabaseImage, Kind, CLASS, FIELD, FUNCTION, PRIMITIVE, TEMPLATE_TYPE};
use crate::layout::Ref;
use reflectdb_core::MAX_TEMPLATE_ARGS;

/// One reference that linking failed to resolve.
#[derive(Debug, Clone)]
pub struct Unresolved {
    /// The dangling name hash.
    pub hash: u32,
    /// Registered text for the hash, when the name table knows it.
    pub name: Option<String>,
    /// Where the dangling reference lives, for the error message.
    pub context: String,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}: unresolved reference to '{}'", self.context, name),
            None => write!(
                f,
                "{}: unresolved reference to unknown hash {:#010x}",
                self.context, self.hash
            ),
        }
    }
}

/// Outcome of the verify pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Every dangling reference found, in image order.
    pub unresolved: Vec<Unresolved>,
}

impl VerifyReport {
    /// Whether the image is fully resolved.
    pub fn is_ok(&self) -> bool {
        self.unresolved.is_empty()
    }
}

fn kind_label(kind: Kind) -> &'static str {
    match kind {
        Kind::None => "record",
        Kind::Type => "type",
        Kind::Class => "class",
        Kind::Enum => "enum",
        Kind::EnumConstant => "enum constant",
        Kind::Field => "field",
        Kind::Function => "function",
        Kind::Template => "template",
        Kind::TemplateType => "template instance",
        Kind::Namespace => "namespace",
        Kind::FlagAttribute => "flag attribute",
        Kind::IntAttribute => "int attribute",
        Kind::FloatAttribute => "float attribute",
        Kind::NameAttribute => "name attribute",
        Kind::TextAttribute => "text attribute",
    }
}

fn check(
    image: &DatabaseImage,
    report: &mut VerifyReport,
    kind: Kind,
    record: u64,
    slot: &str,
    value: Ref,
) {
    let Ref::Unresolved(hash) = value else {
        return;
    };
    let name = image
        .name_map
        .get(&hash)
        .map(|&off| image.arena.read_cstr(off));
    let context = format!(
        "{} '{}' {}",
        kind_label(kind),
        image.record_name(record),
        slot
    );
    report.unresolved.push(Unresolved {
        hash,
        name,
        context,
    });
}

const ALL_KINDS: [Kind; 14] = [
    Kind::Type,
    Kind::Class,
    Kind::Enum,
    Kind::EnumConstant,
    Kind::Field,
    Kind::Function,
    Kind::Template,
    Kind::TemplateType,
    Kind::Namespace,
    Kind::FlagAttribute,
    Kind::IntAttribute,
    Kind::FloatAttribute,
    Kind::NameAttribute,
    Kind::TextAttribute,
];

/// Walk every record and report each reference cell still holding a hash.
pub fn verify(image: &DatabaseImage) -> VerifyReport {
    let mut report = VerifyReport::default();
    for kind in ALL_KINDS {
        for rec in image.kind_run(kind).iter() {
            let parent = PRIMITIVE.parent.get(&image.arena, rec);
            check(image, &mut report, kind, rec, "parent", parent);
            match kind {
                Kind::Field => {
                    let ty = FIELD.ty.get(&image.arena, rec);
                    check(image, &mut report, kind, rec, "type", ty);
                }
                Kind::Function => {
                    let ret = FUNCTION.return_parameter.get(&image.arena, rec);
                    check(image, &mut report, kind, rec, "return parameter", ret);
                }
                Kind::Class => {
                    let base = CLASS.base_class.get(&image.arena, rec);
                    check(image, &mut report, kind, rec, "base class", base);
                }
                Kind::TemplateType => {
                    for slot in 0..MAX_TEMPLATE_ARGS {
                        let arg = TEMPLATE_TYPE.parameter_types[slot].get(&image.arena, rec);
                        check(
                            image,
                            &mut report,
                            kind,
                            rec,
                            "type argument",
                            arg,
                        );
                    }
                }
                _ => {}
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::{copy_database, gather_type_primitives};
    use crate::hierarchy::{build_link_map, link_references};
    use crate::names::build_names;
    use reflectdb_core::{Database, Field, Modifier, Type};

    fn linked_image(db: &Database) -> DatabaseImage {
        let mut image = DatabaseImage::new();
        build_names(&mut image, db);
        copy_database(&mut image, db);
        gather_type_primitives(&mut image);
        let map = build_link_map(&image.arena, &image.type_primitives);
        let fields = image.kind_run(Kind::Field);
        link_references(&mut image.arena, fields, FIELD.ty, &map);
        image
    }

    #[test]
    fn test_clean_image_verifies() {
        let mut db = Database::new();
        let int = db.add_name("int");
        let x = db.add_name("x");
        db.types.push(Type {
            name: int,
            parent: 0,
            size: 4,
        });
        db.fields.push(Field {
            name: x,
            parent: 0,
            ty: int,
            modifier: Modifier::Value,
            is_const: false,
            offset: 0,
            parent_unique_id: 0,
        });
        let image = linked_image(&db);
        assert!(verify(&image).is_ok());
    }

    #[test]
    fn test_dangling_type_is_reported_with_name() {
        let mut db = Database::new();
        let missing = db.add_name("UnknownType");
        let x = db.add_name("x");
        db.fields.push(Field {
            name: x,
            parent: 0,
            ty: missing,
            modifier: Modifier::Value,
            is_const: false,
            offset: 0,
            parent_unique_id: 0,
        });
        let image = linked_image(&db);
        let report = verify(&image);
        assert_eq!(report.unresolved.len(), 1);
        let entry = &report.unresolved[0];
        assert_eq!(entry.hash, missing);
        assert_eq!(entry.name.as_deref(), Some("UnknownType"));
        assert!(entry.to_string().contains("field 'x' type"));
    }

    #[test]
    fn test_unknown_hash_is_reported_without_name() {
        let mut db = Database::new();
        let x = db.add_name("x");
        db.fields.push(Field {
            name: x,
            parent: 0,
            ty: 0xdead_beef,
            modifier: Modifier::Value,
            is_const: false,
            offset: 0,
            parent_unique_id: 0,
        });
        let image = linked_image(&db);
        let report = verify(&image);
        assert_eq!(report.unresolved.len(), 1);
        assert!(report.unresolved[0].name.is_none());
        assert!(report.unresolved[0].to_string().contains("0xdeadbeef"));
    }
}
