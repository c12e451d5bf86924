//! Human-readable dump of a finished image
//!
//! Renders the scope hierarchy as pseudo source text, starting at the
//! global namespace. Purely diagnostic; fields print sorted by offset and
//! enum constants by value so the output reads like a declaration.

use crate::image::{
    DatabaseImage, CLASS, ENUM, ENUM_CONSTANT, FIELD, FUNCTION, NAMESPACE, TEMPLATE,
};
use crate::layout::{array_elem, FieldArray, Ref};
use std::fmt::Write;

struct Dumper<'a> {
    image: &'a DatabaseImage,
    out: String,
    indent: usize,
}

impl<'a> Dumper<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn children(&self, record: u64, array: FieldArray) -> Vec<u64> {
        let (data, len) = array.get(&self.image.arena, record);
        match data.addr() {
            Some(data) => (0..len)
                .filter_map(|i| array_elem(&self.image.arena, data, i).addr())
                .collect(),
            None => Vec::new(),
        }
    }

    fn ref_name(&self, value: Ref) -> String {
        match value {
            Ref::Addr(target) => self.image.record_name(target),
            Ref::Unresolved(hash) => format!("<unresolved:{hash:#010x}>"),
            Ref::Null => String::new(),
        }
    }

    fn field_text(&self, field: u64, with_name: bool) -> String {
        let arena = &self.image.arena;
        let mut text = String::new();
        if FIELD.is_const.get(arena, field) != 0 {
            text.push_str("const ");
        }
        text.push_str(&self.ref_name(FIELD.ty.get(arena, field)));
        match FIELD.modifier.get(arena, field) {
            1 => text.push('*'),
            2 => text.push('&'),
            _ => {}
        }
        if with_name {
            let _ = write!(text, " {}", self.image.record_name(field));
        }
        text
    }

    fn dump_field(&mut self, field: u64) {
        let text = self.field_text(field, true);
        self.line(&format!("{text};"));
    }

    fn dump_function(&mut self, func: u64) {
        let arena = &self.image.arena;
        let ret = match FUNCTION.return_parameter.get(arena, func) {
            Ref::Addr(param) => self.field_text(param, false),
            _ => "void".to_string(),
        };
        let mut params = self.children(func, FUNCTION.parameters);
        params.sort_by_key(|&p| FIELD.offset.get(&self.image.arena, p));
        let params: Vec<String> = params
            .iter()
            .map(|&p| self.field_text(p, true))
            .collect();
        let name = self.image.record_name(func);
        self.line(&format!("{ret} {name}({});", params.join(", ")));
    }

    fn dump_enum(&mut self, en: u64) {
        let name = self.image.record_name(en);
        self.line(&format!("enum {name}"));
        self.line("{");
        self.indent += 1;
        let mut constants = self.children(en, ENUM.constants);
        constants.sort_by_key(|&c| ENUM_CONSTANT.value.get(&self.image.arena, c));
        for constant in constants {
            let name = self.image.record_name(constant);
            let value = ENUM_CONSTANT.value.get(&self.image.arena, constant);
            self.line(&format!("{name} = {value},"));
        }
        self.indent -= 1;
        self.line("};");
    }

    fn dump_template(&mut self, tpl: u64) {
        let name = self.image.record_name(tpl);
        self.line(&format!("template {name}"));
        self.line("{");
        self.indent += 1;
        for instance in self.children(tpl, TEMPLATE.instances) {
            let name = self.image.record_name(instance);
            self.line(&name);
        }
        self.indent -= 1;
        self.line("};");
    }

    fn dump_class(&mut self, cls: u64) {
        let name = self.image.record_name(cls);
        let header = match CLASS.base_class.get(&self.image.arena, cls) {
            Ref::Null => format!("class {name}"),
            base => format!("class {name} : public {}", self.ref_name(base)),
        };
        self.line(&header);
        self.line("{");
        self.indent += 1;

        for nested in self.children(cls, CLASS.classes) {
            self.dump_class(nested);
        }
        let mut fields = self.children(cls, CLASS.fields);
        fields.sort_by_key(|&f| FIELD.offset.get(&self.image.arena, f));
        for field in fields {
            self.dump_field(field);
        }
        for en in self.children(cls, CLASS.enums) {
            self.dump_enum(en);
        }
        for method in self.children(cls, CLASS.methods) {
            self.dump_function(method);
        }
        for tpl in self.children(cls, CLASS.templates) {
            self.dump_template(tpl);
        }

        self.indent -= 1;
        self.line("};");
    }

    fn dump_namespace(&mut self, ns: u64) {
        let name = self.image.record_name(ns);
        let named = !name.is_empty();
        if named {
            self.line(&format!("namespace {name}"));
            self.line("{");
            self.indent += 1;
        }

        for nested in self.children(ns, NAMESPACE.namespaces) {
            self.dump_namespace(nested);
        }
        for cls in self.children(ns, NAMESPACE.classes) {
            self.dump_class(cls);
        }
        for en in self.children(ns, NAMESPACE.enums) {
            self.dump_enum(en);
        }
        for func in self.children(ns, NAMESPACE.functions) {
            self.dump_function(func);
        }
        for tpl in self.children(ns, NAMESPACE.templates) {
            self.dump_template(tpl);
        }

        if named {
            self.indent -= 1;
            self.line("}");
        }
    }
}

/// Render the scope hierarchy rooted at the global namespace.
pub fn dump_text(image: &DatabaseImage) -> String {
    let mut dumper = Dumper {
        image,
        out: String::new(),
        indent: 0,
    };
    dumper.dump_namespace(image.global_namespace());
    dumper.out
}

/// Render the scope hierarchy and write it to `path`.
pub fn dump_to_file(image: &DatabaseImage, path: &std::path::Path) -> std::io::Result<()> {
    std::fs::write(path, dump_text(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::export;
    use reflectdb_core::{Class, Database, Enum, EnumConstant, Field, Modifier, Namespace, Type};

    #[test]
    fn test_dump_renders_scopes() {
        let mut db = Database::new();
        let int = db.add_name("int");
        let game = db.add_name("game");
        let player = db.add_name("game::Player");
        let health = db.add_name("health");
        let state = db.add_name("game::State");
        let idle = db.add_name("game::State::Idle");
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
            size: 4,
            base_class: 0,
        });
        db.fields.push(Field {
            name: health,
            parent: player,
            ty: int,
            modifier: Modifier::Value,
            is_const: false,
            offset: 0,
            parent_unique_id: 0,
        });
        db.enums.push(Enum {
            name: state,
            parent: game,
            size: 4,
        });
        db.enum_constants.push(EnumConstant {
            name: idle,
            parent: state,
            value: 0,
        });

        let (image, report) = export(&db);
        assert!(report.is_ok());
        let text = dump_text(&image);
        assert!(text.contains("namespace game"));
        assert!(text.contains("class game::Player"));
        assert!(text.contains("int health;"));
        assert!(text.contains("enum game::State"));
        assert!(text.contains("game::State::Idle = 0,"));
    }
}
