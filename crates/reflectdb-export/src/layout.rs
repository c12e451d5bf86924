//! Reference cells and record layout descriptors
//!
//! Every cross-reference in the memory image lives in a 64-bit cell with
//! three statically distinguishable states: null, an unresolved name hash,
//! or a resolved arena offset. Build stages manipulate the decoded [`Ref`]
//! enum, which makes it impossible to dereference a hash that linking has
//! not replaced yet.
//!
//! Record shapes are declared once through [`LayoutBuilder`], which assigns
//! little-endian field offsets and records the byte offset of every
//! reference-valued field. Embedding a base layout at offset zero inherits
//! its reference offsets transitively, so derived records never restate
//! them; the relocation schema registry snapshots the finished [`Layout`]s.

use crate::arena::Arena;

/// Tag bit marking a reference cell that still holds a name hash.
const UNRESOLVED_BIT: u64 = 1 << 63;

/// Decoded state of a reference cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ref {
    /// No target.
    Null,
    /// Awaiting linking; carries the target's name hash.
    Unresolved(u32),
    /// Resolved to a byte offset from the arena base.
    Addr(u64),
}

impl Ref {
    /// Decode a raw 64-bit cell.
    pub fn from_bits(bits: u64) -> Self {
        if bits == 0 {
            Ref::Null
        } else if bits & UNRESOLVED_BIT != 0 {
            Ref::Unresolved(bits as u32)
        } else {
            Ref::Addr(bits)
        }
    }

    /// Encode into the raw 64-bit cell form.
    pub fn to_bits(self) -> u64 {
        match self {
            Ref::Null => 0,
            Ref::Unresolved(hash) => UNRESOLVED_BIT | hash as u64,
            Ref::Addr(offset) => {
                // Offset 0 is the database root, which nothing references.
                debug_assert!(offset != 0 && offset & UNRESOLVED_BIT == 0);
                offset
            }
        }
    }

    /// Encode into the on-disk form: unresolved cells degrade to their bare
    /// hash value so a debugger can still see what failed to link.
    pub fn to_wire(self) -> u64 {
        match self {
            Ref::Null => 0,
            Ref::Unresolved(hash) => hash as u64,
            Ref::Addr(offset) => offset,
        }
    }

    /// The resolved offset, if any.
    pub fn addr(self) -> Option<u64> {
        match self {
            Ref::Addr(offset) => Some(offset),
            _ => None,
        }
    }

    /// Build a reference from an optional source-database hash, where hash
    /// `0` means "none".
    pub fn from_hash(hash: u32) -> Self {
        if hash == 0 {
            Ref::Null
        } else {
            Ref::Unresolved(hash)
        }
    }
}

/// A `u32` field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldU32(u64);

impl FieldU32 {
    /// Read the field of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> u32 {
        arena.read_u32(base + self.0)
    }

    /// Write the field of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, value: u32) {
        arena.write_u32(base + self.0, value);
    }
}

/// An `i32` field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldI32(u64);

impl FieldI32 {
    /// Read the field of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> i32 {
        arena.read_i32(base + self.0)
    }

    /// Write the field of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, value: i32) {
        arena.write_i32(base + self.0, value);
    }
}

/// A `u64` field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldU64(u64);

impl FieldU64 {
    /// Read the field of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> u64 {
        arena.read_u64(base + self.0)
    }

    /// Write the field of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, value: u64) {
        arena.write_u64(base + self.0, value);
    }
}

/// An `f64` field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldF64(u64);

impl FieldF64 {
    /// Read the field of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> f64 {
        arena.read_f64(base + self.0)
    }

    /// Write the field of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, value: f64) {
        arena.write_f64(base + self.0, value);
    }
}

/// A reference cell at a fixed offset inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef(u64);

impl FieldRef {
    /// Read and decode the cell of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> Ref {
        Ref::from_bits(arena.read_u64(base + self.0))
    }

    /// Encode and write the cell of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, value: Ref) {
        arena.write_u64(base + self.0, value.to_bits());
    }
}

/// Byte size of an owned-array header: data reference plus `u32` length.
pub const ARRAY_HEADER_SIZE: u64 = 16;

/// Size of one element in a child array (a single reference cell).
pub const ARRAY_ELEM_SIZE: u64 = 8;

/// An owned-array header at a fixed offset inside a record.
///
/// The data member sits at relative offset zero for every array, the uniform
/// "array data offset" the relocation schemas rely on.
#[derive(Debug, Clone, Copy)]
pub struct FieldArray(u64);

impl FieldArray {
    /// Read the array header of the record at `base`.
    pub fn get(self, arena: &Arena, base: u64) -> (Ref, u32) {
        let data = Ref::from_bits(arena.read_u64(base + self.0));
        let len = arena.read_u32(base + self.0 + 8);
        (data, len)
    }

    /// Write the array header of the record at `base`.
    pub fn set(self, arena: &mut Arena, base: u64, data: Ref, len: u32) {
        arena.write_u64(base + self.0, data.to_bits());
        arena.write_u32(base + self.0 + 8, len);
    }

    /// Overwrite only the length, used when extraction shrinks an array.
    pub fn set_len(self, arena: &mut Arena, base: u64, len: u32) {
        arena.write_u32(base + self.0 + 8, len);
    }
}

/// Read element `index` of a child array whose data run starts at `data`.
pub fn array_elem(arena: &Arena, data: u64, index: u32) -> Ref {
    Ref::from_bits(arena.read_u64(data + index as u64 * ARRAY_ELEM_SIZE))
}

/// Write element `index` of a child array whose data run starts at `data`.
pub fn set_array_elem(arena: &mut Arena, data: u64, index: u32, value: Ref) {
    arena.write_u64(data + index as u64 * ARRAY_ELEM_SIZE, value.to_bits());
}

/// An embedded name: hash plus a reference into the name text blob.
#[derive(Debug, Clone, Copy)]
pub struct NameField {
    /// The 32-bit name hash.
    pub hash: FieldU32,
    /// Reference to the null-terminated text.
    pub text: FieldRef,
}

/// A finished record shape: total size and every reference-valued offset.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Record name, for diagnostics.
    pub name: &'static str,
    /// Record stride in bytes, rounded up to 8.
    pub size: u64,
    /// Byte offsets of every reference cell in the record, including those
    /// inherited from embedded base layouts.
    pub ptr_offsets: Vec<u64>,
}

/// Sequential builder for a record layout.
#[derive(Debug)]
pub struct LayoutBuilder {
    name: &'static str,
    cursor: u64,
    ptr_offsets: Vec<u64>,
}

impl LayoutBuilder {
    /// Start a new layout.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cursor: 0,
            ptr_offsets: Vec::new(),
        }
    }

    fn align_to(&mut self, align: u64) {
        let mask = align - 1;
        self.cursor = (self.cursor + mask) & !mask;
    }

    /// Embed another layout at the current position, inheriting its
    /// reference offsets. Embedding at offset zero is how derived records
    /// extend a base record.
    pub fn embed(&mut self, base: &Layout) -> u64 {
        self.align_to(8);
        let at = self.cursor;
        self.ptr_offsets
            .extend(base.ptr_offsets.iter().map(|off| off + at));
        self.cursor += base.size;
        at
    }

    /// Append a `u32` field.
    pub fn u32(&mut self) -> FieldU32 {
        self.align_to(4);
        let field = FieldU32(self.cursor);
        self.cursor += 4;
        field
    }

    /// Append an `i32` field.
    pub fn i32(&mut self) -> FieldI32 {
        self.align_to(4);
        let field = FieldI32(self.cursor);
        self.cursor += 4;
        field
    }

    /// Append a `u64` field.
    pub fn u64(&mut self) -> FieldU64 {
        self.align_to(8);
        let field = FieldU64(self.cursor);
        self.cursor += 8;
        field
    }

    /// Append an `f64` field.
    pub fn f64(&mut self) -> FieldF64 {
        self.align_to(8);
        let field = FieldF64(self.cursor);
        self.cursor += 8;
        field
    }

    /// Append a reference cell, recording its offset for relocation.
    pub fn reference(&mut self) -> FieldRef {
        self.align_to(8);
        let field = FieldRef(self.cursor);
        self.ptr_offsets.push(self.cursor);
        self.cursor += 8;
        field
    }

    /// Append an owned-array header; its data member is a relocatable
    /// reference.
    pub fn array(&mut self) -> FieldArray {
        self.align_to(8);
        let field = FieldArray(self.cursor);
        self.ptr_offsets.push(self.cursor);
        self.cursor += ARRAY_HEADER_SIZE;
        field
    }

    /// Append an embedded name (hash + text reference).
    pub fn name_field(&mut self) -> NameField {
        self.align_to(8);
        let hash = self.u32();
        let text = self.reference();
        NameField { hash, text }
    }

    /// Finish the layout, rounding the size up to 8 bytes.
    pub fn finish(mut self) -> Layout {
        self.align_to(8);
        Layout {
            name: self.name,
            size: self.cursor,
            ptr_offsets: self.ptr_offsets,
        }
    }
}
