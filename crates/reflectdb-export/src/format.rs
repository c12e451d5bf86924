//! On-disk blob format
//!
//! Little-endian throughout. The file opens with a four-word header
//! (schema count, total reference-offset count, relocation count, data
//! size), followed by the raw data image, the schema table, the flattened
//! reference-offset table, and the packed relocation entries. A consumer
//! maps or reads the file, then rebases every recorded reference cell by
//! the address it placed the data at.

use crate::arena::Arena;
use crate::relocate::{PtrRelocation, PtrRelocator, PtrSchema, SchemaHandle};
use thiserror::Error;

/// Byte size of the fixed header.
const HEADER_SIZE: usize = 32;
/// Byte size of one schema table entry.
const SCHEMA_ENTRY_SIZE: usize = 24;
/// Byte size of one packed relocation entry.
const RELOCATION_ENTRY_SIZE: usize = 16;

/// Errors decoding a blob.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The input ends before the structure it promises.
    #[error("blob truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes the current structure requires.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// A relocation names a schema the table does not contain.
    #[error("relocation references schema {handle} of {count}")]
    BadSchemaHandle {
        /// The out-of-range handle.
        handle: u32,
        /// Number of schemas in the table.
        count: u32,
    },
    /// A schema's offset range lies outside the offset table.
    #[error("schema offset range {index}..{index_end} exceeds table of {count}")]
    BadOffsetRange {
        /// First offset index claimed.
        index: u64,
        /// One past the last offset index claimed.
        index_end: u64,
        /// Offsets actually present.
        count: u64,
    },
    /// A relocated cell lies outside the data image.
    #[error("relocation touches offset {offset} outside data of {size} bytes")]
    OutOfBounds {
        /// Offending cell offset.
        offset: u64,
        /// Data image size.
        size: u64,
    },
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if self.bytes.len() - self.at < len {
            return Err(FormatError::Truncated {
                needed: len,
                have: self.bytes.len() - self.at,
            });
        }
        let slice = &self.bytes[self.at..self.at + len];
        self.at += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

/// Serialize the finished, already-normalized image and its relocation
/// tables into one blob.
pub fn encode_blob(arena: &Arena, relocator: &PtrRelocator) -> Vec<u8> {
    let schemas = relocator.schemas();
    let relocations = relocator.relocations();
    let nb_offsets = relocator.nb_ptr_offsets();

    let total = HEADER_SIZE
        + arena.len() as usize
        + schemas.len() * SCHEMA_ENTRY_SIZE
        + nb_offsets * 8
        + relocations.len() * RELOCATION_ENTRY_SIZE;
    let mut out = Vec::with_capacity(total);

    out.extend_from_slice(&(schemas.len() as u64).to_le_bytes());
    out.extend_from_slice(&(nb_offsets as u64).to_le_bytes());
    out.extend_from_slice(&(relocations.len() as u64).to_le_bytes());
    out.extend_from_slice(&arena.len().to_le_bytes());

    out.extend_from_slice(arena.as_bytes());

    // Schema entries index into the flattened offset table that follows.
    let mut index = 0u64;
    for schema in schemas {
        out.extend_from_slice(&schema.stride.to_le_bytes());
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&(schema.ptr_offsets.len() as u64).to_le_bytes());
        index += schema.ptr_offsets.len() as u64;
    }
    for schema in schemas {
        for &off in &schema.ptr_offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
    }

    for reloc in relocations {
        out.extend_from_slice(&reloc.schema.0.to_le_bytes());
        out.extend_from_slice(&reloc.offset.to_le_bytes());
        out.extend_from_slice(&reloc.nb_objects.to_le_bytes());
    }

    debug_assert_eq!(out.len(), total);
    out
}

/// A decoded blob, ready to rebase.
#[derive(Debug)]
pub struct LoadedBlob {
    /// The raw data image.
    pub data: Vec<u8>,
    /// Schema table, indexed by relocation handles.
    pub schemas: Vec<PtrSchema>,
    /// Relocation entries.
    pub relocations: Vec<PtrRelocation>,
}

impl LoadedBlob {
    /// Add `base` to every nonzero recorded reference cell, with wrapping
    /// arithmetic so a negated base undoes a previous call exactly.
    pub fn apply_base(&mut self, base: u64) {
        for reloc in &self.relocations {
            let schema = &self.schemas[reloc.schema.0 as usize];
            for i in 0..reloc.nb_objects as u64 {
                let record = reloc.offset + i * schema.stride;
                for &ptr_offset in &schema.ptr_offsets {
                    let at = (record + ptr_offset) as usize;
                    let cell = u64::from_le_bytes(self.data[at..at + 8].try_into().unwrap());
                    if cell != 0 {
                        self.data[at..at + 8]
                            .copy_from_slice(&cell.wrapping_add(base).to_le_bytes());
                    }
                }
            }
        }
    }
}

/// Parse and validate a blob. Every relocation is bounds-checked here so
/// [`LoadedBlob::apply_base`] never touches memory outside the data image.
pub fn decode_blob(bytes: &[u8]) -> Result<LoadedBlob, FormatError> {
    let mut r = Reader::new(bytes);
    let nb_schemas = r.u64()?;
    let nb_offsets = r.u64()?;
    let nb_relocations = r.u64()?;
    let data_size = r.u64()?;

    let data = r.take(data_size as usize)?.to_vec();

    // Counts come straight from the header; each loop below is bounded by a
    // `Truncated` check per element, so nothing is preallocated from them.
    let mut entries = Vec::new();
    for _ in 0..nb_schemas {
        let stride = r.u64()?;
        let index = r.u64()?;
        let count = r.u64()?;
        entries.push((stride, index, count));
    }
    let mut offsets = Vec::new();
    for _ in 0..nb_offsets {
        offsets.push(r.u64()?);
    }

    let mut schemas = Vec::new();
    for (stride, index, count) in entries {
        let index_end = index
            .checked_add(count)
            .filter(|&end| end <= nb_offsets)
            .ok_or(FormatError::BadOffsetRange {
                index,
                index_end: index.saturating_add(count),
                count: nb_offsets,
            })?;
        schemas.push(PtrSchema {
            stride,
            ptr_offsets: offsets[index as usize..index_end as usize].to_vec(),
        });
    }

    let mut relocations = Vec::new();
    for _ in 0..nb_relocations {
        let handle = r.u32()?;
        let offset = r.u64()?;
        let nb_objects = r.u32()?;
        if handle as usize >= schemas.len() {
            return Err(FormatError::BadSchemaHandle {
                handle,
                count: schemas.len() as u32,
            });
        }
        let schema = &schemas[handle as usize];
        if nb_objects > 0 {
            let last_record = (nb_objects as u64 - 1)
                .checked_mul(schema.stride)
                .and_then(|span| offset.checked_add(span));
            for &ptr_offset in &schema.ptr_offsets {
                let cell = last_record.and_then(|rec| rec.checked_add(ptr_offset));
                let end = cell.and_then(|cell| cell.checked_add(8));
                if end.is_none() || end.unwrap() > data_size {
                    return Err(FormatError::OutOfBounds {
                        offset: cell.unwrap_or(u64::MAX),
                        size: data_size,
                    });
                }
            }
        }
        relocations.push(PtrRelocation {
            schema: SchemaHandle(handle),
            offset,
            nb_objects,
        });
    }

    Ok(LoadedBlob {
        data,
        schemas,
        relocations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutBuilder, Ref};

    fn sample() -> (Arena, PtrRelocator) {
        let mut b = LayoutBuilder::new("rec");
        let link = b.reference();
        b.u64();
        let layout = b.finish();

        let mut arena = Arena::new();
        arena.alloc(16, 8);
        let run = arena.alloc_array(layout.size, 2);
        link.set(&mut arena, run, Ref::Addr(run + layout.size));
        link.set(&mut arena, run + layout.size, Ref::Null);

        let mut relocator = PtrRelocator::new();
        let schema = relocator.add_schema(&layout);
        relocator.add_pointers(schema, run, 2);
        relocator.make_relative(&mut arena);
        (arena, relocator)
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let (arena, relocator) = sample();
        let blob = encode_blob(&arena, &relocator);
        let loaded = decode_blob(&blob).unwrap();
        assert_eq!(loaded.data, arena.as_bytes());
        assert_eq!(loaded.schemas, relocator.schemas());
        assert_eq!(loaded.relocations, relocator.relocations());
    }

    #[test]
    fn test_apply_base_round_trips() {
        let (arena, relocator) = sample();
        let blob = encode_blob(&arena, &relocator);
        let mut loaded = decode_blob(&blob).unwrap();
        let original = loaded.data.clone();

        let base = 0x7f00_0000_1000u64;
        loaded.apply_base(base);
        assert_ne!(loaded.data, original);
        // The null cell in the second record must stay null.
        let run = 16u64;
        let stride = relocator.schemas()[0].stride;
        let at = (run + stride) as usize;
        assert_eq!(
            u64::from_le_bytes(loaded.data[at..at + 8].try_into().unwrap()),
            0
        );

        loaded.apply_base(base.wrapping_neg());
        assert_eq!(loaded.data, original);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let (arena, relocator) = sample();
        let blob = encode_blob(&arena, &relocator);
        let err = decode_blob(&blob[..blob.len() - 4]).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }));
        let err = decode_blob(&blob[..16]).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }));
    }

    #[test]
    fn test_bad_schema_handle_is_rejected() {
        let (arena, relocator) = sample();
        let mut blob = encode_blob(&arena, &relocator);
        // The relocation entry is last; corrupt its schema handle.
        let at = blob.len() - RELOCATION_ENTRY_SIZE;
        blob[at..at + 4].copy_from_slice(&99u32.to_le_bytes());
        let err = decode_blob(&blob).unwrap_err();
        assert!(matches!(err, FormatError::BadSchemaHandle { handle: 99, .. }));
    }

    #[test]
    fn test_overflowing_offset_range_is_rejected() {
        let (arena, relocator) = sample();
        let mut blob = encode_blob(&arena, &relocator);
        // The schema table follows the data image; push the entry's offset
        // index to the top of the u64 range so index + count wraps.
        let at = HEADER_SIZE + arena.len() as usize + 8;
        blob[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = decode_blob(&blob).unwrap_err();
        assert!(matches!(err, FormatError::BadOffsetRange { .. }));
    }

    #[test]
    fn test_out_of_bounds_relocation_is_rejected() {
        let (arena, relocator) = sample();
        let mut blob = encode_blob(&arena, &relocator);
        let at = blob.len() - RELOCATION_ENTRY_SIZE + 4;
        blob[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes()[..8]);
        let err = decode_blob(&blob).unwrap_err();
        assert!(matches!(err, FormatError::OutOfBounds { .. }));
    }
}
