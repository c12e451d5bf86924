//! Parenting and reference linking
//!
//! Both passes run over records whose cross-references still hold unresolved
//! name hashes. Parenting groups children under the records that own them
//! and allocates the owners' child arrays; linking patches single reference
//! cells against a prepared target table. Cells that stay unresolved are
//! left for the verify pass to report.

use crate::arena::Arena;
use crate::image::{Run, PRIMITIVE};
use crate::layout::{set_array_elem, FieldArray, FieldRef, Ref, ARRAY_ELEM_SIZE};
use rustc_hash::FxHashMap;

/// Predicate accepting any parent whose name hash matches the child's
/// recorded parent hash.
pub fn any_parent(_arena: &Arena, _parent: u64, _child: u64) -> bool {
    true
}

/// Attach `children` to the records of `parents` that claim them, filling
/// the `array` member of each matching parent.
///
/// A child is claimed when its parent cell holds the hash of a parent's
/// name and `matches(arena, parent, child)` accepts the pair; among parents
/// sharing a hash, the first accepted one in run order wins. Claimed
/// children get their parent cell resolved and are appended to the parent's
/// array in child order. Children already resolved by an earlier pass are
/// left alone.
pub fn parent_children(
    arena: &mut Arena,
    parents: Run,
    array: FieldArray,
    children: &[u64],
    matches: impl Fn(&Arena, u64, u64) -> bool,
) {
    // Parents grouped by name hash, preserving run order within a group.
    let mut by_hash: FxHashMap<u32, Vec<u64>> = FxHashMap::default();
    for parent in parents.iter() {
        let hash = PRIMITIVE.name.hash.get(arena, parent);
        by_hash.entry(hash).or_default().push(parent);
    }

    // Resolve each child to its owner and count per-parent children.
    let mut resolved: Vec<Option<u64>> = vec![None; children.len()];
    let mut counts: FxHashMap<u64, u32> = FxHashMap::default();
    for (i, &child) in children.iter().enumerate() {
        let hash = match PRIMITIVE.parent.get(arena, child) {
            Ref::Unresolved(hash) => hash,
            _ => continue,
        };
        let Some(candidates) = by_hash.get(&hash) else {
            continue;
        };
        for &parent in candidates {
            if matches(arena, parent, child) {
                resolved[i] = Some(parent);
                *counts.entry(parent).or_insert(0) += 1;
                break;
            }
        }
    }

    // Allocate exact-size child arrays, in parent run order so layout stays
    // deterministic.
    let mut cursors: FxHashMap<u64, (u64, u32)> = FxHashMap::default();
    for parent in parents.iter() {
        let Some(&count) = counts.get(&parent) else {
            continue;
        };
        let data = arena.alloc_array(ARRAY_ELEM_SIZE, count as u64);
        array.set(arena, parent, Ref::Addr(data), count);
        cursors.insert(parent, (data, 0));
    }

    // Fill in child order.
    for (i, &child) in children.iter().enumerate() {
        let Some(parent) = resolved[i] else {
            continue;
        };
        PRIMITIVE.parent.set(arena, child, Ref::Addr(parent));
        let (data, next) = cursors
            .get_mut(&parent)
            .map(|slot| {
                let at = *slot;
                slot.1 += 1;
                at
            })
            .unwrap_or((0, 0));
        set_array_elem(arena, data, next, Ref::Addr(child));
    }
}

/// Build the hash-to-offset table used by [`link_references`], from targets
/// in priority order. When two targets share a hash the earliest one wins.
pub fn build_link_map(arena: &Arena, targets: &[u64]) -> FxHashMap<u32, u64> {
    let mut map = FxHashMap::default();
    for &target in targets {
        let hash = PRIMITIVE.name.hash.get(arena, target);
        map.entry(hash).or_insert(target);
    }
    map
}

/// Resolve the `slot` cell of every record in `records` against `map`.
/// Unmatched hashes stay unresolved.
pub fn link_references(
    arena: &mut Arena,
    records: Run,
    slot: FieldRef,
    map: &FxHashMap<u32, u64>,
) {
    for rec in records.iter() {
        if let Ref::Unresolved(hash) = slot.get(arena, rec) {
            if let Some(&target) = map.get(&hash) {
                slot.set(arena, rec, Ref::Addr(target));
            }
        }
    }
}
