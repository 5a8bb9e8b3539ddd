//! Keyed list reconciliation.
//!
//! Per update the target is the freshly computed (key, directive) sequence;
//! the prior state is the keyed map plus the ordering the tree currently
//! has. A single cursor sweeps left to right over the target:
//!
//! 1. consecutive unknown keys are rendered fresh and inserted as one batch
//!    after the cursor;
//! 2. a known key extends into a run while following target keys continue
//!    the prior ordering *and* the runs' node ranges are still adjacent in
//!    the tree — a block both orders share. Every matched directive gets an
//!    in-place `update()`;
//! 3. if the block is not already at the cursor, the smaller of the two
//!    candidate spans moves: the prefix gap between cursor and block, or
//!    the block itself. Either way it is one range splice, so the cost is
//!    bounded by the smaller span. Ties move the block;
//! 4. keys absent from the target are deleted at the end, through an
//!    offscreen holder when the removal is large;
//! 5. the ordering indexes are rebuilt from the target.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::trace;

use crate::directive::{classify, Directive};
use crate::dom::{Document, NodeId};
use crate::error::Error;
use crate::value::{Key, Value};

/// Removals touching more nodes than this detach the parent region into an
/// offscreen holder first.
const BULK_DETACH_THRESHOLD: usize = 16;

pub(crate) struct ListEntry {
    directive: Directive,
    /// The entry's contiguous, currently attached node range
    range: Vec<NodeId>,
}

#[derive(Default)]
struct SweepStats {
    inserted: usize,
    moved: usize,
}

pub(crate) struct ListState {
    items: Rc<Vec<Value>>,
    anchor: Option<NodeId>,
    keyed: HashMap<Key, ListEntry>,
    /// Key by position, reflecting the range's current arrangement
    order: Vec<Key>,
    /// Position by key
    pos: HashMap<Key, usize>,
}

impl ListState {
    pub(crate) fn new(items: Rc<Vec<Value>>) -> Self {
        Self {
            items,
            anchor: None,
            keyed: HashMap::new(),
            order: Vec::new(),
            pos: HashMap::new(),
        }
    }

    pub(crate) fn items(&self) -> Rc<Vec<Value>> {
        self.items.clone()
    }

    pub(crate) fn set_items(&mut self, items: Rc<Vec<Value>>) {
        self.items = items;
    }

    /// Anchor plus every child range, in tree order.
    pub(crate) fn full_range(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(anchor) = self.anchor {
            out.push(anchor);
        }
        for key in &self.order {
            if let Some(entry) = self.keyed.get(key) {
                out.extend(entry.range.iter().copied());
            }
        }
        out
    }

    pub(crate) fn render(
        &mut self,
        doc: &Document,
        host: NodeId,
        anchor_label: &str,
    ) -> Result<Vec<NodeId>, Error> {
        let anchor = doc.create_comment(anchor_label);
        doc.replace_with(host, anchor);
        self.anchor = Some(anchor);
        self.keyed.clear();
        self.order.clear();
        self.pos.clear();

        let items = self.items.clone();
        let mut seen: HashSet<Key> = HashSet::new();
        let mut cursor = anchor;

        for item in items.iter() {
            let mut directive = classify(item.clone());
            let key = unique_key(&mut directive, doc, &mut seen);

            let slot = doc.create_comment("");
            doc.insert_after(cursor, slot);
            if let Err(err) = directive.render(doc, slot) {
                doc.discard(slot);
                return Err(err);
            }
            let range = directive.full_range();
            if !range.contains(&slot) {
                doc.discard(slot);
            }
            if let Some(&last) = range.last() {
                cursor = last;
            }

            self.pos.insert(key.clone(), self.order.len());
            self.order.push(key.clone());
            self.keyed.insert(key, ListEntry { directive, range });
        }

        Ok(vec![anchor])
    }

    pub(crate) fn update(&mut self, doc: &Document) -> Result<(), Error> {
        let Some(anchor) = self.anchor else {
            return Ok(());
        };

        // Classify the target up front. Matched keys keep their existing
        // directive; the fresh classification is discarded for them.
        let items = self.items.clone();
        let mut seen: HashSet<Key> = HashSet::new();
        let mut target: Vec<(Key, Option<Directive>)> = Vec::with_capacity(items.len());
        for item in items.iter() {
            let mut directive = classify(item.clone());
            let key = unique_key(&mut directive, doc, &mut seen);
            if self.keyed.contains_key(&key) {
                target.push((key, None));
            } else {
                target.push((key, Some(directive)));
            }
        }

        let mut new_keyed: HashMap<Key, ListEntry> = HashMap::with_capacity(target.len());
        let mut new_order: Vec<Key> = Vec::with_capacity(target.len());
        let mut stats = SweepStats::default();

        let result = self.sweep(doc, anchor, target, &mut new_keyed, &mut new_order, &mut stats);

        let mut removed_nodes = 0;
        if result.is_ok() {
            // Keys absent from the target: delete their owned ranges.
            let stale: Vec<ListEntry> = self.keyed.drain().map(|(_, e)| e).collect();
            removed_nodes = stale.iter().map(|e| e.range.len()).sum();
            match doc.parent(anchor) {
                Some(region) if removed_nodes > BULK_DETACH_THRESHOLD => {
                    doc.detached_region(region, |doc| discard_entries(doc, stale));
                }
                _ => discard_entries(doc, stale),
            }
        } else {
            // No rollback on a failed sweep: unprocessed survivors keep
            // their nodes and follow the processed prefix in the ordering.
            let order = std::mem::take(&mut self.order);
            for key in order {
                if let Some(entry) = self.keyed.remove(&key) {
                    new_order.push(key.clone());
                    new_keyed.insert(key, entry);
                }
            }
        }

        self.keyed = new_keyed;
        self.pos = new_order
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        self.order = new_order;

        trace!(
            inserted = stats.inserted,
            moved = stats.moved,
            removed = removed_nodes,
            items = self.order.len(),
            "list reconciled"
        );
        result
    }

    fn sweep(
        &mut self,
        doc: &Document,
        anchor: NodeId,
        mut target: Vec<(Key, Option<Directive>)>,
        new_keyed: &mut HashMap<Key, ListEntry>,
        new_order: &mut Vec<Key>,
        stats: &mut SweepStats,
    ) -> Result<(), Error> {
        let mut cursor = anchor;
        let mut i = 0;

        while i < target.len() {
            if target[i].1.is_some() {
                // --- run of new items: render fresh, insert as one batch ---
                let fragment = doc.create_element("#fragment");
                let mut batch: Vec<NodeId> = Vec::new();
                while i < target.len() {
                    let Some(mut directive) = target[i].1.take() else {
                        break;
                    };
                    let key = target[i].0.clone();

                    let slot = doc.create_comment("");
                    doc.append_child(fragment, slot);
                    if let Err(err) = directive.render(doc, slot) {
                        // Commit what rendered so far, then bail.
                        doc.insert_all_after(cursor, &batch);
                        doc.discard(fragment);
                        return Err(err);
                    }
                    let range = directive.full_range();
                    if !range.contains(&slot) {
                        doc.discard(slot);
                    }
                    batch.extend(range.iter().copied());
                    new_order.push(key.clone());
                    new_keyed.insert(key, ListEntry { directive, range });
                    i += 1;
                }
                doc.insert_all_after(cursor, &batch);
                doc.discard(fragment);
                stats.inserted += batch.len();
                if let Some(&last) = batch.last() {
                    cursor = last;
                }
            } else {
                // --- matched run: maximal block common to both orders ---
                let first_key = target[i].0.clone();
                let start_pos = match self.pos.get(&first_key) {
                    Some(&p) => p,
                    None => usize::MAX, // desynced ordering; treat as a lone match
                };

                let mut n = 1;
                if start_pos != usize::MAX {
                    let mut prev_last = self
                        .keyed
                        .get(&first_key)
                        .and_then(|e| e.range.last().copied());
                    while i + n < target.len() && target[i + n].1.is_none() {
                        let key = &target[i + n].0;
                        let Some(&p) = self.pos.get(key) else { break };
                        if p != start_pos + n {
                            break;
                        }
                        let Some(entry) = self.keyed.get(key) else {
                            break;
                        };
                        let adjacent = match (prev_last, entry.range.first()) {
                            (Some(last), Some(&first)) => doc.prev_sibling(first) == Some(last),
                            _ => false,
                        };
                        if !adjacent {
                            break;
                        }
                        prev_last = entry.range.last().copied();
                        n += 1;
                    }
                }

                // Update every matched directive in place; content may
                // change even when identity and order are unchanged.
                let mut block: Vec<NodeId> = Vec::new();
                let mut failed: Option<Error> = None;
                for j in 0..n {
                    let key = target[i + j].0.clone();
                    let Some(mut entry) = self.keyed.remove(&key) else {
                        continue;
                    };
                    let step = entry.directive.update(doc);
                    entry.range = entry.directive.full_range();
                    block.extend(entry.range.iter().copied());
                    new_order.push(key.clone());
                    new_keyed.insert(key, entry);
                    if let Err(err) = step {
                        failed = Some(err);
                        break;
                    }
                }
                if let Some(err) = failed {
                    return Err(err);
                }

                let Some(&block_first) = block.first() else {
                    i += n;
                    continue;
                };
                let block_last = block[block.len() - 1];

                if doc.next_sibling(cursor) != Some(block_first) {
                    // Walk the prefix gap, giving up once it cannot be the
                    // smaller side; the walk is then bounded by the block.
                    let block_len = block.len();
                    let mut gap: Vec<NodeId> = Vec::new();
                    let mut probe = doc.next_sibling(cursor);
                    while let Some(node) = probe {
                        if node == block_first || gap.len() > block_len {
                            break;
                        }
                        gap.push(node);
                        probe = doc.next_sibling(node);
                    }

                    if probe == Some(block_first) && !gap.is_empty() && gap.len() < block_len {
                        // The gap is strictly smaller: shift it past the block.
                        doc.move_range_after(gap[0], gap[gap.len() - 1], block_last);
                        stats.moved += gap.len();
                    } else {
                        doc.move_range_after(block_first, block_last, cursor);
                        stats.moved += block_len;
                    }
                }

                cursor = block_last;
                i += n;
            }
        }

        Ok(())
    }

    /// Release all keyed children. The anchor itself belongs to the caller.
    pub(crate) fn dispose(&mut self, doc: &Document) {
        let entries: Vec<ListEntry> = self.keyed.drain().map(|(_, e)| e).collect();
        discard_entries(doc, entries);
        self.order.clear();
        self.pos.clear();
    }
}

fn discard_entries(doc: &Document, entries: Vec<ListEntry>) {
    for mut entry in entries {
        entry.directive.dispose(doc);
        for node in entry.range {
            doc.discard(node);
        }
    }
}

/// The item's matching key, de-duplicated within one pass. A repeated key
/// falls back to the fresh directive's own identity, behaving like an
/// unkeyed item.
fn unique_key(directive: &mut Directive, doc: &Document, seen: &mut HashSet<Key>) -> Key {
    let mut key = directive.identity_key(doc.ids());
    if !seen.insert(key.clone()) {
        key = Key::from(directive.ensure_id(doc.ids()));
        seen.insert(key.clone());
    }
    key
}
