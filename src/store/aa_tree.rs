//!
//! A persisted AA-tree whose nodes live in a Heap
//!
//! Nodes are fixed records `{left, right, level, data[K]}` where K is the
//! fanout declared when the tree is created (1 for sets, 2 for maps). The
//! tree stores offsets only; ordering is delegated to a comparator callback
//! that receives each node's primary payload offset (`data[0]`) and returns
//! how the captured search key compares against the stored key. The tree
//! never sees the key's representation.
//!
//! A small header block `{root, count, fanout, refs}` makes a tree
//! addressable by a single offset, so a tree can be a named root in the
//! heap or the value of another tree's node.
//!

use std::cmp::Ordering;

use crate::error::Result;
use crate::store::heap::Heap;

const F_LEFT:  u64 = 0;
const F_RIGHT: u64 = 8;
const F_LEVEL: u64 = 16;
const F_DATA:  u64 = 24;

const H_ROOT:   u64 = 0;
const H_COUNT:  u64 = 8;
const H_FANOUT: u64 = 16;
const H_REFS:   u64 = 24;

const HEADER_PAYLOAD: u64 = 32;

pub const MAX_FANOUT: u64 = 4;

/// Comparator callback; returns how the search key relates to the stored
/// key whose primary offset is passed in
pub type Cmp<'a> = dyn FnMut(&Heap, u64) -> Result<Ordering> + 'a;

/// Payload initialiser; sees the node's data words exactly once per insert
pub type Init<'a> = dyn FnMut(&mut Heap, &mut [u64]) -> Result<()> + 'a;

/// Payload disposer; sees the removed data words exactly once
pub type Dispose<'a> = dyn FnMut(&mut Heap, &[u64]) -> Result<()> + 'a;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AaTree {
    header: u64,
}

fn level(heap: &Heap, node: u64) -> Result<u64> {
    if node == 0 {
        Ok(0)
    } else {
        heap.read_word(node, F_LEVEL)
    }
}

/// Right rotation when the left child lives on the same level
fn skew(heap: &mut Heap, node: u64) -> Result<u64> {
    if node == 0 {
        return Ok(0);
    }

    let left = heap.read_word(node, F_LEFT)?;
    if left != 0 && level(heap, left)? == level(heap, node)? {
        let left_right = heap.read_word(left, F_RIGHT)?;
        heap.write_word(node, F_LEFT, left_right)?;
        heap.write_word(left, F_RIGHT, node)?;
        return Ok(left);
    }

    Ok(node)
}

/// Left rotation and promotion when two consecutive right links share the
/// node's level
fn split(heap: &mut Heap, node: u64) -> Result<u64> {
    if node == 0 {
        return Ok(0);
    }

    let right = heap.read_word(node, F_RIGHT)?;
    if right == 0 {
        return Ok(node);
    }

    let right_right = heap.read_word(right, F_RIGHT)?;
    if right_right != 0 && level(heap, right_right)? == level(heap, node)? {
        let right_left = heap.read_word(right, F_LEFT)?;
        heap.write_word(node, F_RIGHT, right_left)?;
        heap.write_word(right, F_LEFT, node)?;

        let right_level = heap.read_word(right, F_LEVEL)?;
        heap.write_word(right, F_LEVEL, right_level + 1)?;
        return Ok(right);
    }

    Ok(node)
}


impl AaTree {
    /// Allocates a fresh empty tree with `fanout` data words per node
    pub fn create(heap: &mut Heap, fanout: u64) -> Result<AaTree> {
        assert!(fanout >= 1 && fanout <= MAX_FANOUT, "unsupported fanout {}", fanout);

        let header = heap.alloc(HEADER_PAYLOAD)?;
        heap.write_word(header, H_ROOT, 0)?;
        heap.write_word(header, H_COUNT, 0)?;
        heap.write_word(header, H_FANOUT, fanout)?;
        heap.write_word(header, H_REFS, 1)?;

        Ok(AaTree { header })
    }

    /// Reopens the tree whose header block is at `header`
    pub fn open(header: u64) -> AaTree {
        AaTree { header }
    }

    pub fn offset(&self) -> u64 {
        self.header
    }

    pub fn count(&self, heap: &Heap) -> Result<u64> {
        heap.read_word(self.header, H_COUNT)
    }

    pub fn fanout(&self, heap: &Heap) -> Result<u64> {
        heap.read_word(self.header, H_FANOUT)
    }

    fn root(&self, heap: &Heap) -> Result<u64> {
        heap.read_word(self.header, H_ROOT)
    }

    fn read_data(&self, heap: &Heap, node: u64, fanout: usize) -> Result<Vec<u64>> {
        let mut data = vec![0u64; fanout];
        for (i, word) in data.iter_mut().enumerate() {
            *word = heap.read_word(node, F_DATA + 8 * i as u64)?;
        }
        Ok(data)
    }

    fn write_data(&self, heap: &mut Heap, node: u64, data: &[u64]) -> Result<()> {
        for (i, word) in data.iter().enumerate() {
            heap.write_word(node, F_DATA + 8 * i as u64, *word)?;
        }
        Ok(())
    }


    /*
     * insertion
     */

    /// Finds or creates the node matched by `cmp` and hands its data words
    /// to `init`. On creation the words are zero, so `init` can tell a fresh
    /// slot from an update by testing `data[0]`.
    pub fn insert(&self, heap: &mut Heap, cmp: &mut Cmp, init: &mut Init) -> Result<bool> {
        let fanout = self.fanout(heap)? as usize;
        let root = self.root(heap)?;

        let mut created = false;
        let new_root = self.insert_at(heap, root, fanout, cmp, init, &mut created)?;

        if new_root != root {
            heap.write_word(self.header, H_ROOT, new_root)?;
        }
        if created {
            let count = heap.read_word(self.header, H_COUNT)?;
            heap.write_word(self.header, H_COUNT, count + 1)?;
        }

        Ok(created)
    }

    fn insert_at(
        &self,
        heap: &mut Heap,
        node: u64,
        fanout: usize,
        cmp: &mut Cmp,
        init: &mut Init,
        created: &mut bool,
    ) -> Result<u64> {
        if node == 0 {
            let off = heap.alloc(F_DATA + 8 * fanout as u64)?;
            heap.write_word(off, F_LEFT, 0)?;
            heap.write_word(off, F_RIGHT, 0)?;
            heap.write_word(off, F_LEVEL, 1)?;

            let mut data = vec![0u64; fanout];
            init(heap, &mut data)?;
            self.write_data(heap, off, &data)?;

            *created = true;
            return Ok(off);
        }

        let key = heap.read_word(node, F_DATA)?;
        match cmp(heap, key)? {
            Ordering::Less => {
                let left = heap.read_word(node, F_LEFT)?;
                let new_left = self.insert_at(heap, left, fanout, cmp, init, created)?;
                if new_left != left {
                    heap.write_word(node, F_LEFT, new_left)?;
                }
            }

            Ordering::Greater => {
                let right = heap.read_word(node, F_RIGHT)?;
                let new_right = self.insert_at(heap, right, fanout, cmp, init, created)?;
                if new_right != right {
                    heap.write_word(node, F_RIGHT, new_right)?;
                }
            }

            Ordering::Equal => {
                let mut data = self.read_data(heap, node, fanout)?;
                init(heap, &mut data)?;
                self.write_data(heap, node, &data)?;
                return Ok(node);
            }
        }

        let node = skew(heap, node)?;
        split(heap, node)
    }


    /*
     * removal
     */

    /// Removes the node matched by `cmp`, handing the removed data words to
    /// `dispose` exactly once
    pub fn remove(&self, heap: &mut Heap, cmp: &mut Cmp, dispose: &mut Dispose) -> Result<bool> {
        let fanout = self.fanout(heap)? as usize;
        let root = self.root(heap)?;

        let mut removed = false;
        let new_root = self.remove_at(heap, root, fanout, cmp, dispose, &mut removed)?;

        if new_root != root {
            heap.write_word(self.header, H_ROOT, new_root)?;
        }
        if removed {
            let count = heap.read_word(self.header, H_COUNT)?;
            heap.write_word(self.header, H_COUNT, count - 1)?;
        }

        Ok(removed)
    }

    fn remove_at(
        &self,
        heap: &mut Heap,
        node: u64,
        fanout: usize,
        cmp: &mut Cmp,
        dispose: &mut Dispose,
        removed: &mut bool,
    ) -> Result<u64> {
        if node == 0 {
            return Ok(0);
        }

        let key = heap.read_word(node, F_DATA)?;
        match cmp(heap, key)? {
            Ordering::Less => {
                let left = heap.read_word(node, F_LEFT)?;
                let new_left = self.remove_at(heap, left, fanout, cmp, dispose, removed)?;
                if new_left != left {
                    heap.write_word(node, F_LEFT, new_left)?;
                }
            }

            Ordering::Greater => {
                let right = heap.read_word(node, F_RIGHT)?;
                let new_right = self.remove_at(heap, right, fanout, cmp, dispose, removed)?;
                if new_right != right {
                    heap.write_word(node, F_RIGHT, new_right)?;
                }
            }

            Ordering::Equal => {
                *removed = true;

                let data = self.read_data(heap, node, fanout)?;
                dispose(heap, &data)?;

                let left = heap.read_word(node, F_LEFT)?;
                let right = heap.read_word(node, F_RIGHT)?;

                if left == 0 && right == 0 {
                    heap.free(node)?;
                    return Ok(0);
                }

                // swap in the closest neighbour's payload and structurally
                // delete that neighbour instead
                if left != 0 {
                    let (new_left, moved) = self.take_max(heap, left, fanout)?;
                    heap.write_word(node, F_LEFT, new_left)?;
                    self.write_data(heap, node, &moved)?;
                } else {
                    let (new_right, moved) = self.take_min(heap, right, fanout)?;
                    heap.write_word(node, F_RIGHT, new_right)?;
                    self.write_data(heap, node, &moved)?;
                }
            }
        }

        self.delete_fixup(heap, node)
    }

    /// Unlinks and frees the smallest node of the subtree, returning the new
    /// subtree root and the node's data words untouched
    fn take_min(&self, heap: &mut Heap, node: u64, fanout: usize) -> Result<(u64, Vec<u64>)> {
        let left = heap.read_word(node, F_LEFT)?;

        if left == 0 {
            let data = self.read_data(heap, node, fanout)?;
            let right = heap.read_word(node, F_RIGHT)?;
            heap.free(node)?;
            return Ok((right, data));
        }

        let (new_left, data) = self.take_min(heap, left, fanout)?;
        if new_left != left {
            heap.write_word(node, F_LEFT, new_left)?;
        }

        let node = self.delete_fixup(heap, node)?;
        Ok((node, data))
    }

    fn take_max(&self, heap: &mut Heap, node: u64, fanout: usize) -> Result<(u64, Vec<u64>)> {
        let right = heap.read_word(node, F_RIGHT)?;

        if right == 0 {
            let data = self.read_data(heap, node, fanout)?;
            let left = heap.read_word(node, F_LEFT)?;
            heap.free(node)?;
            return Ok((left, data));
        }

        let (new_right, data) = self.take_max(heap, right, fanout)?;
        if new_right != right {
            heap.write_word(node, F_RIGHT, new_right)?;
        }

        let node = self.delete_fixup(heap, node)?;
        Ok((node, data))
    }

    /// Level decrease plus the skew/split cascade after a removal
    fn delete_fixup(&self, heap: &mut Heap, node: u64) -> Result<u64> {
        if node == 0 {
            return Ok(0);
        }

        let left = heap.read_word(node, F_LEFT)?;
        let right = heap.read_word(node, F_RIGHT)?;

        let should = level(heap, left)?.min(level(heap, right)?) + 1;
        if should < level(heap, node)? {
            heap.write_word(node, F_LEVEL, should)?;
            if right != 0 && should < level(heap, right)? {
                heap.write_word(right, F_LEVEL, should)?;
            }
        }

        let node = skew(heap, node)?;

        let right = heap.read_word(node, F_RIGHT)?;
        if right != 0 {
            let new_right = skew(heap, right)?;
            if new_right != right {
                heap.write_word(node, F_RIGHT, new_right)?;
            }

            let right_right = heap.read_word(new_right, F_RIGHT)?;
            if right_right != 0 {
                let new_rr = skew(heap, right_right)?;
                if new_rr != right_right {
                    heap.write_word(new_right, F_RIGHT, new_rr)?;
                }
            }
        }

        let node = split(heap, node)?;

        let right = heap.read_word(node, F_RIGHT)?;
        if right != 0 {
            let new_right = split(heap, right)?;
            if new_right != right {
                heap.write_word(node, F_RIGHT, new_right)?;
            }
        }

        Ok(node)
    }


    /*
     * lookup
     */

    fn find_node(&self, heap: &Heap, cmp: &mut Cmp) -> Result<u64> {
        let mut node = self.root(heap)?;

        while node != 0 {
            let key = heap.read_word(node, F_DATA)?;
            node = match cmp(heap, key)? {
                Ordering::Less => heap.read_word(node, F_LEFT)?,
                Ordering::Greater => heap.read_word(node, F_RIGHT)?,
                Ordering::Equal => return Ok(node),
            };
        }

        Ok(0)
    }

    /// Read-only lookup of the data words of the matching node
    pub fn search(&self, heap: &Heap, cmp: &mut Cmp) -> Result<Option<Vec<u64>>> {
        let node = self.find_node(heap, cmp)?;
        if node == 0 {
            return Ok(None);
        }

        let fanout = self.fanout(heap)? as usize;
        Ok(Some(self.read_data(heap, node, fanout)?))
    }

    /// Rewrites the data words of the matching node in place
    pub fn update(
        &self,
        heap: &mut Heap,
        cmp: &mut Cmp,
        f: &mut dyn FnMut(&mut [u64]) -> Result<()>,
    ) -> Result<bool> {
        let node = self.find_node(heap, cmp)?;
        if node == 0 {
            return Ok(false);
        }

        let fanout = self.fanout(heap)? as usize;
        let mut data = self.read_data(heap, node, fanout)?;
        f(&mut data)?;
        self.write_data(heap, node, &data)
            .map(|_| true)
    }

    pub fn min(&self, heap: &Heap) -> Result<Option<Vec<u64>>> {
        self.edge(heap, F_LEFT)
    }

    pub fn max(&self, heap: &Heap) -> Result<Option<Vec<u64>>> {
        self.edge(heap, F_RIGHT)
    }

    fn edge(&self, heap: &Heap, side: u64) -> Result<Option<Vec<u64>>> {
        let mut node = self.root(heap)?;
        if node == 0 {
            return Ok(None);
        }

        loop {
            let next = heap.read_word(node, side)?;
            if next == 0 {
                let fanout = self.fanout(heap)? as usize;
                return Ok(Some(self.read_data(heap, node, fanout)?));
            }
            node = next;
        }
    }


    /*
     * traversal
     */

    /// In-order traversal over all nodes
    pub fn iter<'a>(&self, heap: &'a Heap, ascending: bool) -> Result<TreeIter<'a>> {
        let fanout = self.fanout(heap)? as usize;
        let root = self.root(heap)?;

        let mut iter = TreeIter::new(heap, fanout, ascending);
        iter.push_spine(root)?;
        Ok(iter)
    }

    /// Directional traversal starting at the node matched by `cmp_start`.
    ///
    /// With no exact match, an exclusive traversal starts at the first node
    /// past the search key while an inclusive one also brackets the key by
    /// starting one node before it.
    pub fn iter_from<'a>(
        &self,
        heap: &'a Heap,
        cmp_start: &mut Cmp,
        ascending: bool,
        inclusive: bool,
    ) -> Result<TreeIter<'a>> {
        let fanout = self.fanout(heap)? as usize;
        let root = self.root(heap)?;

        let mut iter = TreeIter::new(heap, fanout, ascending);
        iter.seek(root, cmp_start, inclusive)?;
        Ok(iter)
    }

    /// Bounded traversal between two keys; `inclusive` applies to both ends
    pub fn iter_between<'a>(
        &self,
        heap: &'a Heap,
        cmp_low: Box<Cmp<'a>>,
        cmp_high: Box<Cmp<'a>>,
        ascending: bool,
        inclusive: bool,
    ) -> Result<TreeIter<'a>> {
        let (mut start, bound) = if ascending {
            (cmp_low, cmp_high)
        } else {
            (cmp_high, cmp_low)
        };

        let mut iter = self.iter_from(heap, &mut *start, ascending, inclusive)?;
        iter.bound = Some(bound);
        iter.bound_inclusive = inclusive;
        Ok(iter)
    }


    /*
     * teardown and reference counting
     */

    /// Destroys nodes, handing each payload to `dispose`. With `keep`, nodes
    /// whose payload is approved survive together with their blocks and are
    /// relinked into the remaining tree.
    pub fn clear(
        &self,
        heap: &mut Heap,
        dispose: &mut Dispose,
        mut keep: Option<&mut dyn FnMut(&Heap, &[u64]) -> Result<bool>>,
    ) -> Result<()> {
        let fanout = self.fanout(heap)? as usize;
        let root = self.root(heap)?;

        let mut kept = Vec::new();
        self.clear_at(heap, root, fanout, dispose, &mut keep, &mut kept)?;

        // survivors arrive in ascending order; relink them one by one as the
        // new rightmost node, letting split keep the balance
        let mut new_root = 0u64;
        for node in &kept {
            heap.write_word(*node, F_LEFT, 0)?;
            heap.write_word(*node, F_RIGHT, 0)?;
            heap.write_word(*node, F_LEVEL, 1)?;
            new_root = self.relink_max(heap, new_root, *node)?;
        }

        heap.write_word(self.header, H_ROOT, new_root)?;
        heap.write_word(self.header, H_COUNT, kept.len() as u64)
    }

    fn clear_at(
        &self,
        heap: &mut Heap,
        node: u64,
        fanout: usize,
        dispose: &mut Dispose,
        keep: &mut Option<&mut dyn FnMut(&Heap, &[u64]) -> Result<bool>>,
        kept: &mut Vec<u64>,
    ) -> Result<()> {
        if node == 0 {
            return Ok(());
        }

        let left = heap.read_word(node, F_LEFT)?;
        let right = heap.read_word(node, F_RIGHT)?;

        self.clear_at(heap, left, fanout, dispose, keep, kept)?;

        let data = self.read_data(heap, node, fanout)?;
        let keep_it = match *keep {
            Some(ref mut f) => f(heap, &data)?,
            None => false,
        };

        if keep_it {
            kept.push(node);
        } else {
            dispose(heap, &data)?;
            heap.free(node)?;
        }

        self.clear_at(heap, right, fanout, dispose, keep, kept)
    }

    fn relink_max(&self, heap: &mut Heap, root: u64, node: u64) -> Result<u64> {
        if root == 0 {
            return Ok(node);
        }

        let right = heap.read_word(root, F_RIGHT)?;
        let new_right = self.relink_max(heap, right, node)?;
        if new_right != right {
            heap.write_word(root, F_RIGHT, new_right)?;
        }

        let root = skew(heap, root)?;
        split(heap, root)
    }

    /// Clear plus release of the tree header itself
    pub fn destroy(self, heap: &mut Heap, dispose: &mut Dispose) -> Result<()> {
        self.clear(heap, dispose, None)?;
        heap.free(self.header)
    }

    pub fn increase_ref(&self, heap: &mut Heap) -> Result<u64> {
        let refs = heap.read_word(self.header, H_REFS)? + 1;
        heap.write_word(self.header, H_REFS, refs)?;
        Ok(refs)
    }

    pub fn decrease_ref(&self, heap: &mut Heap) -> Result<u64> {
        let refs = heap.read_word(self.header, H_REFS)?;
        assert!(refs > 0, "reference count underflow on tree {}", self.header);

        heap.write_word(self.header, H_REFS, refs - 1)?;
        Ok(refs - 1)
    }
}


pub struct TreeIter<'a> {
    heap:            &'a Heap,
    fanout:          usize,
    ascending:       bool,
    stack:           Vec<u64>,
    prefix:          Option<u64>,
    bound:           Option<Box<dyn FnMut(&Heap, u64) -> Result<Ordering> + 'a>>,
    bound_inclusive: bool,
    overshot:        bool,
    done:            bool,
}

impl<'a> TreeIter<'a> {
    fn new(heap: &'a Heap, fanout: usize, ascending: bool) -> TreeIter<'a> {
        TreeIter {
            heap,
            fanout,
            ascending,
            stack: Vec::new(),
            prefix: None,
            bound: None,
            bound_inclusive: false,
            overshot: false,
            done: false,
        }
    }

    fn push_spine(&mut self, mut node: u64) -> Result<()> {
        let side = if self.ascending { F_LEFT } else { F_RIGHT };

        while node != 0 {
            self.stack.push(node);
            node = self.heap.read_word(node, side)?;
        }
        Ok(())
    }

    fn seek(&mut self, root: u64, cmp: &mut Cmp, inclusive: bool) -> Result<()> {
        let mut node = root;
        let mut bracket = 0u64;

        while node != 0 {
            let key = self.heap.read_word(node, F_DATA)?;
            let ord = cmp(self.heap, key)?;

            match (self.ascending, ord) {
                // stored key lies past the search key; candidate
                (true, Ordering::Less) => {
                    self.stack.push(node);
                    node = self.heap.read_word(node, F_LEFT)?;
                }
                (false, Ordering::Greater) => {
                    self.stack.push(node);
                    node = self.heap.read_word(node, F_RIGHT)?;
                }

                // stored key lies before the search key; remember it as the
                // bracketing neighbour and keep going
                (true, Ordering::Greater) => {
                    bracket = node;
                    node = self.heap.read_word(node, F_RIGHT)?;
                }
                (false, Ordering::Less) => {
                    bracket = node;
                    node = self.heap.read_word(node, F_LEFT)?;
                }

                (_, Ordering::Equal) => {
                    if inclusive {
                        self.stack.push(node);
                    } else if self.ascending {
                        node = self.heap.read_word(node, F_RIGHT)?;
                        continue;
                    } else {
                        node = self.heap.read_word(node, F_LEFT)?;
                        continue;
                    }
                    return Ok(());
                }
            }
        }

        // no exact match; an inclusive traversal also yields the neighbour
        // just before the search key
        if inclusive && bracket != 0 {
            self.prefix = Some(bracket);
        }

        Ok(())
    }

    /// True to yield the node, false to end the traversal
    fn check_bound(&mut self, node: u64) -> Result<bool> {
        let key = self.heap.read_word(node, F_DATA)?;

        let cmp = self.bound.as_mut().unwrap();
        let ord = cmp(self.heap, key)?;

        let past = if self.ascending { Ordering::Less } else { Ordering::Greater };

        if ord == Ordering::Equal {
            if self.bound_inclusive {
                self.overshot = true;
                return Ok(true);
            }
            return Ok(false);
        }

        if ord == past {
            // the first node past an unmatched inclusive bound still
            // brackets the range
            if self.bound_inclusive && !self.overshot {
                self.overshot = true;
                return Ok(true);
            }
            return Ok(false);
        }

        Ok(true)
    }
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = Result<Vec<u64>>;

    fn next(&mut self) -> Option<Result<Vec<u64>>> {
        if self.done {
            return None;
        }

        let node = match self.prefix.take() {
            Some(node) => node,
            None => {
                let node = match self.stack.pop() {
                    Some(node) => node,
                    None => {
                        self.done = true;
                        return None;
                    }
                };

                // queue the rest of this node's subtree
                let side = if self.ascending { F_RIGHT } else { F_LEFT };
                match self.heap.read_word(node, side) {
                    Ok(child) => {
                        if let Err(e) = self.push_spine(child) {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }

                node
            }
        };

        if self.bound.is_some() {
            match self.check_bound(node) {
                Ok(true) => (),
                Ok(false) => {
                    self.done = true;
                    self.stack.clear();
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let mut data = vec![0u64; self.fanout];
        for (i, word) in data.iter_mut().enumerate() {
            match self.heap.read_word(node, F_DATA + 8 * i as u64) {
                Ok(w) => *word = w,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        Some(Ok(data))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::heap::Heap;
    use crate::store::stream::MemoryStream;

    fn test_heap() -> Heap {
        let log = slog::Logger::root(slog::Discard, o!());
        Heap::new(Box::new(MemoryStream::new()), log).unwrap()
    }

    /// Inserts a raw value key; the value itself is stored as data[0]
    fn put(tree: &AaTree, heap: &mut Heap, value: u64) -> bool {
        tree.insert(
            heap,
            &mut move |_, stored| Ok(value.cmp(&stored)),
            &mut move |_, data| {
                data[0] = value;
                Ok(())
            },
        )
        .unwrap()
    }

    fn del(tree: &AaTree, heap: &mut Heap, value: u64) -> bool {
        tree.remove(
            heap,
            &mut move |_, stored| Ok(value.cmp(&stored)),
            &mut |_, _| Ok(()),
        )
        .unwrap()
    }

    fn contents(tree: &AaTree, heap: &Heap, ascending: bool) -> Vec<u64> {
        tree.iter(heap, ascending)
            .unwrap()
            .map(|r| r.unwrap()[0])
            .collect()
    }

    /// Checks the AA level rules and the ordering of the whole tree
    fn validate(tree: &AaTree, heap: &Heap) {
        fn walk(heap: &Heap, node: u64, lo: Option<u64>, hi: Option<u64>) -> u64 {
            if node == 0 {
                return 0;
            }

            let key = heap.read_word(node, F_DATA).unwrap();
            assert!(lo.map_or(true, |lo| key > lo), "order violated");
            assert!(hi.map_or(true, |hi| key < hi), "order violated");

            let lvl = heap.read_word(node, F_LEVEL).unwrap();
            let left = heap.read_word(node, F_LEFT).unwrap();
            let right = heap.read_word(node, F_RIGHT).unwrap();

            let left_lvl = walk(heap, left, lo, Some(key));
            let right_lvl = walk(heap, right, Some(key), hi);

            assert_eq!(left_lvl + 1, lvl, "left child must live one level down");
            assert!(right_lvl == lvl || right_lvl + 1 == lvl, "right child out of range");

            if right != 0 {
                let rr = heap.read_word(right, F_RIGHT).unwrap();
                if rr != 0 {
                    let rr_lvl = heap.read_word(rr, F_LEVEL).unwrap();
                    assert!(rr_lvl < lvl, "two right links on one level");
                }
            }

            lvl
        }

        let root = heap.read_word(tree.offset(), H_ROOT).unwrap();
        walk(heap, root, None, None);
    }

    #[test]
    fn test_insert_and_order() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        // a fixed scramble of 0..100
        for i in 0..100u64 {
            assert!(put(&tree, &mut heap, (i * 37 + 11) % 100));
        }

        assert_eq!(tree.count(&heap).unwrap(), 100);
        validate(&tree, &heap);

        let values = contents(&tree, &heap, true);
        assert_eq!(values, (0..100).collect::<Vec<u64>>());

        let reversed = contents(&tree, &heap, false);
        assert_eq!(reversed, (0..100).rev().collect::<Vec<u64>>());
    }

    #[test]
    fn test_insert_existing_updates() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 2).unwrap();

        let ins = |heap: &mut Heap, key: u64, val: u64| -> bool {
            tree.insert(
                heap,
                &mut move |_, stored| Ok(key.cmp(&stored)),
                &mut move |_, data| {
                    data[0] = key;
                    data[1] = val;
                    Ok(())
                },
            )
            .unwrap()
        };

        assert!(ins(&mut heap, 7, 70));
        assert!(!ins(&mut heap, 7, 71));

        assert_eq!(tree.count(&heap).unwrap(), 1);

        let found = tree
            .search(&heap, &mut |_, stored| Ok(7u64.cmp(&stored)))
            .unwrap()
            .unwrap();
        assert_eq!(found, vec![7, 71]);
    }

    #[test]
    fn test_search_miss() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        put(&tree, &mut heap, 10);

        let miss = tree
            .search(&heap, &mut |_, stored| Ok(11u64.cmp(&stored)))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_remove() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        for i in 0..50u64 {
            put(&tree, &mut heap, (i * 13 + 5) % 50);
        }

        for v in 0..50u64 {
            if v % 3 == 0 {
                assert!(del(&tree, &mut heap, v));
            }
        }
        assert!(!del(&tree, &mut heap, 0));

        validate(&tree, &heap);
        assert_eq!(tree.count(&heap).unwrap(), 33);

        let expected: Vec<u64> = (0..50).filter(|v| v % 3 != 0).collect();
        assert_eq!(contents(&tree, &heap, true), expected);
    }

    #[test]
    fn test_remove_all_returns_blocks() {
        let mut heap = test_heap();

        let baseline = heap.count_used_blocks().unwrap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        for v in 0..20u64 {
            put(&tree, &mut heap, v);
        }
        for v in 0..20u64 {
            del(&tree, &mut heap, v);
        }

        tree.destroy(&mut heap, &mut |_, _| Ok(())).unwrap();
        heap.garbage_collect().unwrap();

        assert_eq!(heap.count_used_blocks().unwrap(), baseline);
    }

    #[test]
    fn test_min_max() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        assert!(tree.min(&heap).unwrap().is_none());

        for v in [9u64, 2, 14, 7].iter() {
            put(&tree, &mut heap, *v);
        }

        assert_eq!(tree.min(&heap).unwrap().unwrap()[0], 2);
        assert_eq!(tree.max(&heap).unwrap().unwrap()[0], 14);
    }

    fn odds(heap: &mut Heap) -> AaTree {
        let tree = AaTree::create(heap, 1).unwrap();
        for v in [1u64, 3, 5, 7, 9, 11, 13].iter() {
            put(&tree, heap, *v);
        }
        tree
    }

    fn between(tree: &AaTree, heap: &Heap, lo: u64, hi: u64, ascending: bool, inclusive: bool) -> Vec<u64> {
        tree.iter_between(
            heap,
            Box::new(move |_: &Heap, stored: u64| Ok(lo.cmp(&stored))),
            Box::new(move |_: &Heap, stored: u64| Ok(hi.cmp(&stored))),
            ascending,
            inclusive,
        )
        .unwrap()
        .map(|r| r.unwrap()[0])
        .collect()
    }

    #[test]
    fn test_range_exclusive() {
        let mut heap = test_heap();
        let tree = odds(&mut heap);

        assert_eq!(between(&tree, &heap, 4, 8, true, false), vec![5, 7]);
    }

    #[test]
    fn test_range_inclusive_brackets() {
        let mut heap = test_heap();
        let tree = odds(&mut heap);

        assert_eq!(between(&tree, &heap, 4, 8, true, true), vec![3, 5, 7, 9]);
    }

    #[test]
    fn test_range_descending() {
        let mut heap = test_heap();
        let tree = odds(&mut heap);

        assert_eq!(between(&tree, &heap, 4, 8, false, false), vec![7, 5]);
        assert_eq!(between(&tree, &heap, 4, 8, false, true), vec![9, 7, 5, 3]);
    }

    #[test]
    fn test_range_exact_bounds() {
        let mut heap = test_heap();
        let tree = odds(&mut heap);

        assert_eq!(between(&tree, &heap, 3, 9, true, true), vec![3, 5, 7, 9]);
        assert_eq!(between(&tree, &heap, 3, 9, true, false), vec![5, 7]);
    }

    #[test]
    fn test_iter_from() {
        let mut heap = test_heap();
        let tree = odds(&mut heap);

        let from6: Vec<u64> = tree
            .iter_from(&heap, &mut |_, stored| Ok(6u64.cmp(&stored)), true, false)
            .unwrap()
            .map(|r| r.unwrap()[0])
            .collect();
        assert_eq!(from6, vec![7, 9, 11, 13]);

        let down_from6: Vec<u64> = tree
            .iter_from(&heap, &mut |_, stored| Ok(6u64.cmp(&stored)), false, false)
            .unwrap()
            .map(|r| r.unwrap()[0])
            .collect();
        assert_eq!(down_from6, vec![5, 3, 1]);
    }

    #[test]
    fn test_clear_with_keep() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        for v in 0..30u64 {
            put(&tree, &mut heap, v);
        }

        tree.clear(
            &mut heap,
            &mut |_, _| Ok(()),
            Some(&mut |_, data| Ok(data[0] % 2 == 1)),
        )
        .unwrap();

        validate(&tree, &heap);
        assert_eq!(tree.count(&heap).unwrap(), 15);

        let expected: Vec<u64> = (0..30).filter(|v| v % 2 == 1).collect();
        assert_eq!(contents(&tree, &heap, true), expected);
    }

    #[test]
    fn test_refcount() {
        let mut heap = test_heap();
        let tree = AaTree::create(&mut heap, 1).unwrap();

        assert_eq!(tree.increase_ref(&mut heap).unwrap(), 2);
        assert_eq!(tree.decrease_ref(&mut heap).unwrap(), 1);
        assert_eq!(tree.decrease_ref(&mut heap).unwrap(), 0);
    }
}
