//!
//! A persisted ordered set of interned strings
//!
//! The set is a thin handle over one AA-tree with a single data word per
//! node: the offset of the interned member. Every operation threads the
//! backing heap and the shared string allocator explicitly.
//!

use itertools::EitherOrBoth;
use itertools::Itertools;

use crate::error::{Error, Result};
use crate::store::aa_tree::{AaTree, TreeIter};
use crate::store::allocator::SingletonAllocator;
use crate::store::heap::Heap;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedSet {
    tree: AaTree,
}

impl SortedSet {
    pub fn create(heap: &mut Heap) -> Result<SortedSet> {
        Ok(SortedSet { tree: AaTree::create(heap, 1)? })
    }

    pub fn open(offset: u64) -> SortedSet {
        SortedSet { tree: AaTree::open(offset) }
    }

    pub fn offset(&self) -> u64 {
        self.tree.offset()
    }

    pub fn count(&self, heap: &Heap) -> Result<u64> {
        self.tree.count(heap)
    }

    pub fn is_empty(&self, heap: &Heap) -> Result<bool> {
        Ok(self.count(heap)? == 0)
    }

    /// Adds `value`; false if it was already present
    pub fn add(&self, heap: &mut Heap, strings: SingletonAllocator, value: &str) -> Result<bool> {
        self.tree.insert(
            heap,
            &mut |h, stored| strings.compare(h, stored, value),
            &mut |h, data| {
                if data[0] == 0 {
                    data[0] = strings.alloc(h, value)?;
                }
                Ok(())
            },
        )
    }

    /// Removes `value`; false if it was not there
    pub fn remove(&self, heap: &mut Heap, strings: SingletonAllocator, value: &str) -> Result<bool> {
        self.tree.remove(
            heap,
            &mut |h, stored| strings.compare(h, stored, value),
            &mut |h, data| strings.free(h, data[0]),
        )
    }

    pub fn contains(&self, heap: &Heap, strings: SingletonAllocator, value: &str) -> Result<bool> {
        let found = self
            .tree
            .search(heap, &mut |h, stored| strings.compare(h, stored, value))?;
        Ok(found.is_some())
    }

    pub fn min(&self, heap: &Heap, strings: SingletonAllocator) -> Result<String> {
        match self.tree.min(heap)? {
            Some(data) => strings.read(heap, data[0]),
            None => Err(Error::EmptyCollection),
        }
    }

    pub fn max(&self, heap: &Heap, strings: SingletonAllocator) -> Result<String> {
        match self.tree.max(heap)? {
            Some(data) => strings.read(heap, data[0]),
            None => Err(Error::EmptyCollection),
        }
    }


    /*
     * traversal
     */

    pub fn iter<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        ascending: bool,
    ) -> Result<SetIter<'a>> {
        Ok(SetIter {
            heap,
            strings,
            inner: self.tree.iter(heap, ascending)?,
        })
    }

    /// Directional traversal starting at `start`; see the tree for how
    /// `inclusive` treats a missing start key
    pub fn iter_from<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        start: &str,
        ascending: bool,
        inclusive: bool,
    ) -> Result<SetIter<'a>> {
        let inner = self.tree.iter_from(
            heap,
            &mut |h, stored| strings.compare(h, stored, start),
            ascending,
            inclusive,
        )?;

        Ok(SetIter { heap, strings, inner })
    }

    /// Bounded traversal; `inclusive` applies to both bounds
    pub fn iter_between<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        low: &str,
        high: &str,
        ascending: bool,
        inclusive: bool,
    ) -> Result<SetIter<'a>> {
        let low_key = low.to_string();
        let high_key = high.to_string();

        let inner = self.tree.iter_between(
            heap,
            Box::new(move |h: &Heap, stored: u64| strings.compare(h, stored, &low_key)),
            Box::new(move |h: &Heap, stored: u64| strings.compare(h, stored, &high_key)),
            ascending,
            inclusive,
        )?;

        Ok(SetIter { heap, strings, inner })
    }

    /// Ascending traversal of the half-open range `[low, high)`
    pub fn iter_range<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        low: &str,
        high: &str,
    ) -> Result<RangeIter<'a>> {
        let inclusive = self.contains(heap, strings, low)?;
        let inner = self.iter_from(heap, strings, low, true, inclusive)?;

        Ok(RangeIter {
            inner,
            high: high.to_string(),
            done: false,
        })
    }

    fn to_vec(&self, heap: &Heap, strings: SingletonAllocator) -> Result<Vec<String>> {
        self.iter(heap, strings, true)?.collect()
    }


    /*
     * set algebra
     */

    pub fn union(
        &self,
        other: &SortedSet,
        heap: &Heap,
        strings: SingletonAllocator,
    ) -> Result<Vec<String>> {
        let mine = self.to_vec(heap, strings)?;
        let theirs = other.to_vec(heap, strings)?;

        Ok(mine
            .into_iter()
            .merge_join_by(theirs.into_iter(), |a, b| a.cmp(b))
            .map(|pair| match pair {
                EitherOrBoth::Both(a, _) => a,
                EitherOrBoth::Left(a) => a,
                EitherOrBoth::Right(b) => b,
            })
            .collect())
    }

    pub fn intersection(
        &self,
        other: &SortedSet,
        heap: &Heap,
        strings: SingletonAllocator,
    ) -> Result<Vec<String>> {
        let mine = self.to_vec(heap, strings)?;
        let theirs = other.to_vec(heap, strings)?;

        Ok(mine
            .into_iter()
            .merge_join_by(theirs.into_iter(), |a, b| a.cmp(b))
            .filter_map(|pair| match pair {
                EitherOrBoth::Both(a, _) => Some(a),
                _ => None,
            })
            .collect())
    }

    pub fn except(
        &self,
        other: &SortedSet,
        heap: &Heap,
        strings: SingletonAllocator,
    ) -> Result<Vec<String>> {
        let mine = self.to_vec(heap, strings)?;
        let theirs = other.to_vec(heap, strings)?;

        Ok(mine
            .into_iter()
            .merge_join_by(theirs.into_iter(), |a, b| a.cmp(b))
            .filter_map(|pair| match pair {
                EitherOrBoth::Left(a) => Some(a),
                _ => None,
            })
            .collect())
    }


    /*
     * lifetime
     */

    /// Removes every member, releasing its interned string
    pub fn clear(&self, heap: &mut Heap, strings: SingletonAllocator) -> Result<()> {
        self.tree
            .clear(heap, &mut |h, data| strings.free(h, data[0]), None)
    }

    /// Clear plus release of the tree itself
    pub fn destroy(self, heap: &mut Heap, strings: SingletonAllocator) -> Result<()> {
        self.tree
            .destroy(heap, &mut |h, data| strings.free(h, data[0]))
    }

    pub fn add_ref(&self, heap: &mut Heap) -> Result<u64> {
        self.tree.increase_ref(heap)
    }

    /// Drops one owner; the last one destroys the set. Returns whether
    /// destruction happened.
    pub fn release(self, heap: &mut Heap, strings: SingletonAllocator) -> Result<bool> {
        if self.tree.decrease_ref(heap)? == 0 {
            self.destroy(heap, strings)?;
            return Ok(true);
        }
        Ok(false)
    }
}


pub struct SetIter<'a> {
    heap:    &'a Heap,
    strings: SingletonAllocator,
    inner:   TreeIter<'a>,
}

impl<'a> Iterator for SetIter<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        match self.inner.next() {
            Some(Ok(data)) => Some(self.strings.read(self.heap, data[0])),
            Some(Err(e)) => Some(Err(e)),
            None => None,
        }
    }
}


pub struct RangeIter<'a> {
    inner: SetIter<'a>,
    high:  String,
    done:  bool,
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        if self.done {
            return None;
        }

        match self.inner.next() {
            Some(Ok(value)) => {
                if value < self.high {
                    Some(Ok(value))
                } else {
                    self.done = true;
                    None
                }
            }
            other => other,
        }
    }
}
