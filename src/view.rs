//!
//! Views are read-only ordered keysets over query results
//!
//! The graph returns one view per wildcard column of a query; callers
//! intersect and union them to size their joins before pulling any rows.
//! Three shapes cover the needs: a direct view that delegates to a
//! persisted collection, a constrained view that pays one eager scan for
//! its statistics but iterates lazily, and a union view that materialises
//! its merged cache up front.
//!

use itertools::Itertools;

use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::store::allocator::SingletonAllocator;
use crate::store::heap::Heap;
use crate::store::sorted_map::SortedMap;
use crate::store::sorted_set::SortedSet;


/// A read-only ordered keyset
pub trait Keyset {
    /// Smallest key; fails with EmptyCollection when there is none
    fn min(&self) -> Result<String>;

    /// Largest key; fails with EmptyCollection when there is none
    fn max(&self) -> Result<String>;

    /// Number of keys
    fn magnitude(&self) -> u64;

    fn contains(&self, value: &str) -> bool;

    /// Keys in the half-open range `[low, high)`, ascending
    fn between(&self, low: &str, high: &str) -> Vec<String>;

    /// All keys, ascending
    fn iter(&self) -> Box<dyn Iterator<Item = String> + '_>;
}


/// The persisted collection a direct view delegates to
#[derive(Clone, Copy)]
pub(crate) enum KeySource {
    Members(SortedSet),
    MapKeys(SortedMap),
}

impl KeySource {
    fn iter<'h>(
        &self,
        heap: &'h Heap,
        strings: SingletonAllocator,
        ascending: bool,
    ) -> Box<dyn Iterator<Item = Result<String>> + 'h> {
        match *self {
            KeySource::Members(set) => match set.iter(heap, strings, ascending) {
                Ok(iter) => Box::new(iter),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
            KeySource::MapKeys(map) => match map.iter(heap, strings, ascending) {
                Ok(iter) => Box::new(iter.map(|r| r.map(|(key, _)| key))),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
        }
    }

    fn range<'h>(
        &self,
        heap: &'h Heap,
        strings: SingletonAllocator,
        low: &str,
        high: &str,
    ) -> Box<dyn Iterator<Item = Result<String>> + 'h> {
        match *self {
            KeySource::Members(set) => match set.iter_range(heap, strings, low, high) {
                Ok(iter) => Box::new(iter),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
            KeySource::MapKeys(map) => match map.iter_range(heap, strings, low, high) {
                Ok(iter) => Box::new(iter.map(|r| r.map(|(key, _)| key))),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
        }
    }

    fn count(&self, heap: &Heap) -> Result<u64> {
        match *self {
            KeySource::Members(set) => set.count(heap),
            KeySource::MapKeys(map) => map.count(heap),
        }
    }

    fn contains(&self, heap: &Heap, strings: SingletonAllocator, value: &str) -> Result<bool> {
        match *self {
            KeySource::Members(set) => set.contains(heap, strings, value),
            KeySource::MapKeys(map) => map.contains_key(heap, strings, value),
        }
    }
}


/// Delegating view over one persisted collection, optionally narrowed by a
/// constraint. Statistics walk the collection on every call; wrap it in a
/// `ConstrainedView` to pay for that only once.
pub struct DirectView<'a> {
    heap:       &'a Heap,
    strings:    SingletonAllocator,
    source:     KeySource,
    constraint: Option<&'a Constraint<'a>>,
}

impl<'a> DirectView<'a> {
    pub fn over_set(
        heap: &'a Heap,
        strings: SingletonAllocator,
        set: SortedSet,
        constraint: Option<&'a Constraint<'a>>,
    ) -> DirectView<'a> {
        DirectView {
            heap,
            strings,
            source: KeySource::Members(set),
            constraint,
        }
    }

    pub fn over_map_keys(
        heap: &'a Heap,
        strings: SingletonAllocator,
        map: SortedMap,
        constraint: Option<&'a Constraint<'a>>,
    ) -> DirectView<'a> {
        DirectView {
            heap,
            strings,
            source: KeySource::MapKeys(map),
            constraint,
        }
    }

    fn passes(&self, value: &str) -> bool {
        self.constraint.map_or(true, |c| c.matches(value))
    }

    fn first(&self, ascending: bool) -> Result<String> {
        for entry in self.source.iter(self.heap, self.strings, ascending) {
            let value = entry?;
            if self.passes(&value) {
                return Ok(value);
            }
        }
        Err(Error::EmptyCollection)
    }
}

impl<'a> Keyset for DirectView<'a> {
    fn min(&self) -> Result<String> {
        self.first(true)
    }

    fn max(&self) -> Result<String> {
        self.first(false)
    }

    fn magnitude(&self) -> u64 {
        match self.constraint {
            None => self.source.count(self.heap).expect("corrupt store behind view"),
            Some(_) => self.iter().count() as u64,
        }
    }

    fn contains(&self, value: &str) -> bool {
        self.passes(value)
            && self
                .source
                .contains(self.heap, self.strings, value)
                .expect("corrupt store behind view")
    }

    fn between(&self, low: &str, high: &str) -> Vec<String> {
        self.source
            .range(self.heap, self.strings, low, high)
            .map(|r| r.expect("corrupt store behind view"))
            .filter(|v| self.passes(v))
            .collect()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(
            self.source
                .iter(self.heap, self.strings, true)
                .map(|r| r.expect("corrupt store behind view"))
                .filter(move |v| self.passes(v)),
        )
    }
}


/// Constrained view; one eager scan fixes min, max and magnitude while
/// iteration stays lazy
pub struct ConstrainedView<'a> {
    inner:     DirectView<'a>,
    min:       Option<String>,
    max:       Option<String>,
    magnitude: u64,
}

impl<'a> ConstrainedView<'a> {
    pub fn new(inner: DirectView<'a>) -> Result<ConstrainedView<'a>> {
        let mut min = None;
        let mut max = None;
        let mut magnitude = 0;

        for entry in inner.source.iter(inner.heap, inner.strings, true) {
            let value = entry?;
            if !inner.passes(&value) {
                continue;
            }

            if min.is_none() {
                min = Some(value.clone());
            }
            max = Some(value);
            magnitude += 1;
        }

        Ok(ConstrainedView { inner, min, max, magnitude })
    }
}

impl<'a> Keyset for ConstrainedView<'a> {
    fn min(&self) -> Result<String> {
        self.min.clone().ok_or(Error::EmptyCollection)
    }

    fn max(&self) -> Result<String> {
        self.max.clone().ok_or(Error::EmptyCollection)
    }

    fn magnitude(&self) -> u64 {
        self.magnitude
    }

    fn contains(&self, value: &str) -> bool {
        self.inner.contains(value)
    }

    fn between(&self, low: &str, high: &str) -> Vec<String> {
        self.inner.between(low, high)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = String> + '_> {
        self.inner.iter()
    }
}


/// Union of subviews, materialised into one sorted deduplicated cache
pub struct UnionView {
    cached: Vec<String>,
}

impl UnionView {
    pub fn new(views: &[&dyn Keyset]) -> UnionView {
        let cached = views
            .iter()
            .map(|v| v.iter())
            .kmerge()
            .dedup()
            .collect();

        UnionView { cached }
    }

    /// Materialises directly from a value sequence
    pub fn from_values<I: IntoIterator<Item = String>>(values: I) -> UnionView {
        let mut cached: Vec<String> = values.into_iter().collect();
        cached.sort();
        cached.dedup();
        UnionView { cached }
    }

    pub fn empty() -> UnionView {
        UnionView { cached: Vec::new() }
    }
}

impl Keyset for UnionView {
    fn min(&self) -> Result<String> {
        self.cached.first().cloned().ok_or(Error::EmptyCollection)
    }

    fn max(&self) -> Result<String> {
        self.cached.last().cloned().ok_or(Error::EmptyCollection)
    }

    fn magnitude(&self) -> u64 {
        self.cached.len() as u64
    }

    fn contains(&self, value: &str) -> bool {
        self.cached.binary_search_by(|p| p.as_str().cmp(value)).is_ok()
    }

    fn between(&self, low: &str, high: &str) -> Vec<String> {
        self.cached
            .iter()
            .skip_while(|v| v.as_str() < low)
            .take_while(|v| v.as_str() < high)
            .cloned()
            .collect()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.cached.iter().cloned())
    }
}
