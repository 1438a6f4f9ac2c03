//!
//! A persisted ordered map with interned string keys
//!
//! Nodes carry two data words: the interned key and a value offset. The
//! value can be another interned string or the header of a nested persisted
//! tree (a set or another map); in the nested case the caller supplies the
//! disposer that knows how to take the value apart.
//!

use crate::error::{Error, Result};
use crate::store::aa_tree::{AaTree, TreeIter};
use crate::store::allocator::SingletonAllocator;
use crate::store::heap::Heap;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedMap {
    tree: AaTree,
}

impl SortedMap {
    pub fn create(heap: &mut Heap) -> Result<SortedMap> {
        Ok(SortedMap { tree: AaTree::create(heap, 2)? })
    }

    pub fn open(offset: u64) -> SortedMap {
        SortedMap { tree: AaTree::open(offset) }
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

    pub fn contains_key(&self, heap: &Heap, strings: SingletonAllocator, key: &str) -> Result<bool> {
        Ok(self.try_get(heap, strings, key)?.is_some())
    }


    /*
     * string values
     */

    /// Maps `key` to the interned `value`; an existing value is released
    /// first so updates never leak
    pub fn insert_str(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.tree.insert(
            heap,
            &mut |h, stored| strings.compare(h, stored, key),
            &mut |h, data| {
                if data[0] == 0 {
                    data[0] = strings.alloc(h, key)?;
                }
                if data[1] != 0 {
                    strings.free(h, data[1])?;
                }
                data[1] = strings.alloc(h, value)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    pub fn try_get_str(
        &self,
        heap: &Heap,
        strings: SingletonAllocator,
        key: &str,
    ) -> Result<Option<String>> {
        match self.try_get(heap, strings, key)? {
            Some(off) => Ok(Some(strings.read(heap, off)?)),
            None => Ok(None),
        }
    }

    /// Indexer-style access; a missing key is an error
    pub fn get_str(&self, heap: &Heap, strings: SingletonAllocator, key: &str) -> Result<String> {
        self.try_get_str(heap, strings, key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Removes `key`, releasing both the key and its string value
    pub fn remove_str(&self, heap: &mut Heap, strings: SingletonAllocator, key: &str) -> Result<bool> {
        self.remove_with(heap, strings, key, &mut |h, value| strings.free(h, value))
    }


    /*
     * raw and nested values
     */

    /// Value offset stored under `key`, if any
    pub fn try_get(&self, heap: &Heap, strings: SingletonAllocator, key: &str) -> Result<Option<u64>> {
        let found = self
            .tree
            .search(heap, &mut |h, stored| strings.compare(h, stored, key))?;
        Ok(found.map(|data| data[1]))
    }

    /// Returns the value offset under `key`, creating the entry with
    /// `make` when it is missing
    pub fn get_or_insert_with(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        key: &str,
        make: &mut dyn FnMut(&mut Heap) -> Result<u64>,
    ) -> Result<u64> {
        let mut out = 0u64;

        self.tree.insert(
            heap,
            &mut |h, stored| strings.compare(h, stored, key),
            &mut |h, data| {
                if data[0] == 0 {
                    data[0] = strings.alloc(h, key)?;
                }
                if data[1] == 0 {
                    data[1] = make(h)?;
                }
                out = data[1];
                Ok(())
            },
        )?;

        Ok(out)
    }

    /// Removes `key`, handing the value offset to `dispose`
    pub fn remove_with(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        key: &str,
        dispose: &mut dyn FnMut(&mut Heap, u64) -> Result<()>,
    ) -> Result<bool> {
        self.tree.remove(
            heap,
            &mut |h, stored| strings.compare(h, stored, key),
            &mut |h, data| {
                strings.free(h, data[0])?;
                dispose(h, data[1])
            },
        )
    }


    /*
     * traversal; items are (key, value offset) pairs
     */

    pub fn iter<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        ascending: bool,
    ) -> Result<MapIter<'a>> {
        Ok(MapIter {
            heap,
            strings,
            inner: self.tree.iter(heap, ascending)?,
        })
    }

    pub fn iter_from<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        start: &str,
        ascending: bool,
        inclusive: bool,
    ) -> Result<MapIter<'a>> {
        let inner = self.tree.iter_from(
            heap,
            &mut |h, stored| strings.compare(h, stored, start),
            ascending,
            inclusive,
        )?;

        Ok(MapIter { heap, strings, inner })
    }

    pub fn iter_between<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        low: &str,
        high: &str,
        ascending: bool,
        inclusive: bool,
    ) -> Result<MapIter<'a>> {
        let low_key = low.to_string();
        let high_key = high.to_string();

        let inner = self.tree.iter_between(
            heap,
            Box::new(move |h: &Heap, stored: u64| strings.compare(h, stored, &low_key)),
            Box::new(move |h: &Heap, stored: u64| strings.compare(h, stored, &high_key)),
            ascending,
            inclusive,
        )?;

        Ok(MapIter { heap, strings, inner })
    }

    /// Ascending traversal of keys in the half-open range `[low, high)`
    pub fn iter_range<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        low: &str,
        high: &str,
    ) -> Result<MapRangeIter<'a>> {
        let inclusive = self.contains_key(heap, strings, low)?;
        let inner = self.iter_from(heap, strings, low, true, inclusive)?;

        Ok(MapRangeIter {
            inner,
            high: high.to_string(),
            done: false,
        })
    }

    pub fn min_key(&self, heap: &Heap, strings: SingletonAllocator) -> Result<String> {
        match self.tree.min(heap)? {
            Some(data) => strings.read(heap, data[0]),
            None => Err(Error::EmptyCollection),
        }
    }

    pub fn max_key(&self, heap: &Heap, strings: SingletonAllocator) -> Result<String> {
        match self.tree.max(heap)? {
            Some(data) => strings.read(heap, data[0]),
            None => Err(Error::EmptyCollection),
        }
    }


    /*
     * lifetime
     */

    /// Removes every entry; `dispose` takes each value offset apart
    pub fn clear_with(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        dispose: &mut dyn FnMut(&mut Heap, u64) -> Result<()>,
    ) -> Result<()> {
        self.tree.clear(
            heap,
            &mut |h, data| {
                strings.free(h, data[0])?;
                dispose(h, data[1])
            },
            None,
        )
    }

    /// Clear plus release of the tree itself
    pub fn destroy_with(
        self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        dispose: &mut dyn FnMut(&mut Heap, u64) -> Result<()>,
    ) -> Result<()> {
        self.clear_with(heap, strings, dispose)?;
        self.tree.destroy(heap, &mut |_, _| Ok(()))
    }

    pub fn add_ref(&self, heap: &mut Heap) -> Result<u64> {
        self.tree.increase_ref(heap)
    }

    /// Drops one owner; the last one destroys the map through `dispose`.
    /// Returns whether destruction happened.
    pub fn release_with(
        self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        dispose: &mut dyn FnMut(&mut Heap, u64) -> Result<()>,
    ) -> Result<bool> {
        if self.tree.decrease_ref(heap)? == 0 {
            self.destroy_with(heap, strings, dispose)?;
            return Ok(true);
        }
        Ok(false)
    }
}


pub struct MapIter<'a> {
    heap:    &'a Heap,
    strings: SingletonAllocator,
    inner:   TreeIter<'a>,
}

impl<'a> Iterator for MapIter<'a> {
    type Item = Result<(String, u64)>;

    fn next(&mut self) -> Option<Result<(String, u64)>> {
        match self.inner.next() {
            Some(Ok(data)) => match self.strings.read(self.heap, data[0]) {
                Ok(key) => Some(Ok((key, data[1]))),
                Err(e) => Some(Err(e)),
            },
            Some(Err(e)) => Some(Err(e)),
            None => None,
        }
    }
}


pub struct MapRangeIter<'a> {
    inner: MapIter<'a>,
    high:  String,
    done:  bool,
}

impl<'a> Iterator for MapRangeIter<'a> {
    type Item = Result<(String, u64)>;

    fn next(&mut self) -> Option<Result<(String, u64)>> {
        if self.done {
            return None;
        }

        match self.inner.next() {
            Some(Ok((key, value))) => {
                if key < self.high {
                    Some(Ok((key, value)))
                } else {
                    self.done = true;
                    None
                }
            }
            other => other,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sorted_set::SortedSet;
    use crate::store::stream::MemoryStream;

    fn test_env() -> (Heap, SingletonAllocator) {
        let log = slog::Logger::root(slog::Discard, o!());
        let mut heap = Heap::new(Box::new(MemoryStream::new()), log).unwrap();
        let strings = SingletonAllocator::open(&mut heap).unwrap();
        (heap, strings)
    }

    #[test]
    fn test_dictionary_roundtrip() {
        let (mut heap, strings) = test_env();
        let map = SortedMap::create(&mut heap).unwrap();

        let baseline = heap.count_used_blocks().unwrap();

        map.insert_str(&mut heap, strings, "Author", "Ayn Rand").unwrap();
        map.insert_str(&mut heap, strings, "Driver", "Howard Rourke").unwrap();

        assert_eq!(map.get_str(&heap, strings, "Author").unwrap(), "Ayn Rand");
        assert_eq!(map.get_str(&heap, strings, "Driver").unwrap(), "Howard Rourke");

        assert!(map.remove_str(&mut heap, strings, "Author").unwrap());
        assert!(map.remove_str(&mut heap, strings, "Driver").unwrap());

        heap.garbage_collect().unwrap();
        assert_eq!(heap.count_used_blocks().unwrap(), baseline);
    }

    #[test]
    fn test_update_releases_old_value() {
        let (mut heap, strings) = test_env();
        let map = SortedMap::create(&mut heap).unwrap();

        map.insert_str(&mut heap, strings, "hero", "luke").unwrap();
        map.insert_str(&mut heap, strings, "hero", "leia").unwrap();

        assert_eq!(map.count(&heap).unwrap(), 1);
        assert_eq!(map.get_str(&heap, strings, "hero").unwrap(), "leia");

        // the old value string is gone from the intern table
        assert_eq!(strings.lookup(&heap, "luke").unwrap(), 0);
    }

    #[test]
    fn test_missing_key() {
        let (mut heap, strings) = test_env();
        let map = SortedMap::create(&mut heap).unwrap();

        map.insert_str(&mut heap, strings, "present", "yes").unwrap();

        assert!(map.try_get_str(&heap, strings, "absent").unwrap().is_none());

        match map.get_str(&heap, strings, "absent") {
            Err(Error::KeyNotFound(key)) => assert_eq!(key, "absent"),
            other => panic!("expected KeyNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_iteration_order() {
        let (mut heap, strings) = test_env();
        let map = SortedMap::create(&mut heap).unwrap();

        for (k, v) in [("cherry", "red"), ("apple", "green"), ("banana", "yellow")].iter() {
            map.insert_str(&mut heap, strings, k, v).unwrap();
        }

        let keys: Vec<String> = map
            .iter(&heap, strings, true)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["apple", "banana", "cherry"]);

        assert_eq!(map.min_key(&heap, strings).unwrap(), "apple");
        assert_eq!(map.max_key(&heap, strings).unwrap(), "cherry");
    }

    #[test]
    fn test_nested_persisted_dictionary() {
        let (mut heap, strings) = test_env();

        // d["Anakin"]["likes"]["Amidala"] built from three levels
        let outer = SortedMap::create(&mut heap).unwrap();

        let mid_off = outer
            .get_or_insert_with(&mut heap, strings, "Anakin", &mut |h| {
                SortedMap::create(h).map(|m| m.offset())
            })
            .unwrap();
        let mid = SortedMap::open(mid_off);

        let set_off = mid
            .get_or_insert_with(&mut heap, strings, "likes", &mut |h| {
                SortedSet::create(h).map(|s| s.offset())
            })
            .unwrap();
        let set = SortedSet::open(set_off);

        set.add(&mut heap, strings, "Amidala").unwrap();

        // resolve the same path again without creating anything
        let mid2 = SortedMap::open(outer.try_get(&heap, strings, "Anakin").unwrap().unwrap());
        let set2 = SortedSet::open(mid2.try_get(&heap, strings, "likes").unwrap().unwrap());

        assert_eq!(mid2.offset(), mid.offset());
        assert!(set2.contains(&heap, strings, "Amidala").unwrap());
    }

    #[test]
    fn test_nested_teardown_returns_blocks() {
        let (mut heap, strings) = test_env();

        let baseline = heap.count_used_blocks().unwrap();

        let outer = SortedMap::create(&mut heap).unwrap();
        let mid_off = outer
            .get_or_insert_with(&mut heap, strings, "Anakin", &mut |h| {
                SortedMap::create(h).map(|m| m.offset())
            })
            .unwrap();
        let mid = SortedMap::open(mid_off);
        mid.insert_str(&mut heap, strings, "rank", "jedi").unwrap();

        outer
            .destroy_with(&mut heap, strings, &mut |h, value| {
                SortedMap::open(value)
                    .release_with(h, strings, &mut |h2, v| strings.free(h2, v))
                    .map(|_| ())
            })
            .unwrap();

        heap.garbage_collect().unwrap();
        assert_eq!(heap.count_used_blocks().unwrap(), baseline);
    }

    #[test]
    fn test_range_iteration() {
        let (mut heap, strings) = test_env();
        let map = SortedMap::create(&mut heap).unwrap();

        for day in ["01", "03", "05", "07", "09"].iter() {
            map.insert_str(&mut heap, strings, day, "x").unwrap();
        }

        let keys: Vec<String> = map
            .iter_range(&heap, strings, "03", "08")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["03", "05", "07"]);
    }
}
