//!
//! The triple index: three orderings over one interned term space
//!
//! Every triple is recorded three times, once per ordering (SPO, POS and
//! OSP), each a persisted map `term -> (term -> set of term)`. Because the
//! three orderings share one singleton string allocator, a term occupies a
//! single block no matter how many triples and orderings reference it.
//!
//! Any query pattern finds an ordering whose specific columns sit on the
//! outside, so nothing short of a fully open query ever scans.
//!

use std::iter;

use crate::constraint::Constraint;
use crate::error::Result;
use crate::store::allocator::SingletonAllocator;
use crate::store::heap::Heap;
use crate::store::sorted_map::SortedMap;
use crate::store::sorted_set::SortedSet;


/// Rows produced by a query; only the wildcard columns appear
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Vec<String>>> + 'a>;

type EntryIter<'a> = Box<dyn Iterator<Item = Result<(String, u64)>> + 'a>;
type MemberIter<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;


#[derive(Debug, Clone, Copy)]
pub struct TripleIndex {
    pub(crate) spo: SortedMap,
    pub(crate) pos: SortedMap,
    pub(crate) osp: SortedMap,
}

impl TripleIndex {
    /// Opens the three orderings of `graph` through their named roots,
    /// creating them on first use
    pub fn open(heap: &mut Heap, graph: &str) -> Result<TripleIndex> {
        Ok(TripleIndex {
            spo: TripleIndex::open_order(heap, graph, "SPO")?,
            pos: TripleIndex::open_order(heap, graph, "POS")?,
            osp: TripleIndex::open_order(heap, graph, "OSP")?,
        })
    }

    fn open_order(heap: &mut Heap, graph: &str, suffix: &str) -> Result<SortedMap> {
        let root = format!("{}.{}", graph, suffix);

        let off = heap.get_root(&root)?;
        if off != 0 {
            return Ok(SortedMap::open(off));
        }

        let map = SortedMap::create(heap)?;
        heap.set_root(&root, map.offset())?;
        Ok(map)
    }


    /*
     * mutation
     */

    /// Inserts the triple into all three orderings; false when it was
    /// already present. Re-asserting is a no-op beyond refcount churn that
    /// nets to zero.
    pub fn assert_one(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        s: &str,
        p: &str,
        o: &str,
    ) -> Result<bool> {
        let added = TripleIndex::add_to_order(heap, strings, self.spo, s, p, o)?;
        TripleIndex::add_to_order(heap, strings, self.pos, p, o, s)?;
        TripleIndex::add_to_order(heap, strings, self.osp, o, s, p)?;
        Ok(added)
    }

    fn add_to_order(
        heap: &mut Heap,
        strings: SingletonAllocator,
        order: SortedMap,
        a: &str,
        b: &str,
        c: &str,
    ) -> Result<bool> {
        let mid_off = order.get_or_insert_with(heap, strings, a, &mut |h| {
            SortedMap::create(h).map(|m| m.offset())
        })?;

        let mid = SortedMap::open(mid_off);
        let set_off = mid.get_or_insert_with(heap, strings, b, &mut |h| {
            SortedSet::create(h).map(|s| s.offset())
        })?;

        SortedSet::open(set_off).add(heap, strings, c)
    }

    /// Removes one concrete triple from all three orderings, pruning
    /// emptied middle maps and outer entries
    pub fn remove_one(
        &self,
        heap: &mut Heap,
        strings: SingletonAllocator,
        s: &str,
        p: &str,
        o: &str,
    ) -> Result<bool> {
        let removed = TripleIndex::remove_from_order(heap, strings, self.spo, s, p, o)?;
        if removed {
            TripleIndex::remove_from_order(heap, strings, self.pos, p, o, s)?;
            TripleIndex::remove_from_order(heap, strings, self.osp, o, s, p)?;
        }
        Ok(removed)
    }

    fn remove_from_order(
        heap: &mut Heap,
        strings: SingletonAllocator,
        order: SortedMap,
        a: &str,
        b: &str,
        c: &str,
    ) -> Result<bool> {
        let mid = match order.try_get(heap, strings, a)? {
            Some(off) => SortedMap::open(off),
            None => return Ok(false),
        };
        let set = match mid.try_get(heap, strings, b)? {
            Some(off) => SortedSet::open(off),
            None => return Ok(false),
        };

        if !set.remove(heap, strings, c)? {
            return Ok(false);
        }

        if set.is_empty(heap)? {
            mid.remove_with(heap, strings, b, &mut |h, off| {
                SortedSet::open(off).release(h, strings).map(|_| ())
            })?;

            if mid.is_empty(heap)? {
                order.remove_with(heap, strings, a, &mut |h, off| {
                    SortedMap::open(off)
                        .release_with(h, strings, &mut |h2, set_off| {
                            SortedSet::open(set_off).release(h2, strings).map(|_| ())
                        })
                        .map(|_| ())
                })?;
            }
        }

        Ok(true)
    }


    /*
     * probes
     */

    /// Exact membership probe through SPO
    pub fn contains(
        &self,
        heap: &Heap,
        strings: SingletonAllocator,
        s: &str,
        p: &str,
        o: &str,
    ) -> Result<bool> {
        let mid = match self.spo.try_get(heap, strings, s)? {
            Some(off) => SortedMap::open(off),
            None => return Ok(false),
        };
        let set = match mid.try_get(heap, strings, p)? {
            Some(off) => SortedSet::open(off),
            None => return Ok(false),
        };
        set.contains(heap, strings, o)
    }

    /// Total number of triples
    pub fn count(&self, heap: &Heap, strings: SingletonAllocator) -> Result<u64> {
        let mut total = 0;

        for outer in self.spo.iter(heap, strings, true)? {
            let (_, mid_off) = outer?;
            for inner in SortedMap::open(mid_off).iter(heap, strings, true)? {
                let (_, set_off) = inner?;
                total += SortedSet::open(set_off).count(heap)?;
            }
        }

        Ok(total)
    }

    pub(crate) fn mid_of(
        &self,
        heap: &Heap,
        strings: SingletonAllocator,
        order: SortedMap,
        key: &str,
    ) -> Result<Option<SortedMap>> {
        Ok(order.try_get(heap, strings, key)?.map(SortedMap::open))
    }

    pub(crate) fn set_of(
        heap: &Heap,
        strings: SingletonAllocator,
        mid: SortedMap,
        key: &str,
    ) -> Result<Option<SortedSet>> {
        Ok(mid.try_get(heap, strings, key)?.map(SortedSet::open))
    }


    /*
     * enumeration
     *
     * The dispatch sends every pattern to the ordering where its specific
     * columns are outermost:
     *
     *   s p o -> SPO probe        s p _ -> SPO      _ p o -> POS
     *   s _ o -> OSP              s _ _ -> SPO      _ p _ -> POS (swapped)
     *   _ _ o -> OSP              _ _ _ -> SPO full scan
     */

    pub(crate) fn rows<'a>(
        &self,
        heap: &'a Heap,
        strings: SingletonAllocator,
        cs: &'a Constraint<'a>,
        cp: &'a Constraint<'a>,
        co: &'a Constraint<'a>,
    ) -> RowIter<'a> {
        let spo = self.spo;
        let pos = self.pos;
        let osp = self.osp;

        match (cs.as_specific(), cp.as_specific(), co.as_specific()) {
            // fully specified: zero or one empty row
            (Some(s), Some(p), Some(o)) => match self.contains(heap, strings, s, p, o) {
                Ok(true) => Box::new(iter::once(Ok(Vec::new()))),
                Ok(false) => Box::new(iter::empty()),
                Err(e) => Box::new(iter::once(Err(e))),
            },

            // two specifics: land on the inner set
            (Some(s), Some(p), None) => {
                match self.two_level(heap, strings, spo, s, p) {
                    Ok(Some(set)) => one_column(set_members(heap, strings, set, co)),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }
            (None, Some(p), Some(o)) => {
                match self.two_level(heap, strings, pos, p, o) {
                    Ok(Some(set)) => one_column(set_members(heap, strings, set, cs)),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }
            (Some(s), None, Some(o)) => {
                match self.two_level(heap, strings, osp, o, s) {
                    Ok(Some(set)) => one_column(set_members(heap, strings, set, cp)),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }

            // one specific: iterate the middle map, then each set
            (Some(s), None, None) => {
                match self.mid_of(heap, strings, spo, s) {
                    Ok(Some(mid)) => pair_columns(heap, strings, mid, cp, co, false),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }
            (None, Some(p), None) => {
                // POS yields (o, s); swap so callers see (s, o)
                match self.mid_of(heap, strings, pos, p) {
                    Ok(Some(mid)) => pair_columns(heap, strings, mid, co, cs, true),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }
            (None, None, Some(o)) => {
                match self.mid_of(heap, strings, osp, o) {
                    Ok(Some(mid)) => pair_columns(heap, strings, mid, cs, cp, false),
                    Ok(None) => Box::new(iter::empty()),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            }

            // fully open: scan SPO
            (None, None, None) => {
                Box::new(map_entries(heap, strings, spo, cs).flat_map(
                    move |outer| -> RowIter<'a> {
                        match outer {
                            Ok((s_val, mid_off)) => {
                                let mid = SortedMap::open(mid_off);
                                Box::new(map_entries(heap, strings, mid, cp).flat_map(
                                    move |inner| -> RowIter<'a> {
                                        let s_val = s_val.clone();
                                        match inner {
                                            Ok((p_val, set_off)) => {
                                                let set = SortedSet::open(set_off);
                                                Box::new(
                                                    set_members(heap, strings, set, co).map(
                                                        move |r| {
                                                            r.map(|o_val| {
                                                                vec![
                                                                    s_val.clone(),
                                                                    p_val.clone(),
                                                                    o_val,
                                                                ]
                                                            })
                                                        },
                                                    ),
                                                )
                                            }
                                            Err(e) => Box::new(iter::once(Err(e))),
                                        }
                                    },
                                ))
                            }
                            Err(e) => Box::new(iter::once(Err(e))),
                        }
                    },
                ))
            }
        }
    }

    fn two_level(
        &self,
        heap: &Heap,
        strings: SingletonAllocator,
        order: SortedMap,
        a: &str,
        b: &str,
    ) -> Result<Option<SortedSet>> {
        match self.mid_of(heap, strings, order, a)? {
            Some(mid) => TripleIndex::set_of(heap, strings, mid, b),
            None => Ok(None),
        }
    }

    /// Materialises the full triples matched by the constraints, with the
    /// specific columns filled back in
    pub(crate) fn collect_matches(
        &self,
        heap: &Heap,
        strings: SingletonAllocator,
        cs: &Constraint,
        cp: &Constraint,
        co: &Constraint,
    ) -> Result<Vec<(String, String, String)>> {
        let shape = (cs.as_specific(), cp.as_specific(), co.as_specific());

        let rows: Vec<Vec<String>> = self.rows(heap, strings, cs, cp, co).collect::<Result<_>>()?;

        let mut matches = Vec::with_capacity(rows.len());
        for mut row in rows {
            let triple = match shape {
                (Some(s), Some(p), Some(o)) => (s.to_string(), p.to_string(), o.to_string()),
                (Some(s), Some(p), None) => (s.to_string(), p.to_string(), row.remove(0)),
                (None, Some(p), Some(o)) => (row.remove(0), p.to_string(), o.to_string()),
                (Some(s), None, Some(o)) => (s.to_string(), row.remove(0), o.to_string()),
                (Some(s), None, None) => (s.to_string(), row.remove(0), row.remove(0)),
                (None, Some(p), None) => (row.remove(0), p.to_string(), row.remove(0)),
                (None, None, Some(o)) => (row.remove(0), row.remove(0), o.to_string()),
                (None, None, None) => (row.remove(0), row.remove(0), row.remove(0)),
            };
            matches.push(triple);
        }

        Ok(matches)
    }
}


fn one_column<'a>(members: MemberIter<'a>) -> RowIter<'a> {
    Box::new(members.map(|r| r.map(|v| vec![v])))
}

/// Rows from one middle map: iterate its entries under `outer_c`, then each
/// inner set under `inner_c`. Natural output is (entry key, member); `swap`
/// flips it for the predicate-only dispatch.
fn pair_columns<'a>(
    heap: &'a Heap,
    strings: SingletonAllocator,
    mid: SortedMap,
    outer_c: &'a Constraint<'a>,
    inner_c: &'a Constraint<'a>,
    swap: bool,
) -> RowIter<'a> {
    Box::new(map_entries(heap, strings, mid, outer_c).flat_map(
        move |entry| -> RowIter<'a> {
            match entry {
                Ok((key, set_off)) => {
                    let set = SortedSet::open(set_off);
                    Box::new(set_members(heap, strings, set, inner_c).map(move |r| {
                        r.map(|member| {
                            if swap {
                                vec![member, key.clone()]
                            } else {
                                vec![key.clone(), member]
                            }
                        })
                    }))
                }
                Err(e) => Box::new(iter::once(Err(e))),
            }
        },
    ))
}


/*
 * constraint-driven iteration over the persisted collections
 *
 * Ranges use the collection's bounded iterator; arrays always probe per
 * element in sorted order; sets and views probe only when they are the
 * smaller side; everything else scans and filters.
 */

pub(crate) fn set_members<'a>(
    heap: &'a Heap,
    strings: SingletonAllocator,
    set: SortedSet,
    constraint: &'a Constraint<'a>,
) -> MemberIter<'a> {
    match *constraint {
        Constraint::Empty => match set.iter(heap, strings, true) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(iter::once(Err(e))),
        },

        Constraint::Range(ref low, ref high) => match set.iter_range(heap, strings, low, high) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(iter::once(Err(e))),
        },

        Constraint::Array(ref values) => {
            let values = values.clone();
            Box::new(values.into_iter().filter_map(move |value| {
                match set.contains(heap, strings, &value) {
                    Ok(true) => Some(Ok(value)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            }))
        }

        _ => {
            if let Some(candidates) = smaller_side(constraint, set.count(heap)) {
                return Box::new(candidates.into_iter().filter_map(move |value| {
                    match set.contains(heap, strings, &value) {
                        Ok(true) => Some(Ok(value)),
                        Ok(false) => None,
                        Err(e) => Some(Err(e)),
                    }
                }));
            }

            match set.iter(heap, strings, true) {
                Ok(iter) => Box::new(iter.filter(move |r| match r {
                    Ok(v) => constraint.matches(v),
                    Err(_) => true,
                })),
                Err(e) => Box::new(iter::once(Err(e))),
            }
        }
    }
}

pub(crate) fn map_entries<'a>(
    heap: &'a Heap,
    strings: SingletonAllocator,
    map: SortedMap,
    constraint: &'a Constraint<'a>,
) -> EntryIter<'a> {
    match *constraint {
        Constraint::Empty => match map.iter(heap, strings, true) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(iter::once(Err(e))),
        },

        Constraint::Range(ref low, ref high) => match map.iter_range(heap, strings, low, high) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(iter::once(Err(e))),
        },

        Constraint::Array(ref keys) => {
            let keys = keys.clone();
            Box::new(keys.into_iter().filter_map(move |key| {
                match map.try_get(heap, strings, &key) {
                    Ok(Some(off)) => Some(Ok((key, off))),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            }))
        }

        _ => {
            if let Some(candidates) = smaller_side(constraint, map.count(heap)) {
                return Box::new(candidates.into_iter().filter_map(move |key| {
                    match map.try_get(heap, strings, &key) {
                        Ok(Some(off)) => Some(Ok((key, off))),
                        Ok(None) => None,
                        Err(e) => Some(Err(e)),
                    }
                }));
            }

            match map.iter(heap, strings, true) {
                Ok(iter) => Box::new(iter.filter(move |r| match r {
                    Ok((key, _)) => constraint.matches(key),
                    Err(_) => true,
                })),
                Err(e) => Box::new(iter::once(Err(e))),
            }
        }
    }
}

/// The constraint's candidates when probing them beats scanning the
/// collection
fn smaller_side(constraint: &Constraint, collection_count: Result<u64>) -> Option<Vec<String>> {
    let count = constraint.candidate_count()?;

    match collection_count {
        Ok(n) if count < n => constraint.candidates(),
        _ => None,
    }
}
