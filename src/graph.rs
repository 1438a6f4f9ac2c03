//!
//! The graph facade over the triple index
//!
//! A `Graph` is opened by name inside an `Environment` and finds its three
//! index orderings back through named roots. Mutations take the writer
//! side of the environment lock, queries the reader side; a `Solution`
//! keeps hold of the reader lock until it is dropped, so its iteration
//! sees a consistent snapshot.
//!
//! Inference rules fire once per top-level assertion, before the triple
//! itself is inserted, inside the writer lock. The `GraphTxn` handed to a
//! rule can assert and retract without re-firing the rule chain, and
//! deliberately offers no query surface.
//!

use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::constraint::Constraint;
use crate::error::Result;
use crate::index::{map_entries, set_members, RowIter, TripleIndex};
use crate::store::allocator::SingletonAllocator;
use crate::store::heap::Heap;
use crate::store::sorted_map::SortedMap;
use crate::store::sorted_set::SortedSet;
use crate::store::{EnvState, Environment};
use crate::view::{DirectView, Keyset, UnionView};

/// Default graph name used for root naming when none is given
pub const DEFAULT_GRAPH: &str = "Default";


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject:   String,
    pub predicate: String,
    pub object:    String,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: &str) -> Triple {
        Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Subject,
    Predicate,
    Object,
}

pub type Rule = dyn Fn(&mut GraphTxn, &Triple) -> Result<()> + Send + Sync;


pub struct Graph {
    env:     Environment,
    name:    String,
    store:   usize,
    strings: SingletonAllocator,
    index:   TripleIndex,
    rules:   RwLock<Vec<Arc<Rule>>>,
    log:     slog::Logger,
}

impl Graph {
    /// Opens `name` inside the environment, creating its roots on first use
    pub fn open(env: &Environment, name: &str) -> Result<Graph> {
        let mut state = env.state().write().expect("poisoned environment lock");

        let store = state.store_index(name)?;
        let log = state.logger().new(o!("graph" => name.to_string()));

        let heap = state.heap_mut(store);
        let strings = SingletonAllocator::open(heap)?;
        let index = TripleIndex::open(heap, name)?;

        drop(state);

        info!(log, "graph - open");

        Ok(Graph {
            env: env.clone(),
            name: name.to_string(),
            store,
            strings,
            index,
            rules: RwLock::new(Vec::new()),
            log,
        })
    }

    /// Opens the default graph
    pub fn open_default(env: &Environment) -> Result<Graph> {
        Graph::open(env, DEFAULT_GRAPH)
    }

    pub fn name(&self) -> &str {
        &self.name
    }


    /*
     * mutation
     */

    /// Asserts one triple; inference rules fire first
    pub fn assert(&self, s: &str, p: &str, o: &str) -> Result<&Graph> {
        let mut state = self.env.state().write().expect("poisoned environment lock");
        self.assert_locked(&mut state, s, p, o)?;
        Ok(self)
    }

    /// Asserts a batch under one writer lock
    pub fn assert_all(&self, triples: &[(&str, &str, &str)]) -> Result<&Graph> {
        let mut state = self.env.state().write().expect("poisoned environment lock");
        for (s, p, o) in triples {
            self.assert_locked(&mut state, s, p, o)?;
        }
        Ok(self)
    }

    fn assert_locked(&self, state: &mut EnvState, s: &str, p: &str, o: &str) -> Result<()> {
        let rules: Vec<Arc<Rule>> = self.rules.read().expect("poisoned rule list").clone();

        if !rules.is_empty() {
            let triple = Triple::new(s, p, o);
            let mut txn = GraphTxn {
                heap: state.heap_mut(self.store),
                strings: self.strings,
                index: self.index,
            };
            for rule in &rules {
                rule(&mut txn, &triple)?;
            }
        }

        let added = self
            .index
            .assert_one(state.heap_mut(self.store), self.strings, s, p, o)?;

        trace!(self.log, "graph - assert"; "s" => s, "p" => p, "o" => o, "added" => added);
        Ok(())
    }

    /// Retracts triples; None is a wildcard. Returns how many went.
    pub fn retract(&self, s: Option<&str>, p: Option<&str>, o: Option<&str>) -> Result<u64> {
        let mut state = self.env.state().write().expect("poisoned environment lock");

        let removed = retract_pattern(state.heap_mut(self.store), self.strings, self.index, s, p, o)?;

        trace!(self.log, "graph - retract";
            "s" => s.unwrap_or("*"),
            "p" => p.unwrap_or("*"),
            "o" => o.unwrap_or("*"),
            "removed" => removed
        );
        Ok(removed)
    }

    /// Retracts a batch of concrete triples under one writer lock
    pub fn retract_all(&self, triples: &[(&str, &str, &str)]) -> Result<u64> {
        let mut state = self.env.state().write().expect("poisoned environment lock");

        let mut removed = 0;
        for (s, p, o) in triples {
            if self
                .index
                .remove_one(state.heap_mut(self.store), self.strings, s, p, o)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Empties the graph; the roots and index structures stay
    pub fn clear(&self) -> Result<()> {
        let mut state = self.env.state().write().expect("poisoned environment lock");

        let removed =
            retract_pattern(state.heap_mut(self.store), self.strings, self.index, None, None, None)?;

        info!(self.log, "graph - clear"; "removed" => removed);
        Ok(())
    }

    /// Registers an inference rule; fires on every later assertion
    pub fn infer<F>(&self, rule: F) -> Result<()>
    where
        F: Fn(&mut GraphTxn, &Triple) -> Result<()> + Send + Sync + 'static,
    {
        // registration serialises with mutations like any other write
        let _state = self.env.state().write().expect("poisoned environment lock");
        self.rules.write().expect("poisoned rule list").push(Arc::new(rule));
        Ok(())
    }


    /*
     * queries
     */

    pub fn is_true(&self, s: &str, p: &str, o: &str) -> Result<bool> {
        let state = self.env.state().read().expect("poisoned environment lock");
        self.index.contains(state.heap(self.store), self.strings, s, p, o)
    }

    pub fn count(&self) -> Result<u64> {
        let state = self.env.state().read().expect("poisoned environment lock");
        self.index.count(state.heap(self.store), self.strings)
    }

    /// Runs a constrained query. The solution holds the reader lock for as
    /// long as it lives.
    pub fn enumerate<'g, 'c>(
        &'g self,
        cs: Constraint<'c>,
        cp: Constraint<'c>,
        co: Constraint<'c>,
    ) -> Result<Solution<'g, 'c>> {
        let guard = self.env.state().read().expect("poisoned environment lock");

        let mut columns = Vec::new();
        if !cs.is_specific() {
            columns.push(Column::Subject);
        }
        if !cp.is_specific() {
            columns.push(Column::Predicate);
        }
        if !co.is_specific() {
            columns.push(Column::Object);
        }

        Ok(Solution {
            guard,
            store: self.store,
            strings: self.strings,
            index: self.index,
            cs,
            cp,
            co,
            columns,
        })
    }
}

fn retract_pattern(
    heap: &mut Heap,
    strings: SingletonAllocator,
    index: TripleIndex,
    s: Option<&str>,
    p: Option<&str>,
    o: Option<&str>,
) -> Result<u64> {
    let cs = wildcard(s);
    let cp = wildcard(p);
    let co = wildcard(o);

    let matches = index.collect_matches(heap, strings, &cs, &cp, &co)?;

    let mut removed = 0;
    for (s, p, o) in &matches {
        if index.remove_one(heap, strings, s, p, o)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn wildcard(value: Option<&str>) -> Constraint<'static> {
    match value {
        Some(v) => Constraint::specific(v),
        None => Constraint::Empty,
    }
}


/// Mutation handle passed to inference rules
///
/// Asserts and retracts go straight to the index without re-firing the
/// rule chain; there is intentionally no way to query from here.
pub struct GraphTxn<'a> {
    heap:    &'a mut Heap,
    strings: SingletonAllocator,
    index:   TripleIndex,
}

impl<'a> GraphTxn<'a> {
    pub fn assert(&mut self, s: &str, p: &str, o: &str) -> Result<bool> {
        self.index.assert_one(self.heap, self.strings, s, p, o)
    }

    pub fn retract(&mut self, s: Option<&str>, p: Option<&str>, o: Option<&str>) -> Result<u64> {
        retract_pattern(self.heap, self.strings, self.index, s, p, o)
    }
}


/// The result of one query
///
/// Yields rows holding only the wildcard columns, in (subject, predicate,
/// object) order, and exposes a keyset view per wildcard column so callers
/// can size their joins before pulling rows.
pub struct Solution<'g, 'c> {
    guard:   RwLockReadGuard<'g, EnvState>,
    store:   usize,
    strings: SingletonAllocator,
    index:   TripleIndex,
    cs:      Constraint<'c>,
    cp:      Constraint<'c>,
    co:      Constraint<'c>,
    columns: Vec<Column>,
}

impl<'g, 'c> Solution<'g, 'c> {
    /// The wildcard columns, in output order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Lazy row iteration under the held reader lock
    pub fn iter(&self) -> RowIter<'_> {
        let heap = self.guard.heap(self.store);
        self.index.rows(heap, self.strings, &self.cs, &self.cp, &self.co)
    }

    /// All rows, materialised
    pub fn rows(&self) -> Result<Vec<Vec<String>>> {
        self.iter().collect()
    }

    pub fn len(&self) -> Result<u64> {
        let mut n = 0;
        for row in self.iter() {
            row?;
            n += 1;
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.iter().next().transpose()?.is_none())
    }

    /// View over the values of one wildcard column; None for a specific
    /// column
    pub fn view(&self, column: Column) -> Result<Option<Box<dyn Keyset + '_>>> {
        let heap = self.guard.heap(self.store);
        let strings = self.strings;
        let index = self.index;

        let constraint = match column {
            Column::Subject => &self.cs,
            Column::Predicate => &self.cp,
            Column::Object => &self.co,
        };
        if constraint.is_specific() {
            return Ok(None);
        }

        let shape = (
            self.cs.as_specific(),
            self.cp.as_specific(),
            self.co.as_specific(),
        );

        let view: Box<dyn Keyset + '_> = match (shape, column) {
            // inner set columns
            ((Some(s), Some(p), None), Column::Object) => {
                match index.mid_of(heap, strings, index.spo, s)? {
                    Some(mid) => match TripleIndex::set_of(heap, strings, mid, p)? {
                        Some(set) => Box::new(DirectView::over_set(heap, strings, set, Some(&self.co))),
                        None => Box::new(UnionView::empty()),
                    },
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, Some(p), Some(o)), Column::Subject) => {
                match index.mid_of(heap, strings, index.pos, p)? {
                    Some(mid) => match TripleIndex::set_of(heap, strings, mid, o)? {
                        Some(set) => Box::new(DirectView::over_set(heap, strings, set, Some(&self.cs))),
                        None => Box::new(UnionView::empty()),
                    },
                    None => Box::new(UnionView::empty()),
                }
            }
            ((Some(s), None, Some(o)), Column::Predicate) => {
                match index.mid_of(heap, strings, index.osp, o)? {
                    Some(mid) => match TripleIndex::set_of(heap, strings, mid, s)? {
                        Some(set) => Box::new(DirectView::over_set(heap, strings, set, Some(&self.cp))),
                        None => Box::new(UnionView::empty()),
                    },
                    None => Box::new(UnionView::empty()),
                }
            }

            // middle map key columns
            ((Some(s), None, None), Column::Predicate) => {
                match index.mid_of(heap, strings, index.spo, s)? {
                    Some(mid) => Box::new(DirectView::over_map_keys(heap, strings, mid, Some(&self.cp))),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, Some(p), None), Column::Object) => {
                match index.mid_of(heap, strings, index.pos, p)? {
                    Some(mid) => Box::new(DirectView::over_map_keys(heap, strings, mid, Some(&self.co))),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, None, Some(o)), Column::Subject) => {
                match index.mid_of(heap, strings, index.osp, o)? {
                    Some(mid) => Box::new(DirectView::over_map_keys(heap, strings, mid, Some(&self.cs))),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, None, None), Column::Subject) => {
                Box::new(DirectView::over_map_keys(heap, strings, index.spo, Some(&self.cs)))
            }

            // innermost columns behind an iterated level: materialise the
            // union of the matching sets
            ((Some(s), None, None), Column::Object) => {
                match index.mid_of(heap, strings, index.spo, s)? {
                    Some(mid) => Box::new(self.union_of_members(heap, mid, &self.cp, &self.co)?),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, Some(p), None), Column::Subject) => {
                match index.mid_of(heap, strings, index.pos, p)? {
                    Some(mid) => Box::new(self.union_of_members(heap, mid, &self.co, &self.cs)?),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, None, Some(o)), Column::Predicate) => {
                match index.mid_of(heap, strings, index.osp, o)? {
                    Some(mid) => Box::new(self.union_of_members(heap, mid, &self.cs, &self.cp)?),
                    None => Box::new(UnionView::empty()),
                }
            }
            ((None, None, None), Column::Predicate) => {
                let mut values = Vec::new();
                for outer in map_entries(heap, strings, index.spo, &self.cs) {
                    let (_, mid_off) = outer?;
                    let mid = SortedMap::open(mid_off);
                    for inner in map_entries(heap, strings, mid, &self.cp) {
                        values.push(inner?.0);
                    }
                }
                Box::new(UnionView::from_values(values))
            }
            ((None, None, None), Column::Object) => {
                let mut values = Vec::new();
                for outer in map_entries(heap, strings, index.spo, &self.cs) {
                    let (_, mid_off) = outer?;
                    let mid = SortedMap::open(mid_off);
                    for inner in map_entries(heap, strings, mid, &self.cp) {
                        let (_, set_off) = inner?;
                        let set = SortedSet::open(set_off);
                        for member in set_members(heap, strings, set, &self.co) {
                            values.push(member?);
                        }
                    }
                }
                Box::new(UnionView::from_values(values))
            }

            // a specific column, already handled above
            _ => return Ok(None),
        };

        Ok(Some(view))
    }

    /// Union of the members of every inner set whose middle key passes
    /// `entry_c`, filtered by `member_c`
    fn union_of_members(
        &self,
        heap: &Heap,
        mid: SortedMap,
        entry_c: &Constraint,
        member_c: &Constraint,
    ) -> Result<UnionView> {
        let mut values = Vec::new();

        for entry in map_entries(heap, self.strings, mid, entry_c) {
            let (_, set_off) = entry?;
            let set = SortedSet::open(set_off);
            for member in set_members(heap, self.strings, set, member_c) {
                values.push(member?);
            }
        }

        Ok(UnionView::from_values(values))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn family_graph() -> (Environment, Graph) {
        let env = Environment::memory();
        let graph = Graph::open(&env, "family").unwrap();

        graph
            .assert_all(&[
                ("luke", "brother", "leia"),
                ("leia", "sister", "luke"),
                ("amidala", "mother", "luke"),
                ("amidala", "mother", "leia"),
                ("anakin", "father", "luke"),
                ("anakin", "father", "leia"),
            ])
            .unwrap();

        (env, graph)
    }

    fn sorted_rows(solution: &Solution) -> Vec<Vec<String>> {
        let mut rows = solution.rows().unwrap();
        rows.sort();
        rows
    }

    #[test]
    fn test_mutations_under_terminal_logger() {
        use slog::Drain;

        let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
        let log = slog::Logger::root(slog_term::FullFormat::new(plain).build().fuse(), o!());

        let env = Environment::memory_with_logger(log);
        let graph = Graph::open(&env, "family").unwrap();

        graph.assert("luke", "brother", "leia").unwrap();
        assert_eq!(graph.retract(None, Some("brother"), None).unwrap(), 1);
        assert_eq!(graph.count().unwrap(), 0);
    }

    #[test]
    fn test_is_true() {
        let (_env, graph) = family_graph();

        assert!(graph.is_true("luke", "brother", "leia").unwrap());
        assert!(!graph.is_true("leia", "brother", "luke").unwrap());
        assert_eq!(graph.count().unwrap(), 6);
    }

    #[test]
    fn test_query_by_predicate() {
        let (_env, graph) = family_graph();

        let solution = graph
            .enumerate(Constraint::empty(), Constraint::specific("mother"), Constraint::empty())
            .unwrap();

        assert_eq!(solution.columns(), &[Column::Subject, Column::Object]);
        assert_eq!(
            sorted_rows(&solution),
            vec![
                vec!["amidala".to_string(), "leia".to_string()],
                vec!["amidala".to_string(), "luke".to_string()],
            ]
        );
    }

    #[test]
    fn test_fully_specified_query() {
        let (_env, graph) = family_graph();

        let hit = graph
            .enumerate(
                Constraint::specific("luke"),
                Constraint::specific("brother"),
                Constraint::specific("leia"),
            )
            .unwrap();
        assert!(hit.columns().is_empty());
        assert_eq!(hit.len().unwrap(), 1);

        let miss = graph
            .enumerate(
                Constraint::specific("luke"),
                Constraint::specific("mother"),
                Constraint::specific("leia"),
            )
            .unwrap();
        assert!(miss.is_empty().unwrap());
    }

    #[test]
    fn test_retract_by_wildcard() {
        let (_env, graph) = family_graph();

        assert_eq!(graph.retract(None, Some("mother"), None).unwrap(), 2);
        assert_eq!(graph.count().unwrap(), 4);
        assert!(!graph.is_true("amidala", "mother", "luke").unwrap());
        assert!(graph.is_true("anakin", "father", "luke").unwrap());
    }

    #[test]
    fn test_clear() {
        let (_env, graph) = family_graph();

        graph.clear().unwrap();
        assert_eq!(graph.count().unwrap(), 0);

        // the graph stays usable
        graph.assert("rey", "student", "luke").unwrap();
        assert_eq!(graph.count().unwrap(), 1);
    }

    #[test]
    fn test_views() {
        let (_env, graph) = family_graph();

        let solution = graph
            .enumerate(Constraint::empty(), Constraint::specific("mother"), Constraint::empty())
            .unwrap();

        let subjects = solution.view(Column::Subject).unwrap().unwrap();
        assert_eq!(subjects.magnitude(), 1);
        assert!(subjects.contains("amidala"));

        let objects = solution.view(Column::Object).unwrap().unwrap();
        assert_eq!(objects.magnitude(), 2);
        assert_eq!(objects.iter().collect::<Vec<_>>(), vec!["leia", "luke"]);

        assert!(solution.view(Column::Predicate).unwrap().is_none());
    }

    #[test]
    fn test_view_feeds_next_query() {
        let (_env, graph) = family_graph();

        let mothered = graph
            .enumerate(Constraint::empty(), Constraint::specific("mother"), Constraint::empty())
            .unwrap();
        let children = mothered.view(Column::Object).unwrap().unwrap();

        // who do the children point at themselves?
        let solution = graph
            .enumerate(Constraint::in_view(&*children), Constraint::empty(), Constraint::empty())
            .unwrap();

        assert_eq!(
            sorted_rows(&solution),
            vec![
                vec!["leia".to_string(), "sister".to_string(), "luke".to_string()],
                vec!["luke".to_string(), "brother".to_string(), "leia".to_string()],
            ]
        );
    }

    #[test]
    fn test_inference_rule() {
        let env = Environment::memory();
        let graph = Graph::open(&env, "family").unwrap();

        graph
            .infer(|txn, triple| {
                if triple.predicate == "brother" || triple.predicate == "sister" {
                    txn.assert(&triple.object, "sibling", &triple.subject)?;
                }
                Ok(())
            })
            .unwrap();

        graph.assert("luke", "brother", "leia").unwrap();

        assert!(graph.is_true("leia", "sibling", "luke").unwrap());
        // the rule fires before insertion and only for the top-level triple
        assert_eq!(graph.count().unwrap(), 2);
    }

    #[test]
    fn test_range_query_over_dates() {
        fn next_day(date: &str) -> String {
            let year: u32 = date[0..4].parse().unwrap();
            let month: u32 = date[5..7].parse().unwrap();
            let day: u32 = date[8..10].parse().unwrap();

            let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
            let days_in_month = match month {
                1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
                4 | 6 | 9 | 11 => 30,
                2 if leap => 29,
                _ => 28,
            };

            let (year, month, day) = if day < days_in_month {
                (year, month, day + 1)
            } else if month < 12 {
                (year, month + 1, 1)
            } else {
                (year + 1, 1, 1)
            };

            format!("{:04}-{:02}-{:02}", year, month, day)
        }

        let env = Environment::memory();
        let graph = Graph::open(&env, "finance").unwrap();

        let mut date = "2011-01-01".to_string();
        let mut quote = 0u32;
        while date.as_str() <= "2013-01-19" {
            graph.assert("fund", &date, &format!("{}", 100 + quote % 17)).unwrap();
            date = next_day(&date);
            quote += 1;
        }

        let solution = graph
            .enumerate(
                Constraint::specific("fund"),
                Constraint::range("2012-08-08", "2012-08-17"),
                Constraint::empty(),
            )
            .unwrap();

        assert_eq!(solution.columns(), &[Column::Predicate, Column::Object]);
        assert_eq!(solution.len().unwrap(), 9);

        let rows = solution.rows().unwrap();
        assert_eq!(rows.first().unwrap()[0], "2012-08-08");
        assert_eq!(rows.last().unwrap()[0], "2012-08-16");
    }

    #[test]
    fn test_persistence_across_reopen() {
        let cfg = Config::new_test();

        {
            let env = Environment::open(&cfg, slog::Logger::root(slog::Discard, o!())).unwrap();
            let graph = Graph::open(&env, "family").unwrap();

            graph
                .assert_all(&[
                    ("luke", "brother", "leia"),
                    ("amidala", "mother", "luke"),
                    ("anakin", "father", "luke"),
                ])
                .unwrap();

            env.flush().unwrap();
        }

        let env = Environment::open(&cfg, slog::Logger::root(slog::Discard, o!())).unwrap();
        let graph = Graph::open(&env, "family").unwrap();

        assert_eq!(graph.count().unwrap(), 3);
        assert!(graph.is_true("amidala", "mother", "luke").unwrap());

        drop(graph);
        drop(env);
        std::fs::remove_dir_all(&cfg.root).unwrap();
    }

    #[test]
    fn test_concurrent_readers() {
        let (_env, graph) = family_graph();
        let graph = std::sync::Arc::new(graph);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let graph = graph.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        assert!(graph.is_true("luke", "brother", "leia").unwrap());
                        let solution = graph
                            .enumerate(
                                Constraint::empty(),
                                Constraint::specific("father"),
                                Constraint::empty(),
                            )
                            .unwrap();
                        assert_eq!(solution.len().unwrap(), 2);
                    }
                })
            })
            .collect();

        for handle in readers {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_writer_and_readers() {
        let env = Environment::memory();
        let graph = std::sync::Arc::new(Graph::open(&env, "load").unwrap());

        let writer = {
            let graph = graph.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let subject = format!("node-{}", i);
                    graph.assert(&subject, "links", "hub").unwrap();
                }
            })
        };

        let reader = {
            let graph = graph.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    // counts grow monotonically under the lock
                    let _ = graph.count().unwrap();
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(graph.count().unwrap(), 100);
    }
}
