//!
//! Constraints narrow one column of a triple query
//!
//! A constraint is a closed set of matcher shapes. Besides answering
//! `matches`, a constraint can tell the index layer whether it is cheaper
//! to enumerate its own candidates and probe the collection, or to scan
//! the collection and filter. Predicates can do neither and always force
//! a scan.
//!

use std::collections::BTreeSet;
use std::fmt;

use crate::view::Keyset;


pub enum Constraint<'a> {
    /// Matches anything
    Empty,

    /// Exact match
    Specific(String),

    /// Lexicographic half-open range `[low, high)`
    Range(String, String),

    /// Small sorted deduplicated vector
    Array(Vec<String>),

    /// Large membership set
    Set(BTreeSet<String>),

    /// Another query's result column
    View(&'a dyn Keyset),

    /// Arbitrary test with the polarity it must produce
    Predicate(Box<dyn Fn(&str) -> bool + Send + Sync + 'a>, bool),
}

impl<'a> Constraint<'a> {
    pub fn empty() -> Constraint<'a> {
        Constraint::Empty
    }

    pub fn specific<S: Into<String>>(value: S) -> Constraint<'a> {
        Constraint::Specific(value.into())
    }

    pub fn range<S: Into<String>>(low: S, high: S) -> Constraint<'a> {
        Constraint::Range(low.into(), high.into())
    }

    pub fn in_slice(values: &[&str]) -> Constraint<'a> {
        let mut values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        values.sort();
        values.dedup();
        Constraint::Array(values)
    }

    pub fn in_set(values: BTreeSet<String>) -> Constraint<'a> {
        Constraint::Set(values)
    }

    pub fn in_view(view: &'a dyn Keyset) -> Constraint<'a> {
        Constraint::View(view)
    }

    pub fn when_true<F: Fn(&str) -> bool + Send + Sync + 'a>(test: F) -> Constraint<'a> {
        Constraint::Predicate(Box::new(test), true)
    }

    pub fn when_false<F: Fn(&str) -> bool + Send + Sync + 'a>(test: F) -> Constraint<'a> {
        Constraint::Predicate(Box::new(test), false)
    }

    pub fn matches(&self, value: &str) -> bool {
        match *self {
            Constraint::Empty => true,
            Constraint::Specific(ref v) => v == value,
            Constraint::Range(ref low, ref high) => value >= low.as_str() && value < high.as_str(),
            Constraint::Array(ref values) => {
                values.binary_search_by(|p| p.as_str().cmp(value)).is_ok()
            }
            Constraint::Set(ref values) => values.contains(value),
            Constraint::View(view) => view.contains(value),
            Constraint::Predicate(ref test, polarity) => test(value) == polarity,
        }
    }

    pub fn is_specific(&self) -> bool {
        matches!(*self, Constraint::Specific(_))
    }

    pub fn as_specific(&self) -> Option<&str> {
        match *self {
            Constraint::Specific(ref v) => Some(v),
            _ => None,
        }
    }

    /// How many candidates the constraint can enumerate by itself; None
    /// when it cannot drive the iteration
    pub(crate) fn candidate_count(&self) -> Option<u64> {
        match *self {
            Constraint::Specific(_) => Some(1),
            Constraint::Array(ref values) => Some(values.len() as u64),
            Constraint::Set(ref values) => Some(values.len() as u64),
            Constraint::View(view) => Some(view.magnitude()),
            _ => None,
        }
    }

    /// The candidates themselves, in sorted order
    pub(crate) fn candidates(&self) -> Option<Vec<String>> {
        match *self {
            Constraint::Specific(ref v) => Some(vec![v.clone()]),
            Constraint::Array(ref values) => Some(values.clone()),
            Constraint::Set(ref values) => Some(values.iter().cloned().collect()),
            Constraint::View(view) => Some(view.iter().collect()),
            _ => None,
        }
    }
}

impl<'a> fmt::Debug for Constraint<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Constraint::Empty => write!(f, "Empty"),
            Constraint::Specific(ref v) => write!(f, "Specific({:?})", v),
            Constraint::Range(ref low, ref high) => write!(f, "Range({:?}, {:?})", low, high),
            Constraint::Array(ref values) => write!(f, "Array({:?})", values),
            Constraint::Set(ref values) => write!(f, "Set({} values)", values.len()),
            Constraint::View(view) => write!(f, "View({} keys)", view.magnitude()),
            Constraint::Predicate(_, polarity) => write!(f, "Predicate(polarity={})", polarity),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matches_anything() {
        assert!(Constraint::empty().matches(""));
        assert!(Constraint::empty().matches("anything"));
    }

    #[test]
    fn test_specific() {
        let c = Constraint::specific("luke");

        assert!(c.matches("luke"));
        assert!(!c.matches("leia"));
        assert_eq!(c.as_specific(), Some("luke"));
        assert!(c.is_specific());
    }

    #[test]
    fn test_range_is_half_open() {
        let c = Constraint::range("2012-08-08", "2012-08-17");

        assert!(c.matches("2012-08-08"));
        assert!(c.matches("2012-08-16"));
        assert!(!c.matches("2012-08-17"));
        assert!(!c.matches("2012-08-07"));
    }

    #[test]
    fn test_array_sorts_and_dedups() {
        let c = Constraint::in_slice(&["pear", "apple", "pear"]);

        match c {
            Constraint::Array(ref values) => assert_eq!(values, &["apple", "pear"]),
            _ => panic!("expected Array"),
        }
        assert!(c.matches("apple"));
        assert!(!c.matches("plum"));
        assert_eq!(c.candidate_count(), Some(2));
    }

    #[test]
    fn test_set() {
        let mut values = std::collections::BTreeSet::new();
        values.insert("a".to_string());
        values.insert("b".to_string());

        let c = Constraint::in_set(values);
        assert!(c.matches("a"));
        assert!(!c.matches("c"));
        assert_eq!(c.candidates().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_predicate_polarity() {
        let long = Constraint::when_true(|v: &str| v.len() > 3);
        assert!(long.matches("1234"));
        assert!(!long.matches("123"));

        let short = Constraint::when_false(|v: &str| v.len() > 3);
        assert!(short.matches("123"));
        assert!(!short.matches("1234"));

        // predicates cannot drive the iteration
        assert_eq!(long.candidate_count(), None);
        assert!(long.candidates().is_none());
    }
}
