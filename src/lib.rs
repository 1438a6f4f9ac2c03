//!
//! tricrust is a persisted, embeddable triple store
//!
//! Triples of strings go in, range-constrained queries come out. The
//! engine underneath is a compacting block allocator persisted in a byte
//! stream, a balanced tree that stores offsets and defers ordering to
//! comparator callbacks, a singleton allocator that interns every term
//! once, and three orderings of the same triples so that any wildcard
//! pattern is answered in a single index traversal.
//!
//! ```no_run
//! use tricrust_lib::{Constraint, Environment, Graph};
//!
//! let env = Environment::memory();
//! let graph = Graph::open(&env, "family").unwrap();
//!
//! graph.assert("amidala", "mother", "luke").unwrap()
//!      .assert("amidala", "mother", "leia").unwrap();
//!
//! let solution = graph.enumerate(
//!     Constraint::empty(),
//!     Constraint::specific("mother"),
//!     Constraint::empty(),
//! ).unwrap();
//!
//! for row in solution.iter() {
//!     let row = row.unwrap();
//!     println!("{} is mothered by {}", row[1], row[0]);
//! }
//! ```
//!

#[macro_use]
extern crate slog;

pub mod config;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod index;
pub mod store;
pub mod view;

pub use crate::config::{Config, StoreStrategy};
pub use crate::constraint::Constraint;
pub use crate::error::{Error, Result};
pub use crate::graph::{Column, Graph, GraphTxn, Solution, Triple};
pub use crate::index::TripleIndex;
pub use crate::store::{
    AaTree, Codec, Environment, FileStream, Heap, MemoryStream, NullAllocator,
    ReferenceAllocator, SingletonAllocator, SortedMap, SortedSet, Stream, ValueAllocator,
};
pub use crate::view::{ConstrainedView, DirectView, Keyset, UnionView};
