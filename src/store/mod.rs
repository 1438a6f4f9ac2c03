//!
//! The storage engine: streams, the heap on top of them, the persisted
//! tree and the allocator strategies, and the environment that owns it all
//!
//! An `Environment` resolves stores by name. Under the single-store
//! strategy every name shares one heap and the named roots arbitrate;
//! under the poly-store strategy each name gets a heap and data file of
//! its own. Either way a heap owns its stream exclusively for as long as
//! the environment lives.
//!

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::config::{Config, StoreStrategy};
use crate::error::Result;

pub mod aa_tree;
pub mod allocator;
pub mod heap;
pub mod sorted_map;
pub mod sorted_set;
pub mod stream;

pub use self::aa_tree::AaTree;
pub use self::allocator::{
    Codec, NullAllocator, ReferenceAllocator, SingletonAllocator, ValueAllocator,
    SINGLETON_INDEX_ROOT,
};
pub use self::heap::Heap;
pub use self::sorted_map::SortedMap;
pub use self::sorted_set::SortedSet;
pub use self::stream::{FileStream, MemoryStream, Stream};

/// Store name every request resolves to under the single-store strategy
const SINGLE_STORE_NAME: &str = "store";


struct Store {
    name: String,
    heap: Heap,
}

pub(crate) struct EnvState {
    strategy:     StoreStrategy,
    root:         Option<PathBuf>,
    initial_size: u64,
    max_size:     u64,
    stores:       Vec<Store>,
    log:          slog::Logger,
}

impl EnvState {
    /// Index of the heap backing `name`, opening it on first use
    pub(crate) fn store_index(&mut self, name: &str) -> Result<usize> {
        let effective = match self.strategy {
            StoreStrategy::SingleStore => SINGLE_STORE_NAME,
            StoreStrategy::PolyStore => name,
        };

        if let Some(idx) = self.stores.iter().position(|s| s.name == effective) {
            return Ok(idx);
        }

        let heap = self.open_heap(effective)?;
        self.stores.push(Store {
            name: effective.to_string(),
            heap,
        });

        Ok(self.stores.len() - 1)
    }

    fn open_heap(&self, name: &str) -> Result<Heap> {
        let log = self.log.new(o!("store" => name.to_string()));

        match self.root {
            None => heap::Heap::new(Box::new(MemoryStream::new()), log),

            Some(ref root) => {
                let path = root.join(format!("{}-0000", name));
                let stream = FileStream::open(&path, self.initial_size, self.max_size)?;
                heap::Heap::new(Box::new(stream), log)
            }
        }
    }

    pub(crate) fn heap(&self, idx: usize) -> &Heap {
        &self.stores[idx].heap
    }

    pub(crate) fn heap_mut(&mut self, idx: usize) -> &mut Heap {
        &mut self.stores[idx].heap
    }

    pub(crate) fn logger(&self) -> &slog::Logger {
        &self.log
    }

    fn flush(&mut self) -> Result<()> {
        for store in &mut self.stores {
            store.heap.flush()?;
        }
        Ok(())
    }
}

impl Drop for EnvState {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(self.log, "environment - flush on close failed"; "error" => %e);
        }
    }
}


/// Process-wide context owning the heaps and their streams
///
/// Cheap to clone; all clones share the same state behind one
/// reader-writer lock, which is also the lock the graphs on top use to
/// order their mutations.
#[derive(Clone)]
pub struct Environment {
    state: Arc<RwLock<EnvState>>,
}

impl Environment {
    /// A scratch environment backed by memory streams
    pub fn memory() -> Environment {
        Environment::memory_with_logger(slog::Logger::root(slog::Discard, o!()))
    }

    pub fn memory_with_logger(log: slog::Logger) -> Environment {
        Environment {
            state: Arc::new(RwLock::new(EnvState {
                strategy: StoreStrategy::SingleStore,
                root: None,
                initial_size: 0,
                max_size: 0,
                stores: Vec::new(),
                log,
            })),
        }
    }

    /// Opens a file-backed environment rooted at the config's directory
    pub fn open(config: &Config, log: slog::Logger) -> Result<Environment> {
        fs::create_dir_all(&config.root)?;

        info!(log, "environment - open";
            "root" => %config.root.display(),
            "strategy" => ?config.strategy
        );

        Ok(Environment {
            state: Arc::new(RwLock::new(EnvState {
                strategy: config.strategy,
                root: Some(config.root.clone()),
                initial_size: config.initial_size,
                max_size: config.max_size,
                stores: Vec::new(),
                log,
            })),
        })
    }

    pub(crate) fn state(&self) -> &RwLock<EnvState> {
        &self.state
    }

    /// Flushes every open heap to its stream
    pub fn flush(&self) -> Result<()> {
        self.state.write().expect("poisoned environment lock").flush()
    }

    /// Names of the heaps opened so far
    pub fn store_names(&self) -> Vec<String> {
        self.state
            .read()
            .expect("poisoned environment lock")
            .stores
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Named roots of the store behind `name`, opening it if needed
    pub fn roots(&self, name: &str) -> Result<Vec<String>> {
        let mut state = self.state.write().expect("poisoned environment lock");
        let idx = state.store_index(name)?;
        state.heap(idx).roots()
    }
}
