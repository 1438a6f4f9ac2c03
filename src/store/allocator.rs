//!
//! Allocator strategies map values to offsets and back
//!
//! The closed set of strategies:
//!
//! * null      - the value is a primitive that fits in an offset; the value
//!               IS the offset and no block backs it
//! * value     - every alloc writes a fresh block holding the encoded value
//! * singleton - interned strings; equal strings share one block, tracked
//!               by a refcount in a shared index tree
//! * reference - persisted objects (trees) referenced by their header
//!               offset, with the refcount kept in the header itself
//!
//! Each strategy also knows how to compare a search value against a stored
//! offset, so the ordered containers can delegate "dereference and order"
//! wholesale.
//!

use std::cmp::Ordering;
use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::store::aa_tree::{AaTree, Dispose};
use crate::store::heap::Heap;

/// Name of the shared intern index in the heap's root table
pub const SINGLETON_INDEX_ROOT: &str = "SingletonAllocatorOfString.Index";


/// Byte encoding for values kept in value blocks
pub trait Codec: Sized {
    fn encode(&self, out: &mut Vec<u8>);
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Codec for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.write_u64::<LittleEndian>(*self).unwrap();
    }

    fn decode(bytes: &[u8]) -> Result<u64> {
        if bytes.len() < 8 {
            return Err(Error::Corrupt("value block too small for u64"));
        }
        Ok(LittleEndian::read_u64(bytes))
    }
}

impl Codec for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Corrupt("value block is not utf-8"))
    }
}


/// Identity strategy for primitives
pub struct NullAllocator;

impl NullAllocator {
    pub fn alloc(&self, _heap: &mut Heap, value: u64) -> Result<u64> {
        Ok(value)
    }

    pub fn free(&self, _heap: &mut Heap, _off: u64) -> Result<()> {
        Ok(())
    }

    pub fn read(&self, _heap: &Heap, off: u64) -> Result<u64> {
        Ok(off)
    }

    pub fn compare(&self, _heap: &Heap, stored: u64, value: u64) -> Result<Ordering> {
        Ok(value.cmp(&stored))
    }
}


/// One fresh block per allocation
pub struct ValueAllocator<T> {
    _values: PhantomData<T>,
}

impl<T: Codec + Ord> ValueAllocator<T> {
    pub fn new() -> ValueAllocator<T> {
        ValueAllocator { _values: PhantomData }
    }

    pub fn alloc(&self, heap: &mut Heap, value: &T) -> Result<u64> {
        let mut bytes = Vec::new();
        value.encode(&mut bytes);

        let off = heap.alloc(bytes.len() as u64)?;
        heap.write(off, &bytes)?;
        Ok(off)
    }

    pub fn free(&self, heap: &mut Heap, off: u64) -> Result<()> {
        heap.free(off)
    }

    pub fn read(&self, heap: &Heap, off: u64) -> Result<T> {
        T::decode(&heap.read(off)?)
    }

    pub fn compare(&self, heap: &Heap, stored: u64, value: &T) -> Result<Ordering> {
        Ok(value.cmp(&self.read(heap, stored)?))
    }
}

impl<T: Codec + Ord> Default for ValueAllocator<T> {
    fn default() -> ValueAllocator<T> {
        ValueAllocator::new()
    }
}


/// Interned strings over a shared index tree
///
/// The index has two data words per node: the string block and the number
/// of live references to it. Equal strings always resolve to the same
/// offset, so offset equality is string equality.
#[derive(Clone, Copy)]
pub struct SingletonAllocator {
    index: AaTree,
}

impl SingletonAllocator {
    /// Opens the intern index of `heap`, creating and rooting it on first use
    pub fn open(heap: &mut Heap) -> Result<SingletonAllocator> {
        let off = heap.get_root(SINGLETON_INDEX_ROOT)?;

        if off != 0 {
            return Ok(SingletonAllocator { index: AaTree::open(off) });
        }

        let index = AaTree::create(heap, 2)?;
        heap.set_root(SINGLETON_INDEX_ROOT, index.offset())?;
        Ok(SingletonAllocator { index })
    }

    pub fn index(&self) -> AaTree {
        self.index
    }

    /// Interns `value`, bumping the refcount if it is already present
    pub fn alloc(&self, heap: &mut Heap, value: &str) -> Result<u64> {
        let mut out = 0u64;

        self.index.insert(
            heap,
            &mut |h, stored| self.compare(h, stored, value),
            &mut |h, data| {
                if data[0] == 0 {
                    let block = h.alloc(value.len() as u64)?;
                    h.write(block, value.as_bytes())?;
                    data[0] = block;
                    data[1] = 1;
                } else {
                    data[1] += 1;
                }
                out = data[0];
                Ok(())
            },
        )?;

        Ok(out)
    }

    /// Drops one reference; the last one removes the index entry and frees
    /// the string block
    pub fn free(&self, heap: &mut Heap, off: u64) -> Result<()> {
        let value = self.read(heap, off)?;

        let mut last = false;
        let found = self.index.update(
            heap,
            &mut |h, stored| self.compare(h, stored, &value),
            &mut |data| {
                assert!(data[1] > 0, "refcount underflow for interned string");
                data[1] -= 1;
                last = data[1] == 0;
                Ok(())
            },
        )?;
        assert!(found, "free of a string that was never interned");

        if last {
            self.index.remove(
                heap,
                &mut |h, stored| self.compare(h, stored, &value),
                &mut |h, data| h.free(data[0]),
            )?;
        }

        Ok(())
    }

    pub fn read(&self, heap: &Heap, off: u64) -> Result<String> {
        let bytes = heap.read(off)?;
        String::from_utf8(bytes).map_err(|_| Error::Corrupt("interned string is not utf-8"))
    }

    /// Ordering of the search `value` relative to the string at `stored`
    pub fn compare(&self, heap: &Heap, stored: u64, value: &str) -> Result<Ordering> {
        let bytes = heap.read(stored)?;
        let stored_bytes: &[u8] = &bytes;
        Ok(value.as_bytes().cmp(&stored_bytes))
    }

    /// Offset of `value` if it is interned, zero otherwise
    pub fn lookup(&self, heap: &Heap, value: &str) -> Result<u64> {
        let found = self.index.search(heap, &mut |h, stored| self.compare(h, stored, value))?;
        Ok(found.map_or(0, |data| data[0]))
    }

    /// Live references to `value`, zero when it is not interned
    pub fn refcount(&self, heap: &Heap, value: &str) -> Result<u64> {
        let found = self.index.search(heap, &mut |h, stored| self.compare(h, stored, value))?;
        Ok(found.map_or(0, |data| data[1]))
    }

    /// Number of distinct interned strings
    pub fn count(&self, heap: &Heap) -> Result<u64> {
        self.index.count(heap)
    }
}


/// Refcounted roots of nested persisted objects
pub struct ReferenceAllocator;

impl ReferenceAllocator {
    /// Records a reference to the object and returns its root offset
    pub fn alloc(&self, heap: &mut Heap, object: &AaTree) -> Result<u64> {
        object.increase_ref(heap)?;
        Ok(object.offset())
    }

    /// Drops a reference; at zero the object is destroyed through `dispose`.
    /// Returns whether destruction happened.
    pub fn free(&self, heap: &mut Heap, off: u64, dispose: &mut Dispose) -> Result<bool> {
        let tree = AaTree::open(off);

        if tree.decrease_ref(heap)? == 0 {
            tree.destroy(heap, dispose)?;
            return Ok(true);
        }

        Ok(false)
    }
}
