//!
//! A Heap is a block allocator persisted in a Stream
//!
//! The stream starts with a fixed 48-byte prefix:
//!
//! Byte 0-7   magic tag
//! Byte 8-15  version
//! Byte 16-23 end of the last block
//! Byte 24-31 head of the free list
//! Byte 32-39 head of the named-root chain
//! Byte 40-47 named-root count
//!
//! Blocks follow back to back. Each block is a 32-byte header
//! `{payload_size, flags, prev_free, next_free}` followed by a payload of
//! exactly the requested size. Offsets handed out point at the payload;
//! offset zero is the null sentinel.
//!
//! Free blocks are kept in a doubly-linked list in offset order, so the
//! physically adjacent neighbours of a freed block are its list neighbours
//! and coalescing is a matter of checking whether they touch.
//!

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::store::stream::Stream;

const MAGIC:   u64 = 0x7473_7572_6369_7274;
const VERSION: u64 = 1;

const PREFIX_SIZE: u64 = 48;

const OFF_MAGIC:      u64 = 0;
const OFF_VERSION:    u64 = 8;
const OFF_END:        u64 = 16;
const OFF_FREE_HEAD:  u64 = 24;
const OFF_ROOT_HEAD:  u64 = 32;
const OFF_ROOT_COUNT: u64 = 40;

const HEADER_SIZE: u64 = 32;

/// A free remainder smaller than this is not worth splitting off
const MIN_PAYLOAD: u64 = 8;

const FLAG_USED: u64 = 1;


#[derive(Debug, Clone, Copy)]
struct Header {
    size:  u64,
    flags: u64,
    prev:  u64,
    next:  u64,
}

impl Header {
    fn is_used(&self) -> bool {
        self.flags & FLAG_USED != 0
    }
}


pub struct Heap {
    stream:    Box<dyn Stream>,
    end:       u64,
    free_head: u64,
    log:       slog::Logger,
}

impl Heap {
    /// Opens the heap persisted in `stream`, initialising a fresh prefix if
    /// the stream has never held one
    pub fn new(stream: Box<dyn Stream>, log: slog::Logger) -> Result<Heap> {
        let mut heap = Heap { stream, end: 0, free_head: 0, log };

        if heap.stream.len() < PREFIX_SIZE {
            heap.stream.grow(PREFIX_SIZE)?;
            heap.init_prefix()?;
            return Ok(heap);
        }

        match heap.read_u64(OFF_MAGIC)? {
            0 => heap.init_prefix()?,

            MAGIC => {
                if heap.read_u64(OFF_VERSION)? != VERSION {
                    return Err(Error::Corrupt("unsupported store version"));
                }
                heap.end = heap.read_u64(OFF_END)?;
                heap.free_head = heap.read_u64(OFF_FREE_HEAD)?;

                if heap.end < PREFIX_SIZE || heap.end > heap.stream.len() {
                    return Err(Error::Corrupt("heap end out of range"));
                }
            }

            _ => return Err(Error::Corrupt("bad magic tag")),
        }

        Ok(heap)
    }

    fn init_prefix(&mut self) -> Result<()> {
        self.write_u64(OFF_MAGIC, MAGIC)?;
        self.write_u64(OFF_VERSION, VERSION)?;
        self.write_u64(OFF_END, PREFIX_SIZE)?;
        self.write_u64(OFF_FREE_HEAD, 0)?;
        self.write_u64(OFF_ROOT_HEAD, 0)?;
        self.write_u64(OFF_ROOT_COUNT, 0)?;

        self.end = PREFIX_SIZE;
        self.free_head = 0;
        Ok(())
    }


    /*
     * raw word access
     */

    fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.stream.read_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    fn write_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.stream.write_at(offset, &buf)
    }

    /// Reads one u64 field inside a block payload
    pub(crate) fn read_word(&self, payload: u64, field: u64) -> Result<u64> {
        self.read_u64(payload + field)
    }

    /// Writes one u64 field inside a block payload
    pub(crate) fn write_word(&mut self, payload: u64, field: u64, value: u64) -> Result<()> {
        self.write_u64(payload + field, value)
    }


    /*
     * block headers
     */

    fn header(&self, payload: u64) -> Result<Header> {
        let base = payload - HEADER_SIZE;
        Ok(Header {
            size:  self.read_u64(base)?,
            flags: self.read_u64(base + 8)?,
            prev:  self.read_u64(base + 16)?,
            next:  self.read_u64(base + 24)?,
        })
    }

    fn store_header(&mut self, payload: u64, h: &Header) -> Result<()> {
        let base = payload - HEADER_SIZE;
        self.write_u64(base, h.size)?;
        self.write_u64(base + 8, h.flags)?;
        self.write_u64(base + 16, h.prev)?;
        self.write_u64(base + 24, h.next)
    }

    fn set_header_prev(&mut self, payload: u64, prev: u64) -> Result<()> {
        self.write_u64(payload - HEADER_SIZE + 16, prev)
    }

    fn set_header_next(&mut self, payload: u64, next: u64) -> Result<()> {
        self.write_u64(payload - HEADER_SIZE + 24, next)
    }

    fn set_free_head(&mut self, head: u64) -> Result<()> {
        self.free_head = head;
        self.write_u64(OFF_FREE_HEAD, head)
    }

    fn set_end(&mut self, end: u64) -> Result<()> {
        self.end = end;
        self.write_u64(OFF_END, end)
    }


    /*
     * allocation
     */

    /// Returns an offset to a block of exactly `size` payload bytes
    pub fn alloc(&mut self, size: u64) -> Result<u64> {
        // first fit over the free list
        let mut cur = self.free_head;
        while cur != 0 {
            let h = self.header(cur)?;
            if h.size >= size {
                return self.alloc_from_free(cur, h, size);
            }
            cur = h.next;
        }

        // nothing fits; claim fresh space at the end of the stream
        let payload = self.end + HEADER_SIZE;
        self.stream.grow(payload + size)?;

        self.store_header(payload, &Header { size, flags: FLAG_USED, prev: 0, next: 0 })?;
        self.set_end(payload + size)?;

        Ok(payload)
    }

    fn alloc_from_free(&mut self, off: u64, mut h: Header, size: u64) -> Result<u64> {
        if h.size >= size + HEADER_SIZE + MIN_PAYLOAD {
            // split; the tail remainder keeps the block's place in the list
            let rem = off + size + HEADER_SIZE;
            let rem_h = Header {
                size:  h.size - size - HEADER_SIZE,
                flags: 0,
                prev:  h.prev,
                next:  h.next,
            };
            self.store_header(rem, &rem_h)?;

            if h.prev == 0 {
                self.set_free_head(rem)?;
            } else {
                self.set_header_next(h.prev, rem)?;
            }
            if h.next != 0 {
                self.set_header_prev(h.next, rem)?;
            }

            self.store_header(off, &Header { size, flags: FLAG_USED, prev: 0, next: 0 })?;
        } else {
            // the remainder is too small to stand alone; grant the whole block
            if h.prev == 0 {
                self.set_free_head(h.next)?;
            } else {
                self.set_header_next(h.prev, h.next)?;
            }
            if h.next != 0 {
                self.set_header_prev(h.next, h.prev)?;
            }

            h.flags = FLAG_USED;
            h.prev = 0;
            h.next = 0;
            self.store_header(off, &h)?;
        }

        Ok(off)
    }

    /// Releases the block at `off` and coalesces it with free neighbours
    pub fn free(&mut self, off: u64) -> Result<()> {
        assert!(off != 0, "free of the null offset");

        let mut h = self.header(off)?;
        assert!(h.is_used(), "double free at offset {}", off);

        // find the position in the offset-ordered free list
        let mut prev = 0u64;
        let mut next = self.free_head;
        while next != 0 && next < off {
            prev = next;
            next = self.header(next)?.next;
        }

        h.flags = 0;
        h.prev = prev;
        h.next = next;

        // drop the used flag first; a stale used header inside a coalesced
        // run would defeat the double-free check
        self.store_header(off, &h)?;

        // absorb the right neighbour if it touches this block
        if next != 0 && off + h.size + HEADER_SIZE == next {
            let nh = self.header(next)?;
            h.size += HEADER_SIZE + nh.size;
            h.next = nh.next;
        }

        // melt into the left neighbour if that one touches this block
        if prev != 0 {
            let mut ph = self.header(prev)?;
            if prev + ph.size + HEADER_SIZE == off {
                ph.size += HEADER_SIZE + h.size;
                ph.next = h.next;
                self.store_header(prev, &ph)?;

                if h.next != 0 {
                    self.set_header_prev(h.next, prev)?;
                }
                return Ok(());
            }
        }

        self.store_header(off, &h)?;

        if prev == 0 {
            self.set_free_head(off)?;
        } else {
            self.set_header_next(prev, off)?;
        }
        if h.next != 0 {
            self.set_header_prev(h.next, off)?;
        }

        Ok(())
    }

    /// Payload size recorded in the block header
    pub fn size_of(&self, off: u64) -> Result<u64> {
        let h = self.header(off)?;
        assert!(h.is_used(), "size_of on a free block at offset {}", off);
        Ok(h.size)
    }

    /// True iff `off` is the start of a used block
    pub fn is_valid(&self, off: u64) -> bool {
        if off < PREFIX_SIZE + HEADER_SIZE || off >= self.end {
            return false;
        }
        match self.header(off) {
            Ok(h) => h.is_used() && off + h.size <= self.end,
            Err(_) => false,
        }
    }

    /// Reads the whole payload of the block at `off`
    pub fn read(&self, off: u64) -> Result<Vec<u8>> {
        let size = self.size_of(off)?;
        let mut buf = vec![0u8; size as usize];
        self.stream.read_at(off, &mut buf)?;
        Ok(buf)
    }

    /// Writes `bytes` at the start of the payload of the block at `off`
    pub fn write(&mut self, off: u64, bytes: &[u8]) -> Result<()> {
        let size = self.size_of(off)?;
        assert!(bytes.len() as u64 <= size, "write past the end of block {}", off);
        self.stream.write_at(off, bytes)
    }


    /*
     * named roots
     *
     * Root entries are ordinary blocks `{next, offset, name_bytes}` chained
     * from the prefix, so reopening a stream finds them again.
     */

    fn read_root_entry(&self, entry: u64) -> Result<(u64, u64, String)> {
        let bytes = self.read(entry)?;
        if bytes.len() < 16 {
            return Err(Error::Corrupt("root entry too small"));
        }

        let next = LittleEndian::read_u64(&bytes[0..8]);
        let offset = LittleEndian::read_u64(&bytes[8..16]);
        let name = String::from_utf8(bytes[16..].to_vec())
            .map_err(|_| Error::Corrupt("root name is not utf-8"))?;

        Ok((next, offset, name))
    }

    /// Persists `name -> offset`; an offset of zero removes the root
    pub fn set_root(&mut self, name: &str, offset: u64) -> Result<()> {
        let mut prev_entry = 0u64;
        let mut cur = self.read_u64(OFF_ROOT_HEAD)?;

        while cur != 0 {
            let (next, _, entry_name) = self.read_root_entry(cur)?;

            if entry_name == name {
                if offset == 0 {
                    if prev_entry == 0 {
                        self.write_u64(OFF_ROOT_HEAD, next)?;
                    } else {
                        self.write_word(prev_entry, 0, next)?;
                    }
                    let count = self.read_u64(OFF_ROOT_COUNT)?;
                    self.write_u64(OFF_ROOT_COUNT, count - 1)?;
                    self.free(cur)?;
                } else {
                    self.write_word(cur, 8, offset)?;
                }
                return Ok(());
            }

            prev_entry = cur;
            cur = next;
        }

        if offset == 0 {
            return Ok(());
        }

        let head = self.read_u64(OFF_ROOT_HEAD)?;
        let entry = self.alloc(16 + name.len() as u64)?;

        let mut payload = Vec::with_capacity(16 + name.len());
        payload.write_u64::<LittleEndian>(head).unwrap();
        payload.write_u64::<LittleEndian>(offset).unwrap();
        payload.extend_from_slice(name.as_bytes());
        self.write(entry, &payload)?;

        self.write_u64(OFF_ROOT_HEAD, entry)?;
        let count = self.read_u64(OFF_ROOT_COUNT)?;
        self.write_u64(OFF_ROOT_COUNT, count + 1)
    }

    /// Returns the offset stored under `name`, or zero if there is none
    pub fn get_root(&self, name: &str) -> Result<u64> {
        let mut cur = self.read_u64(OFF_ROOT_HEAD)?;

        while cur != 0 {
            let (next, offset, entry_name) = self.read_root_entry(cur)?;
            if entry_name == name {
                return Ok(offset);
            }
            cur = next;
        }

        Ok(0)
    }

    /// Root names, most recently created first
    pub fn roots(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut cur = self.read_u64(OFF_ROOT_HEAD)?;

        while cur != 0 {
            let (next, _, name) = self.read_root_entry(cur)?;
            names.push(name);
            cur = next;
        }

        Ok(names)
    }

    pub fn root_count(&self) -> Result<u64> {
        self.read_u64(OFF_ROOT_COUNT)
    }


    /*
     * diagnostics and maintenance
     */

    pub fn count_used_blocks(&self) -> Result<u64> {
        self.count_blocks(true)
    }

    pub fn count_free_blocks(&self) -> Result<u64> {
        self.count_blocks(false)
    }

    fn count_blocks(&self, used: bool) -> Result<u64> {
        let mut count = 0;
        let mut hdr = PREFIX_SIZE;

        while hdr < self.end {
            let payload = hdr + HEADER_SIZE;
            let h = self.header(payload)?;

            if h.is_used() == used {
                count += 1;
            }
            hdr = payload + h.size;
        }

        Ok(count)
    }

    pub fn used_bytes(&self) -> Result<u64> {
        self.count_bytes(true)
    }

    pub fn free_bytes(&self) -> Result<u64> {
        self.count_bytes(false)
    }

    fn count_bytes(&self, used: bool) -> Result<u64> {
        let mut bytes = 0;
        let mut hdr = PREFIX_SIZE;

        while hdr < self.end {
            let payload = hdr + HEADER_SIZE;
            let h = self.header(payload)?;

            if h.is_used() == used {
                bytes += h.size;
            }
            hdr = payload + h.size;
        }

        Ok(bytes)
    }

    /// Sweeps all blocks, merges adjacent free runs and relinks the free
    /// list in offset order. Used blocks never move.
    pub fn garbage_collect(&mut self) -> Result<()> {
        let free_before = self.count_free_blocks()?;

        let mut head = 0u64;
        let mut tail = 0u64;
        let mut hdr = PREFIX_SIZE;

        while hdr < self.end {
            let payload = hdr + HEADER_SIZE;
            let mut h = self.header(payload)?;

            if h.is_used() {
                hdr = payload + h.size;
                continue;
            }

            // swallow the whole free run that follows
            let mut next_hdr = payload + h.size;
            while next_hdr < self.end {
                let next_payload = next_hdr + HEADER_SIZE;
                let nh = self.header(next_payload)?;
                if nh.is_used() {
                    break;
                }
                h.size += HEADER_SIZE + nh.size;
                next_hdr = next_payload + nh.size;
            }

            h.prev = tail;
            h.next = 0;
            self.store_header(payload, &h)?;

            if tail == 0 {
                head = payload;
            } else {
                self.set_header_next(tail, payload)?;
            }
            tail = payload;
            hdr = next_hdr;
        }

        self.set_free_head(head)?;

        let free_after = self.count_free_blocks()?;
        let used = self.count_used_blocks()?;
        info!(self.log, "heap - garbage_collect";
            "free_before" => free_before,
            "free_after" => free_after,
            "used" => used
        );

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::stream::MemoryStream;

    fn test_heap() -> Heap {
        let log = slog::Logger::root(slog::Discard, o!());
        Heap::new(Box::new(MemoryStream::new()), log).unwrap()
    }

    #[test]
    fn test_alloc_read_write() {
        let mut heap = test_heap();

        let a = heap.alloc(11).unwrap();
        heap.write(a, b"hello block").unwrap();

        assert_eq!(heap.size_of(a).unwrap(), 11);
        assert_eq!(heap.read(a).unwrap(), b"hello block");
        assert!(heap.is_valid(a));
        assert!(!heap.is_valid(0));
        assert!(!heap.is_valid(a + 1000));
    }

    #[test]
    fn test_conservation() {
        let mut heap = test_heap();

        let offs: Vec<u64> = (0..5).map(|i| heap.alloc(16 + i * 8).unwrap()).collect();
        for off in offs {
            heap.free(off).unwrap();
        }
        heap.garbage_collect().unwrap();

        assert_eq!(heap.count_used_blocks().unwrap(), 0);
        assert_eq!(heap.count_free_blocks().unwrap(), 1);
    }

    #[test]
    fn test_fragmentation_two_runs() {
        let mut heap = test_heap();

        let offs: Vec<u64> = (0..5).map(|_| heap.alloc(32).unwrap()).collect();

        heap.free(offs[0]).unwrap();
        heap.free(offs[1]).unwrap();
        heap.free(offs[3]).unwrap();
        heap.free(offs[4]).unwrap();

        heap.garbage_collect().unwrap();

        // the runs 1-2 and 4-5 coalesce; block 3 separates them
        assert_eq!(heap.count_free_blocks().unwrap(), 2);
        assert_eq!(heap.count_used_blocks().unwrap(), 1);
    }

    #[test]
    fn test_offset_stability() {
        let mut heap = test_heap();

        let keeper = heap.alloc(8).unwrap();
        heap.write(keeper, b"stable!!").unwrap();

        let junk: Vec<u64> = (0..10).map(|_| heap.alloc(24).unwrap()).collect();
        for off in junk {
            heap.free(off).unwrap();
        }
        heap.garbage_collect().unwrap();

        let refill = heap.alloc(24).unwrap();
        assert_ne!(refill, keeper);
        assert_eq!(heap.read(keeper).unwrap(), b"stable!!");
    }

    #[test]
    fn test_free_block_reuse() {
        let mut heap = test_heap();

        let a = heap.alloc(64).unwrap();
        let _b = heap.alloc(8).unwrap();
        heap.free(a).unwrap();

        // first fit hands the same region back
        let c = heap.alloc(64).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_split_leaves_remainder() {
        let mut heap = test_heap();

        let a = heap.alloc(256).unwrap();
        let _guard = heap.alloc(8).unwrap();
        heap.free(a).unwrap();

        let small = heap.alloc(16).unwrap();
        assert_eq!(small, a);

        // the remainder of the split block is still free
        assert_eq!(heap.count_free_blocks().unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut heap = test_heap();

        let a = heap.alloc(16).unwrap();
        heap.free(a).unwrap();
        heap.free(a).unwrap();
    }

    #[test]
    fn test_roots() {
        let mut heap = test_heap();

        let a = heap.alloc(8).unwrap();
        let b = heap.alloc(8).unwrap();

        heap.set_root("Default.SPO", a).unwrap();
        heap.set_root("Default.POS", b).unwrap();

        assert_eq!(heap.get_root("Default.SPO").unwrap(), a);
        assert_eq!(heap.get_root("Default.POS").unwrap(), b);
        assert_eq!(heap.get_root("missing").unwrap(), 0);
        assert_eq!(heap.root_count().unwrap(), 2);

        // overwrite keeps a single entry
        heap.set_root("Default.SPO", b).unwrap();
        assert_eq!(heap.get_root("Default.SPO").unwrap(), b);
        assert_eq!(heap.root_count().unwrap(), 2);

        // zero removes
        heap.set_root("Default.POS", 0).unwrap();
        assert_eq!(heap.get_root("Default.POS").unwrap(), 0);
        assert_eq!(heap.root_count().unwrap(), 1);
        assert_eq!(heap.roots().unwrap(), vec!["Default.SPO".to_string()]);
    }

    #[test]
    fn test_exact_fit_is_not_split() {
        let mut heap = test_heap();

        let a = heap.alloc(16).unwrap();
        let _guard = heap.alloc(8).unwrap();
        heap.free(a).unwrap();

        // 16 fits exactly; no remainder appears
        let b = heap.alloc(16).unwrap();
        assert_eq!(b, a);
        assert_eq!(heap.count_free_blocks().unwrap(), 0);
    }
}
