//! Bidirectional line iteration over byte sources.
//!
//! [`StreamLineIter`] walks a byte source line by line in either direction
//! and can reposition onto the line containing an arbitrary byte address.
//! The source is one of:
//!
//! - a static byte buffer,
//! - a seekable handle (a file, typically), or
//! - a non-seekable stream (a pipe).
//!
//! Bytes are held in fixed-size chunks loaded with single aligned reads;
//! the chunk map of a seekable source is bounded by an LRU so a long scan
//! does not hold the whole file in memory. Discovered line boundaries are
//! cached in a [`SlidingArray`] centered on the cursor, which makes
//! back-and-forth iteration and nearby seeks cheap.
//!
//! A line is the half-open byte range from its start to the next `\n`,
//! returned without the newline. An unterminated trailing line is treated
//! as not-yet-present: `next` reports absent, and on a seekable source the
//! same call can be retried once the file has grown.

use crate::cache::{RecentSet, SlidingArray};
use crate::error::{HydraError, Result};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::trace;

/// Default chunk size for aligned reads (64 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Default bound on resident chunks for seekable sources.
pub const DEFAULT_MAX_CHUNKS: usize = 64;

/// Default capacity of the line-start cache.
pub const DEFAULT_LINE_CACHE: usize = 1024;

/// A byte source that supports both reading and seeking.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// One line handed out by the iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Byte address of the first byte of the line.
    pub addr: u64,
    /// Line content, without the terminating newline.
    pub bytes: Vec<u8>,
}

/// Tuning knobs for [`StreamLineIter`].
#[derive(Debug, Clone)]
pub struct LineIterOptions {
    /// Chunk size for aligned reads; rounded up to a power of two.
    pub chunk_size: u64,
    /// Resident chunk bound for seekable sources (0 disables eviction).
    pub max_chunks: usize,
    /// Capacity of the line-start cache.
    pub line_cache: usize,
}

impl Default for LineIterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            line_cache: DEFAULT_LINE_CACHE,
        }
    }
}

enum Backend {
    Buffer,
    Handle(Box<dyn ReadSeek>),
    Stream(Box<dyn Read>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Buffer,
    Handle,
    Stream,
}

fn map_read_err(e: io::Error) -> HydraError {
    match e.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => HydraError::Again,
        _ => HydraError::Io(e),
    }
}

/// Bidirectional line iterator with chunked buffering.
pub struct StreamLineIter {
    backend: Backend,
    chunk_size: u64,
    chunks: BTreeMap<u64, Vec<u8>>,
    recent: RecentSet<u64>,
    max_chunks: usize,
    /// Line-start cache; index 1 mirrors the cursor, index 0 is the start
    /// of the most recently returned line when iterating forward.
    marks: SlidingArray<u64>,
    /// Start address of the line the next `next()` call returns.
    cursor: u64,
    /// Byte offset where lines begin; nothing before it is ever touched.
    first_line_addr: u64,
    /// For streams and buffers: total bytes received so far.
    stream_end: u64,
    /// Permanent end of data (streams only; buffers are born complete).
    exhausted: bool,
}

impl StreamLineIter {
    fn new(backend: Backend, start: u64, opts: LineIterOptions) -> Self {
        let mut marks = SlidingArray::new(opts.line_cache.max(4));
        marks.put(1, start);
        Self {
            backend,
            chunk_size: opts.chunk_size.max(16).next_power_of_two(),
            chunks: BTreeMap::new(),
            recent: RecentSet::new(),
            max_chunks: opts.max_chunks,
            marks,
            cursor: start,
            first_line_addr: start,
            stream_end: 0,
            exhausted: false,
        }
    }

    /// Iterates over an in-memory buffer.
    ///
    /// The whole buffer is pre-seeded as a single chunk at address zero.
    pub fn from_bytes(bytes: Vec<u8>, opts: LineIterOptions) -> Self {
        let len = bytes.len() as u64;
        let mut iter = Self::new(Backend::Buffer, 0, opts);
        iter.chunks.insert(0, bytes);
        iter.stream_end = len;
        iter.exhausted = true;
        iter
    }

    /// Iterates over a seekable handle.
    ///
    /// Lines begin at the handle's current position, so a caller that has
    /// already consumed a header can hand over the positioned handle.
    pub fn from_handle(mut handle: impl ReadSeek + 'static, opts: LineIterOptions) -> Result<Self> {
        let start = handle.stream_position()?;
        Ok(Self::new(Backend::Handle(Box::new(handle)), start, opts))
    }

    /// Iterates over a non-seekable stream. Chunks are retained for the
    /// lifetime of the iterator so that backwards iteration still works.
    pub fn from_stream(stream: impl Read + 'static, opts: LineIterOptions) -> Self {
        Self::new(Backend::Stream(Box::new(stream)), 0, opts)
    }

    /// Byte address of the line the next `next()` call will return.
    pub fn tell(&self) -> u64 {
        self.cursor
    }

    /// Byte offset where lines begin.
    pub fn first_line_addr(&self) -> u64 {
        self.first_line_addr
    }

    /// Moves the record boundary; `prev` and `seek` never go below it.
    pub fn set_first_line_addr(&mut self, addr: u64) {
        self.first_line_addr = addr;
    }

    fn kind(&self) -> Kind {
        match self.backend {
            Backend::Buffer => Kind::Buffer,
            Backend::Handle(_) => Kind::Handle,
            Backend::Stream(_) => Kind::Stream,
        }
    }

    fn align_down(&self, addr: u64) -> u64 {
        addr & !(self.chunk_size - 1)
    }

    /// Makes the byte at `addr` resident. `Ok(false)` means the data ends
    /// before `addr` (retriable on seekable, growing sources).
    fn ensure(&mut self, addr: u64) -> Result<bool> {
        let resident = self
            .chunks
            .range(..=addr)
            .next_back()
            .map(|(&cs, b)| (cs, addr < cs + b.len() as u64));
        if let Some((cs, true)) = resident {
            if self.kind() == Kind::Handle {
                self.recent.touch([cs]);
            }
            return Ok(true);
        }
        match self.kind() {
            Kind::Buffer => Ok(false),
            Kind::Handle => self.fill_handle(addr),
            Kind::Stream => self.fill_stream(addr),
        }
    }

    fn fill_handle(&mut self, addr: u64) -> Result<bool> {
        let cs = self.align_down(addr);
        loop {
            let have = self.chunks.get(&cs).map(|b| b.len() as u64).unwrap_or(0);
            if addr < cs + have {
                self.recent.touch([cs]);
                return Ok(true);
            }
            let want = (self.chunk_size - have) as usize;
            if want == 0 {
                return Ok(true);
            }
            let Backend::Handle(handle) = &mut self.backend else {
                return Ok(false);
            };
            handle.seek(SeekFrom::Start(cs + have))?;
            let mut buf = vec![0u8; want];
            let n = match handle.read(&mut buf) {
                Ok(n) => n,
                Err(e) => return Err(map_read_err(e)),
            };
            if n == 0 {
                // Nothing at this offset yet; the file may still grow.
                return Ok(false);
            }
            trace!(chunk = cs, got = n, "loaded chunk bytes");
            let fresh = have == 0;
            self.chunks.entry(cs).or_default().extend_from_slice(&buf[..n]);
            self.recent.touch([cs]);
            if fresh && self.max_chunks > 0 {
                for evicted in self.recent.truncate(self.max_chunks) {
                    self.chunks.remove(&evicted);
                }
            }
        }
    }

    fn fill_stream(&mut self, addr: u64) -> Result<bool> {
        loop {
            if addr < self.stream_end {
                return Ok(true);
            }
            if self.exhausted {
                return Ok(false);
            }
            let cs = self.align_down(self.stream_end);
            let have = self.stream_end - cs;
            let want = (self.chunk_size - have) as usize;
            let Backend::Stream(stream) = &mut self.backend else {
                return Ok(false);
            };
            let mut buf = vec![0u8; want];
            let n = match stream.read(&mut buf) {
                Ok(n) => n,
                Err(e) => return Err(map_read_err(e)),
            };
            if n == 0 {
                self.exhausted = true;
                return Ok(addr < self.stream_end);
            }
            self.chunks.entry(cs).or_default().extend_from_slice(&buf[..n]);
            self.stream_end += n as u64;
        }
    }

    /// Current end of data. Consumes a stream to its end.
    fn data_end(&mut self) -> Result<u64> {
        if let Backend::Handle(h) = &mut self.backend {
            return Ok(h.seek(SeekFrom::End(0))?);
        }
        while !self.exhausted {
            self.fill_stream(self.stream_end)?;
        }
        Ok(self.stream_end)
    }

    /// Address of the first `\n` at or after `from`, if terminated data
    /// reaches that far.
    fn scan_forward_nl(&mut self, from: u64) -> Result<Option<u64>> {
        let mut addr = from;
        loop {
            if !self.ensure(addr)? {
                return Ok(None);
            }
            let step = {
                let Some((&cs, bytes)) = self.chunks.range(..=addr).next_back() else {
                    return Ok(None);
                };
                let off = (addr - cs) as usize;
                match bytes[off..].iter().position(|&b| b == b'\n') {
                    Some(p) => return Ok(Some(addr + p as u64)),
                    None => cs + bytes.len() as u64,
                }
            };
            addr = step;
        }
    }

    /// Address of the last `\n` at or before `from`, never looking below
    /// `first_line_addr`.
    fn scan_backward_nl(&mut self, from: u64) -> Result<Option<u64>> {
        let mut addr = from;
        loop {
            if addr < self.first_line_addr {
                return Ok(None);
            }
            if !self.ensure(addr)? {
                // past the end of data; clamp onto the final byte
                let end = self.data_end()?;
                if end <= self.first_line_addr {
                    return Ok(None);
                }
                if addr >= end {
                    addr = end - 1;
                    continue;
                }
                return Ok(None);
            }
            let floor = self.first_line_addr;
            let step = {
                let Some((&cs, bytes)) = self.chunks.range(..=addr).next_back() else {
                    return Ok(None);
                };
                let off = (addr - cs) as usize;
                let lo = if floor > cs { (floor - cs) as usize } else { 0 };
                match bytes[lo..=off].iter().rposition(|&b| b == b'\n') {
                    Some(p) => return Ok(Some(cs + (lo + p) as u64)),
                    None => cs,
                }
            };
            if step <= self.first_line_addr {
                return Ok(None);
            }
            addr = step - 1;
        }
    }

    /// Copies the byte range `[start, end)` out of the chunk map.
    fn read_span(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(end.saturating_sub(start) as usize);
        let mut addr = start;
        while addr < end {
            if !self.ensure(addr)? {
                return Err(HydraError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "line bytes truncated mid-read",
                )));
            }
            let take = {
                let Some((&cs, bytes)) = self.chunks.range(..=addr).next_back() else {
                    return Err(HydraError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "chunk evicted mid-read",
                    )));
                };
                let off = (addr - cs) as usize;
                let n = ((end - addr) as usize).min(bytes.len() - off);
                out.extend_from_slice(&bytes[off..off + n]);
                n
            };
            addr += take as u64;
        }
        Ok(out)
    }

    /// Returns the next line, or `None` at the end of terminated data.
    ///
    /// On a seekable source `None` is retriable: if the file grows past the
    /// cursor the same call starts succeeding again. Transient read errors
    /// surface as [`HydraError::Again`] without advancing the cursor.
    pub fn next(&mut self) -> Result<Option<Line>> {
        let start = self.cursor;
        let Some(nl) = self.scan_forward_nl(start)? else {
            return Ok(None);
        };
        let bytes = self.read_span(start, nl)?;
        self.marks.slide(1);
        self.marks.put(1, nl + 1);
        self.cursor = nl + 1;
        Ok(Some(Line { addr: start, bytes }))
    }

    /// Returns the line before the cursor and steps backwards, or `None`
    /// at `first_line_addr`.
    pub fn prev(&mut self) -> Result<Option<Line>> {
        if self.cursor <= self.first_line_addr {
            return Ok(None);
        }
        let prev_start = match self.marks.get(0) {
            Some(&s) => s,
            None => {
                if self.cursor >= self.first_line_addr + 2 {
                    match self.scan_backward_nl(self.cursor - 2)? {
                        Some(nl) => nl + 1,
                        None => self.first_line_addr,
                    }
                } else {
                    self.first_line_addr
                }
            }
        };
        let bytes = self.read_span(prev_start, self.cursor - 1)?;
        self.marks.slide(-1);
        self.marks.put(1, prev_start);
        self.cursor = prev_start;
        Ok(Some(Line {
            addr: prev_start,
            bytes,
        }))
    }

    /// Positions the cursor on the line containing `addr`.
    ///
    /// Returns the start address of that line; the following `next()` call
    /// returns the line itself. Addresses before `first_line_addr`, past
    /// the end of data, or inside an unterminated trailing line yield
    /// `Ok(None)` (past-the-end seeks still park the cursor after the last
    /// complete line, so `prev()` remains useful).
    pub fn seek(&mut self, addr: u64) -> Result<Option<u64>> {
        if addr < self.first_line_addr {
            return Ok(None);
        }
        // Cached boundaries first.
        let lo = self.marks.min_index();
        let hi = self.marks.lim_index();
        if hi - lo >= 2 {
            if let (Some(&first), Some(&last)) = (self.marks.get(lo), self.marks.get(hi - 1)) {
                if addr >= first && addr < last {
                    let (mut a, mut b) = (lo, hi - 1);
                    let mut intact = true;
                    while b - a > 1 {
                        let m = a + (b - a) / 2;
                        match self.marks.get(m) {
                            Some(&v) if v <= addr => a = m,
                            Some(_) => b = m,
                            None => {
                                intact = false;
                                break;
                            }
                        }
                    }
                    if intact {
                        if let Some(&start) = self.marks.get(a) {
                            self.marks.slide(a - 1);
                            self.marks.put(1, start);
                            self.cursor = start;
                            return Ok(Some(start));
                        }
                    }
                }
            }
        }
        // Cold path: rediscover the enclosing boundaries.
        self.marks.clear_all();
        let end = self.data_end()?;
        if addr >= end {
            self.seek_end()?;
            return Ok(None);
        }
        let start = if addr == self.first_line_addr {
            self.first_line_addr
        } else {
            match self.scan_backward_nl(addr - 1)? {
                Some(nl) => nl + 1,
                None => self.first_line_addr,
            }
        };
        self.cursor = start;
        self.marks.put(1, start);
        if self.scan_forward_nl(addr)?.is_none() {
            // The containing line is not terminated yet.
            return Ok(None);
        }
        Ok(Some(start))
    }

    /// Parks the cursor after the last complete line, so `prev()` returns
    /// it and `next()` reports absent.
    pub fn seek_end(&mut self) -> Result<()> {
        self.marks.clear_all();
        let end = self.data_end()?;
        let cursor = if end <= self.first_line_addr {
            self.first_line_addr
        } else {
            match self.scan_backward_nl(end - 1)? {
                Some(nl) => nl + 1,
                None => self.first_line_addr,
            }
        };
        self.cursor = cursor;
        self.marks.put(1, cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn opts(chunk: u64) -> LineIterOptions {
        LineIterOptions {
            chunk_size: chunk,
            max_chunks: 4,
            line_cache: 16,
        }
    }

    fn buffer_iter(data: &str, chunk: u64) -> StreamLineIter {
        StreamLineIter::from_bytes(data.as_bytes().to_vec(), opts(chunk))
    }

    fn text(line: &Line) -> &str {
        std::str::from_utf8(&line.bytes).unwrap()
    }

    #[test]
    fn test_next_over_buffer() {
        let mut it = buffer_iter("one\ntwo\nthree\n", 64);
        assert_eq!(text(&it.next().unwrap().unwrap()), "one");
        assert_eq!(text(&it.next().unwrap().unwrap()), "two");
        assert_eq!(text(&it.next().unwrap().unwrap()), "three");
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn test_line_addresses() {
        let mut it = buffer_iter("aa\nbbb\nc\n", 64);
        assert_eq!(it.next().unwrap().unwrap().addr, 0);
        assert_eq!(it.next().unwrap().unwrap().addr, 3);
        assert_eq!(it.next().unwrap().unwrap().addr, 7);
    }

    #[test]
    fn test_unterminated_tail_is_absent() {
        let mut it = buffer_iter("one\npartial", 64);
        assert_eq!(text(&it.next().unwrap().unwrap()), "one");
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn test_prev_walks_backwards() {
        let mut it = buffer_iter("one\ntwo\nthree\n", 64);
        it.next().unwrap();
        it.next().unwrap();
        it.next().unwrap();
        assert_eq!(text(&it.prev().unwrap().unwrap()), "three");
        assert_eq!(text(&it.prev().unwrap().unwrap()), "two");
        assert_eq!(text(&it.prev().unwrap().unwrap()), "one");
        assert!(it.prev().unwrap().is_none());
        // forward again after rewinding to the start
        assert_eq!(text(&it.next().unwrap().unwrap()), "one");
    }

    #[test]
    fn test_lines_across_chunk_boundaries() {
        // chunk size 16, lines straddle boundaries
        let data: String = (0..40).map(|i| format!("line-{i:04}\n")).collect();
        let mut it = buffer_iter(&data, 16);
        for i in 0..40 {
            let l = it.next().unwrap().unwrap();
            assert_eq!(text(&l), format!("line-{i:04}"));
        }
        assert!(it.next().unwrap().is_none());
        for i in (0..40).rev() {
            let l = it.prev().unwrap().unwrap();
            assert_eq!(text(&l), format!("line-{i:04}"));
        }
    }

    #[test]
    fn test_seek_finds_containing_line() {
        let mut it = buffer_iter("aaa\nbbb\nccc\n", 64);
        // address 5 is inside "bbb"
        assert_eq!(it.seek(5).unwrap(), Some(4));
        assert_eq!(text(&it.next().unwrap().unwrap()), "bbb");
        // exact line start
        assert_eq!(it.seek(8).unwrap(), Some(8));
        assert_eq!(text(&it.next().unwrap().unwrap()), "ccc");
        // start of data
        assert_eq!(it.seek(0).unwrap(), Some(0));
        assert_eq!(text(&it.next().unwrap().unwrap()), "aaa");
    }

    #[test]
    fn test_seek_uses_cached_boundaries() {
        let mut it = buffer_iter("aaa\nbbb\nccc\nddd\n", 64);
        while it.next().unwrap().is_some() {}
        // all boundaries cached now; seek back into the middle
        assert_eq!(it.seek(9).unwrap(), Some(8));
        assert_eq!(text(&it.next().unwrap().unwrap()), "ccc");
    }

    #[test]
    fn test_seek_past_end_parks_for_prev() {
        let mut it = buffer_iter("aaa\nbbb\n", 64);
        assert!(it.seek(100).unwrap().is_none());
        assert_eq!(text(&it.prev().unwrap().unwrap()), "bbb");
    }

    #[test]
    fn test_seek_end_then_prev() {
        let mut it = buffer_iter("aaa\nbbb\ntail", 64);
        it.seek_end().unwrap();
        assert!(it.next().unwrap().is_none());
        // the unterminated tail is skipped
        assert_eq!(text(&it.prev().unwrap().unwrap()), "bbb");
    }

    #[test]
    fn test_first_line_addr_bounds_prev() {
        let mut it = buffer_iter("header\none\ntwo\n", 64);
        it.next().unwrap(); // header
        it.set_first_line_addr(7);
        it.next().unwrap(); // one
        assert_eq!(text(&it.prev().unwrap().unwrap()), "one");
        assert!(it.prev().unwrap().is_none());
        assert!(it.seek(2).unwrap().is_none());
    }

    #[test]
    fn test_handle_starts_at_initial_position() {
        let data = b"skip me\nreal\nlines\n".to_vec();
        let mut cur = io::Cursor::new(data);
        cur.seek(SeekFrom::Start(8)).unwrap();
        let mut it = StreamLineIter::from_handle(cur, opts(16)).unwrap();
        assert_eq!(it.first_line_addr(), 8);
        let l = it.next().unwrap().unwrap();
        assert_eq!(l.addr, 8);
        assert_eq!(text(&l), "real");
        assert_eq!(text(&it.next().unwrap().unwrap()), "lines");
        assert!(it.next().unwrap().is_none());
        assert_eq!(text(&it.prev().unwrap().unwrap()), "lines");
    }

    #[test]
    fn test_handle_sees_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.log");
        std::fs::write(&path, "one\npar").unwrap();
        let mut it =
            StreamLineIter::from_handle(std::fs::File::open(&path).unwrap(), opts(16)).unwrap();
        assert_eq!(text(&it.next().unwrap().unwrap()), "one");
        assert!(it.next().unwrap().is_none());
        // finish the partial line and add another
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"tial\nlast\n").unwrap();
        f.flush().unwrap();
        assert_eq!(text(&it.next().unwrap().unwrap()), "partial");
        assert_eq!(text(&it.next().unwrap().unwrap()), "last");
        assert!(it.next().unwrap().is_none());
    }

    /// Read-only wrapper that hides the Seek impl of the inner reader.
    struct ReadOnly<R: Read>(R);
    impl<R: Read> Read for ReadOnly<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    #[test]
    fn test_stream_forward_and_back() {
        let data = "a\nbb\nccc\ndddd\n".to_string();
        let mut it =
            StreamLineIter::from_stream(ReadOnly(io::Cursor::new(data.into_bytes())), opts(16));
        assert_eq!(text(&it.next().unwrap().unwrap()), "a");
        assert_eq!(text(&it.next().unwrap().unwrap()), "bb");
        assert_eq!(text(&it.next().unwrap().unwrap()), "ccc");
        // retained chunks allow backwards movement on streams
        assert_eq!(text(&it.prev().unwrap().unwrap()), "ccc");
        assert_eq!(text(&it.next().unwrap().unwrap()), "ccc");
        assert_eq!(text(&it.next().unwrap().unwrap()), "dddd");
        assert!(it.next().unwrap().is_none());
        // permanent EOF on streams
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn test_eviction_keeps_iteration_correct() {
        // tiny chunks and a tight resident bound force eviction + reload
        let data: String = (0..200).map(|i| format!("entry number {i:05}\n")).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        std::fs::write(&path, &data).unwrap();
        let mut it = StreamLineIter::from_handle(
            std::fs::File::open(&path).unwrap(),
            LineIterOptions {
                chunk_size: 32,
                max_chunks: 2,
                line_cache: 8,
            },
        )
        .unwrap();
        for i in 0..200 {
            let l = it.next().unwrap().unwrap();
            assert_eq!(text(&l), format!("entry number {i:05}"));
        }
        assert!(it.next().unwrap().is_none());
        // walk back through evicted territory
        for i in (100..200).rev() {
            let l = it.prev().unwrap().unwrap();
            assert_eq!(text(&l), format!("entry number {i:05}"));
        }
        // and seek to an arbitrary early line
        let addr = data.find("entry number 00007").unwrap() as u64;
        it.seek(addr).unwrap().unwrap();
        assert_eq!(text(&it.next().unwrap().unwrap()), "entry number 00007");
    }

    #[test]
    fn test_crlf_bytes_are_preserved() {
        // the iterator splits on \n only; \r stays for the caller
        let mut it = buffer_iter("one\r\ntwo\r\n", 64);
        assert_eq!(it.next().unwrap().unwrap().bytes, b"one\r");
        assert_eq!(it.next().unwrap().unwrap().bytes, b"two\r");
    }
}
