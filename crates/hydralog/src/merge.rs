//! Timestamp-ordered merging of several readers.

use crate::error::Result;
use crate::reader::Reader;
use crate::record::LogRecord;

/// Heap entry: the look-ahead epoch is kept here so heap repairs never
/// have to re-peek a source.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    epoch: f64,
    source: usize,
}

impl HeapEntry {
    /// Min-heap order: epoch first, source index breaking ties so equal
    /// timestamps come out in source order.
    fn before(&self, other: &HeapEntry) -> bool {
        match self.epoch.partial_cmp(&other.epoch) {
            Some(std::cmp::Ordering::Less) => true,
            Some(std::cmp::Ordering::Greater) => false,
            _ => self.source < other.source,
        }
    }
}

/// A k-way merge over several [`Reader`]s, ordered by record timestamp.
///
/// Sources are drained in parallel through an array-backed min-heap keyed
/// on each reader's look-ahead timestamp. Records with equal timestamps
/// come out in source order, so the merge is stable with respect to the
/// source list.
pub struct MergeReader {
    sources: Vec<Reader>,
    heap: Vec<HeapEntry>,
}

impl MergeReader {
    /// Builds a merge over the given sources.
    pub fn new(sources: Vec<Reader>) -> Result<Self> {
        let mut merge = Self {
            sources,
            heap: Vec::new(),
        };
        merge.rebuild()?;
        Ok(merge)
    }

    /// Number of sources still holding records.
    pub fn active_sources(&self) -> usize {
        self.heap.len()
    }

    fn rebuild(&mut self) -> Result<()> {
        self.heap.clear();
        for i in 0..self.sources.len() {
            if let Some(r) = self.sources[i].peek()? {
                let epoch = r.timestamp();
                self.heap.push(HeapEntry { epoch, source: i });
            }
        }
        for i in (0..self.heap.len() / 2).rev() {
            self.sift_down(i);
        }
        Ok(())
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].before(&self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut least = i;
            if left < self.heap.len() && self.heap[left].before(&self.heap[least]) {
                least = left;
            }
            if right < self.heap.len() && self.heap[right].before(&self.heap[least]) {
                least = right;
            }
            if least == i {
                break;
            }
            self.heap.swap(i, least);
            i = least;
        }
    }

    /// The earliest pending record across all sources, without consuming.
    pub fn peek(&mut self) -> Result<Option<&LogRecord>> {
        let Some(head) = self.heap.first() else {
            return Ok(None);
        };
        let source = head.source;
        self.sources[source].peek()
    }

    /// Consumes and returns the earliest pending record.
    pub fn next(&mut self) -> Result<Option<LogRecord>> {
        loop {
            if self.heap.is_empty() {
                return Ok(None);
            }
            let last = self.heap.len() - 1;
            self.heap.swap(0, last);
            let entry = match self.heap.pop() {
                Some(e) => e,
                None => return Ok(None),
            };
            self.sift_down(0);
            let record = self.sources[entry.source].next()?;
            // re-enter the source with its new look-ahead
            let epoch = self.sources[entry.source]
                .peek()?
                .map(LogRecord::timestamp);
            if let Some(epoch) = epoch {
                self.heap.push(HeapEntry {
                    epoch,
                    source: entry.source,
                });
                let tail = self.heap.len() - 1;
                self.sift_up(tail);
            }
            match record {
                Some(r) => return Ok(Some(r)),
                // the peek that built the entry is gone; move on
                None => continue,
            }
        }
    }

    /// Seeks every source to `epoch` and rebuilds the heap.
    pub fn seek(&mut self, epoch: f64) -> Result<()> {
        for source in &mut self.sources {
            source.seek(epoch)?;
        }
        self.rebuild()
    }
}
