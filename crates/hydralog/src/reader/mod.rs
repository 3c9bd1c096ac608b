//! Format-aware log file reading.
//!
//! [`Reader`] opens a tsv0/tsv1 file (or byte buffer, or stream), parses
//! the header, and decodes records one at a time with a single record of
//! look-ahead. While it reads it maintains a sparse auto-index of
//! `(ticks, byte address)` pairs so that time-based [`seek`](Reader::seek)
//! does not have to rescan from the top, and it folds on-disk anchor
//! comments (`#\tt=<hex>`) into the same index.

use crate::codec::{
    self, parse_anchor, parse_scale, validate_value, Format, HeaderSpec, Tick,
};
use crate::error::{HydraError, Result};
use crate::line::{LineIterOptions, ReadSeek, StreamLineIter};
use crate::record::LogRecord;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Default records between auto-index entries.
pub const DEFAULT_AUTOINDEX_PERIOD: i64 = 256;

/// Default auto-index capacity before compaction.
pub const DEFAULT_AUTOINDEX_SIZE: usize = 256;

/// Tuning knobs for [`Reader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Records between auto-index entries; `<= 0` disables auto-indexing.
    pub autoindex_period: i64,
    /// Index length that triggers compaction (drop every second entry,
    /// double the period).
    pub autoindex_size: usize,
    /// Options for the underlying line iterator.
    pub line: LineIterOptions,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            autoindex_period: DEFAULT_AUTOINDEX_PERIOD,
            autoindex_size: DEFAULT_AUTOINDEX_SIZE,
            line: LineIterOptions::default(),
        }
    }
}

/// Decodes a physical line and strips one trailing `\r`.
fn line_text(bytes: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.strip_suffix('\r').unwrap_or(text))
}

/// A tsv0/tsv1 log file reader.
pub struct Reader {
    iter: StreamLineIter,
    format: Format,
    fields: Vec<codec::FieldSpec>,
    metadata: BTreeMap<String, String>,
    start_epoch: f64,
    scale: f64,
    /// Running tick counter; covers the look-ahead record when one is held.
    cur_ticks: u64,
    peeked: Option<(LogRecord, u64)>,
    first_record_addr: u64,
    /// Sparse `(counter before record, record address)` pairs, ascending.
    index: Vec<(u64, u64)>,
    index_period: i64,
    index_size: usize,
    index_counter: i64,
    /// Ticks waiting to be paired with the next record's address.
    index_pending: Option<u64>,
}

impl Reader {
    /// Opens a log file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Opens a log file.
    pub fn open_with(path: impl AsRef<Path>, opts: ReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_handle(file, opts)
    }

    /// Reads from an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>, opts: ReaderOptions) -> Result<Self> {
        let iter = StreamLineIter::from_bytes(bytes, opts.line.clone());
        Self::with_iter(iter, opts)
    }

    /// Reads from a seekable handle positioned at the magic line.
    pub fn from_handle(handle: impl ReadSeek + 'static, opts: ReaderOptions) -> Result<Self> {
        let iter = StreamLineIter::from_handle(handle, opts.line.clone())?;
        Self::with_iter(iter, opts)
    }

    /// Reads from a non-seekable stream.
    pub fn from_stream(stream: impl Read + 'static, opts: ReaderOptions) -> Result<Self> {
        let iter = StreamLineIter::from_stream(stream, opts.line.clone());
        Self::with_iter(iter, opts)
    }

    fn with_iter(mut iter: StreamLineIter, opts: ReaderOptions) -> Result<Self> {
        // Magic line selects the format.
        let magic = iter
            .next()?
            .ok_or_else(|| HydraError::BadMagic("<empty file>".to_string()))?;
        let format = codec::parse_magic(line_text(&magic.bytes)?)?;

        // Remaining header comments: metadata and the field vector.
        let mut metadata = BTreeMap::new();
        let mut fields: Option<Vec<codec::FieldSpec>> = None;
        loop {
            let Some(line) = iter.next()? else { break };
            let text = line_text(&line.bytes)?;
            if let Some(rest) = text.strip_prefix(codec::META_PREFIX) {
                for (k, v) in codec::parse_meta_line(rest)? {
                    metadata.insert(k, v);
                }
            } else if let Some(rest) = text.strip_prefix(codec::FIELDS_PREFIX) {
                if fields.is_some() {
                    return Err(HydraError::Header(
                        "duplicate field declaration line".to_string(),
                    ));
                }
                fields = Some(codec::parse_fields_line(rest)?);
            } else if text.starts_with('#') {
                continue;
            } else {
                // First record line; hand it back.
                iter.prev()?;
                break;
            }
        }
        let fields =
            fields.ok_or_else(|| HydraError::Header("missing field declaration".to_string()))?;
        if fields[0].name != format.tick_field() {
            return Err(HydraError::Header(format!(
                "first field must be {:?}, found {:?}",
                format.tick_field(),
                fields[0].name
            )));
        }

        let start_epoch: f64 = metadata
            .get("start_epoch")
            .ok_or(HydraError::MissingMetadata("start_epoch"))?
            .parse()
            .map_err(|_| HydraError::Header("unparseable start_epoch".to_string()))?;

        let scale = match fields[0].encoding.as_deref().and_then(parse_scale) {
            Some(n) => n,
            None => match metadata
                .get("timestamp_scale")
                .or_else(|| metadata.get("ts_scale"))
            {
                Some(v) => v
                    .parse::<f64>()
                    .ok()
                    .filter(|s| *s > 0.0 && s.is_finite())
                    .ok_or_else(|| HydraError::Header("bad timestamp scale".to_string()))?,
                None => 1.0,
            },
        };

        let first_record_addr = iter.tell();
        iter.set_first_line_addr(first_record_addr);

        Ok(Self {
            iter,
            format,
            fields,
            metadata,
            start_epoch,
            scale,
            cur_ticks: 0,
            peeked: None,
            first_record_addr,
            index: vec![(0, first_record_addr)],
            index_period: opts.autoindex_period,
            index_size: opts.autoindex_size.max(2),
            index_counter: opts.autoindex_period,
            index_pending: None,
        })
    }

    /// The file's on-disk format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The declared field vector, tick field first.
    pub fn fields(&self) -> &[codec::FieldSpec] {
        &self.fields
    }

    /// File-level metadata from `#%` lines.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Epoch second corresponding to tick counter zero.
    pub fn start_epoch(&self) -> f64 {
        self.start_epoch
    }

    /// Ticks per second.
    pub fn timestamp_scale(&self) -> f64 {
        self.scale
    }

    /// Current tick counter (includes the look-ahead record, if held).
    pub fn ticks(&self) -> u64 {
        self.cur_ticks
    }

    /// The auto-index built so far: ascending `(ticks, address)` pairs
    /// where `ticks` is the counter *before* the record at `address`.
    pub fn autoindex(&self) -> &[(u64, u64)] {
        &self.index
    }

    /// The header in re-emittable form (for rotation templates).
    pub fn header_spec(&self) -> HeaderSpec {
        let mut metadata = self.metadata.clone();
        metadata.remove("start_epoch");
        metadata.remove("timestamp_scale");
        metadata.remove("ts_scale");
        HeaderSpec {
            format: self.format,
            fields: self.fields.clone(),
            metadata,
            timestamp_scale: self.scale,
        }
    }

    /// Returns the next record without consuming it.
    pub fn peek(&mut self) -> Result<Option<&LogRecord>> {
        if self.peeked.is_none() {
            self.peeked = self.decode_next()?;
        }
        Ok(self.peeked.as_ref().map(|(r, _)| r))
    }

    /// Returns the next record.
    pub fn next(&mut self) -> Result<Option<LogRecord>> {
        if let Some((r, _)) = self.peeked.take() {
            return Ok(Some(r));
        }
        Ok(self.decode_next()?.map(|(r, _)| r))
    }

    fn peek_ticks(&mut self) -> Result<Option<u64>> {
        if self.peeked.is_none() {
            self.peeked = self.decode_next()?;
        }
        Ok(self.peeked.as_ref().map(|(_, t)| *t))
    }

    /// Repositions so the next record returned is the first one whose
    /// timestamp is at or after `epoch` (absent when the file ends first).
    pub fn seek(&mut self, epoch: f64) -> Result<()> {
        let target = ((epoch - self.start_epoch) * self.scale).ceil();
        if target <= 0.0 {
            return self.rewind();
        }
        let target = target as u64;
        if target <= self.cur_ticks {
            // Jump back through the index: greatest entry strictly below
            // the target (an entry equal to it can sit past a satisfying
            // record).
            self.peeked = None;
            let i = self.index.partition_point(|&(t, _)| t < target);
            let (t0, a0) = self.index[i.saturating_sub(1)];
            self.iter.seek(a0)?;
            self.cur_ticks = t0;
            self.index_counter = self.index_period;
            self.index_pending = None;
        }
        while let Some(t) = self.peek_ticks()? {
            if t >= target {
                break;
            }
            self.next()?;
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.iter.seek(self.first_record_addr)?;
        self.cur_ticks = 0;
        self.index_counter = self.index_period;
        self.index_pending = None;
        self.peeked = None;
        Ok(())
    }

    /// Returns the final record of the file, leaving the reader positioned
    /// at the end (`next()` reports absent).
    ///
    /// When the final record carries an absolute counter it is decoded
    /// standalone; otherwise decoding restarts from the nearest preceding
    /// anchor comment, or failing that from the best auto-index entry.
    pub fn seek_last(&mut self) -> Result<Option<LogRecord>> {
        self.peeked = None;
        self.index_pending = None;
        self.iter.seek_end()?;

        let mut found_primary = false;
        let mut ground: (u64, u64) = (0, self.first_record_addr);
        let mut restart: Option<(u64, u64)> = None;
        loop {
            let Some(line) = self.iter.prev()? else { break };
            let text = line_text(&line.bytes)?;
            if text.is_empty() {
                continue;
            }
            if self.format == Format::Tsv1 && text.starts_with('\t') {
                continue;
            }
            if text.starts_with('#') {
                if found_primary {
                    if let Some(t) = parse_anchor(text) {
                        restart = Some((t, line.addr));
                        break;
                    }
                }
                continue;
            }
            if !found_primary {
                found_primary = true;
                if text.split('\t').next().is_some_and(|f| f.starts_with('=')) {
                    // Absolute final record: decode it standalone.
                    self.cur_ticks = 0;
                    self.index_counter = self.index_period;
                    self.iter.seek(line.addr)?;
                    return Ok(self.decode_next()?.map(|(r, _)| r));
                }
                let i = self.index.partition_point(|&(_, a)| a <= line.addr);
                ground = self.index[i.saturating_sub(1)];
            }
            if line.addr <= ground.1 {
                break;
            }
        }
        if !found_primary {
            return Ok(None);
        }
        let (t0, a0) = restart.unwrap_or(ground);
        self.cur_ticks = t0;
        self.index_counter = self.index_period;
        self.iter.seek(a0)?;
        let mut last = None;
        while let Some((r, _)) = self.decode_next()? {
            last = Some(r);
        }
        Ok(last)
    }

    /// Decodes the next record, skipping blanks and comments and folding
    /// anchors into the index.
    fn decode_next(&mut self) -> Result<Option<(LogRecord, u64)>> {
        loop {
            let Some(line) = self.iter.next()? else {
                // End of data: the pending index point pairs with it.
                if let Some(t) = self.index_pending.take() {
                    let addr = self.iter.tell();
                    self.push_index(t, addr);
                }
                return Ok(None);
            };
            let addr = line.addr;
            let text = line_text(&line.bytes)?;
            if text.is_empty() {
                continue;
            }
            if text.starts_with('#') {
                if let Some(t) = parse_anchor(text) {
                    let after = self.iter.tell();
                    self.push_index(t, after);
                }
                continue;
            }
            if self.format == Format::Tsv1 && text.starts_with('\t') {
                // Continuation without a primary; tolerable after a raw
                // seek. (In tsv0 a TAB-led line is a record whose tick
                // field is empty, so it falls through.)
                debug!(addr, "skipping stray continuation line");
                continue;
            }
            if let Some(t) = self.index_pending.take() {
                self.push_index(t, addr);
            }
            let text = text.to_string();
            return self.decode_record(&text).map(Some);
        }
    }

    fn decode_record(&mut self, text: &str) -> Result<(LogRecord, u64)> {
        let declared = self.fields.len();
        let parts: Vec<&str> = text.split('\t').collect();
        if parts.len() > declared {
            return Err(HydraError::FieldCount {
                got: parts.len(),
                declared,
            });
        }

        let prev = self.cur_ticks;
        let next_ticks = match codec::parse_tick(self.format, parts[0])? {
            Tick::Same => prev,
            Tick::Delta(d) => prev
                .checked_add(d)
                .ok_or_else(|| HydraError::BadCounter(parts[0].to_string()))?,
            Tick::Absolute(t) => {
                if t < prev {
                    return Err(HydraError::CounterRegression { prev, next: t });
                }
                t
            }
        };

        // Field values: defaults fill syntactically empty columns.
        let mut values: Vec<Option<String>> = Vec::with_capacity(declared);
        values.push(None); // the tick column carries no record value
        for i in 1..declared {
            let raw = parts.get(i).copied().unwrap_or("");
            if raw.is_empty() {
                values.push(self.fields[i].default.clone());
            } else {
                validate_value(raw, false)?;
                values.push(Some(raw.to_string()));
            }
        }

        if self.format == Format::Tsv1 {
            if let Err(e) = self.read_continuations(&mut values) {
                if matches!(e, HydraError::Again) {
                    // back out the primary line so the record re-decodes
                    let _ = self.iter.prev();
                }
                return Err(e);
            }
        }

        let advanced = next_ticks > prev;
        self.cur_ticks = next_ticks;
        if self.index_period > 0 {
            self.index_counter -= 1;
            if self.index_counter <= 0 && advanced {
                self.index_pending = Some(next_ticks);
                self.index_counter = self.index_period;
            }
        }

        let timestamp = self.start_epoch + next_ticks as f64 / self.scale;
        let mut record = LogRecord::new(timestamp);
        for (spec, value) in self.fields.iter().zip(values).skip(1) {
            let Some(value) = value else { continue };
            if spec.name == "level" {
                match codec::canonical_level(&value) {
                    Some(full) => record.set(&spec.name, full),
                    None => record.set(&spec.name, value),
                }
            } else {
                record.set(&spec.name, value);
            }
        }
        Ok((record, next_ticks))
    }

    /// Consumes TAB-prefixed continuation lines after a primary line,
    /// appending `\n`-joined segments to the continued fields.
    fn read_continuations(&mut self, values: &mut [Option<String>]) -> Result<()> {
        let mut consumed = 0usize;
        loop {
            let line = match self.iter.next() {
                Ok(Some(l)) => l,
                Ok(None) => return Ok(()),
                Err(e) => {
                    if matches!(e, HydraError::Again) {
                        for _ in 0..consumed {
                            let _ = self.iter.prev();
                        }
                    }
                    return Err(e);
                }
            };
            if line.bytes.first() != Some(&b'\t') {
                self.iter.prev()?;
                return Ok(());
            }
            consumed += 1;
            let text = line_text(&line.bytes)?;
            let column = text.bytes().take_while(|&b| b == b'\t').count();
            if column < 2 || column > values.len() {
                return Err(HydraError::ContinuationColumn {
                    column,
                    fields: values.len(),
                });
            }
            let rest = &text[column..];
            validate_value(rest, false)?;
            let slot = &mut values[column - 1];
            let joined = match slot.take() {
                Some(v) => format!("{v}\n{rest}"),
                None => format!("\n{rest}"),
            };
            *slot = Some(joined);
        }
    }

    fn push_index(&mut self, ticks: u64, addr: u64) {
        if let Some(&(last_t, last_a)) = self.index.last() {
            if ticks <= last_t || addr <= last_a {
                return;
            }
        }
        self.index.push((ticks, addr));
        if self.index.len() >= self.index_size {
            let mut i = 0;
            self.index.retain(|_| {
                let keep = i % 2 == 0;
                i += 1;
                keep
            });
            if self.index_period > 0 {
                self.index_period *= 2;
            }
            debug!(period = self.index_period, "compacted auto-index");
        }
    }
}
