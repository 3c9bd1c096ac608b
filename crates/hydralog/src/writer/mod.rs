//! Format-aware log file writing.
//!
//! [`Writer`] creates or continues a tsv0/tsv1 file and appends records
//! whose tick counters are derived from the monotonic clock, so the
//! on-disk counter keeps its non-decreasing invariant even when the wall
//! clock jumps. Each record is fully encoded in memory and written with a
//! single call; a failed write can never leave half a record behind.
//!
//! Exactly one live writer per file is enforced with an exclusive advisory
//! lock: `flock` on the log file itself where available, an exclusively
//! created sidecar lockfile elsewhere.

use crate::codec::{
    self, anchor_line, encode_tick, sanitize_value, FieldSpec, Format, HeaderSpec, Tick,
};
use crate::error::{HydraError, Result};
use crate::reader::Reader;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Construction options for a fresh log file.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// On-disk format to emit.
    pub format: Format,
    /// Declared fields after the tick field, which the writer prepends
    /// itself.
    pub fields: Vec<FieldSpec>,
    /// Ticks per second; written to the header as metadata.
    pub timestamp_scale: f64,
    /// Extra file-level metadata for the `#%` line. `start_epoch` and the
    /// scale key are reserved.
    pub metadata: BTreeMap<String, String>,
    /// Emit an `#\tt=<hex>` anchor each time this many bytes have been
    /// written; `0` disables anchors.
    pub index_spacing: u64,
    /// Overrides the sampled wall clock as counter origin (replay,
    /// testing).
    pub start_epoch: Option<f64>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            format: Format::Tsv1,
            fields: vec![
                FieldSpec::new("level"),
                FieldSpec::new("facility"),
                FieldSpec::new("identity"),
                FieldSpec::new("message"),
            ],
            timestamp_scale: 1.0,
            metadata: BTreeMap::new(),
            index_spacing: 0,
            start_epoch: None,
        }
    }
}

/// Exclusive single-writer lock.
///
/// On Unix the log file descriptor itself carries a non-blocking `flock`
/// which the kernel drops when the descriptor closes. Elsewhere an
/// exclusively created `<file>.lock` sidecar stands in and is removed on
/// drop.
#[derive(Debug)]
struct WriteLock {
    #[cfg(not(unix))]
    lock_path: PathBuf,
}

impl WriteLock {
    #[cfg(unix)]
    fn acquire(file: &File, path: &Path) -> Result<Self> {
        use std::os::unix::io::AsRawFd;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(Self {});
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EWOULDBLOCK) | Some(libc::EACCES) => {
                Err(HydraError::Locked(path.to_path_buf()))
            }
            _ => Err(err.into()),
        }
    }

    #[cfg(not(unix))]
    fn acquire(_file: &File, path: &Path) -> Result<Self> {
        let mut name = path.as_os_str().to_os_string();
        name.push(".lock");
        let lock_path = PathBuf::from(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(Self { lock_path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(HydraError::Locked(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(not(unix))]
impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn system_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Formats an epoch or scale for the header, dropping a `.0` tail.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// A tsv0/tsv1 log file writer.
pub struct Writer {
    file: File,
    path: PathBuf,
    format: Format,
    /// Full field vector, tick field first.
    fields: Vec<FieldSpec>,
    /// User metadata (reserved per-file keys excluded).
    metadata: BTreeMap<String, String>,
    start_epoch: f64,
    scale: f64,
    mono_origin: Instant,
    /// Seconds between the monotonic origin and the counter origin.
    mono_offset: f64,
    prev_ticks: u64,
    bytes_written: u64,
    index_spacing: u64,
    next_anchor: u64,
    _lock: WriteLock,
}

impl Writer {
    /// Creates a fresh log file and writes its header.
    ///
    /// Fails when the path already exists or another process holds the
    /// write lock.
    pub fn create(path: impl AsRef<Path>, opts: WriterOptions) -> Result<Self> {
        let mut fields = Vec::with_capacity(opts.fields.len() + 1);
        fields.push(FieldSpec::new(opts.format.tick_field()));
        fields.extend(opts.fields);
        Self::create_inner(
            path.as_ref(),
            opts.format,
            fields,
            opts.metadata,
            opts.timestamp_scale,
            opts.index_spacing,
            opts.start_epoch,
        )
    }

    /// Creates a fresh file shaped like an existing one (rotation).
    ///
    /// Fields, defaults, metadata and scale come from the template; the
    /// counter origin is sampled anew.
    pub fn create_from(
        path: impl AsRef<Path>,
        spec: &HeaderSpec,
        index_spacing: u64,
    ) -> Result<Self> {
        if spec
            .fields
            .first()
            .map(|f| f.name.as_str())
            != Some(spec.format.tick_field())
        {
            return Err(HydraError::FieldDecl(
                "template field vector must start with the tick field".to_string(),
            ));
        }
        Self::create_inner(
            path.as_ref(),
            spec.format,
            spec.fields.clone(),
            spec.metadata.clone(),
            spec.timestamp_scale,
            index_spacing,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create_inner(
        path: &Path,
        format: Format,
        fields: Vec<FieldSpec>,
        metadata: BTreeMap<String, String>,
        scale: f64,
        index_spacing: u64,
        start_epoch: Option<f64>,
    ) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(HydraError::Header(
                "timestamp scale must be positive".to_string(),
            ));
        }
        Self::validate_fields(format, &fields)?;
        for (k, v) in &metadata {
            if !codec::is_word(k) {
                return Err(HydraError::Header(format!("bad metadata key: {k:?}")));
            }
            if ["start_epoch", "timestamp_scale", "ts_scale"].contains(&k.as_str()) {
                return Err(HydraError::Header(format!("reserved metadata key: {k}")));
            }
            codec::validate_value(v, false)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    HydraError::AlreadyExists(path.to_path_buf())
                } else {
                    HydraError::Io(e)
                }
            })?;
        let lock = WriteLock::acquire(&file, path)?;

        let mono_origin = Instant::now();
        let wall = system_epoch();
        let start_epoch = start_epoch.unwrap_or(if scale == 1.0 { wall.trunc() } else { wall });

        let mut header = String::new();
        header.push_str(&format.magic_line());
        header.push('\n');
        header.push_str(codec::META_PREFIX);
        header.push(' ');
        header.push_str(&format!("start_epoch={}", format_number(start_epoch)));
        if scale != 1.0 {
            header.push('\t');
            header.push_str(&format!("{}={}", format.scale_key(), format_number(scale)));
        }
        for (k, v) in &metadata {
            header.push('\t');
            header.push_str(&format!("{k}={v}"));
        }
        header.push('\n');
        header.push_str(codec::FIELDS_PREFIX);
        header.push(' ');
        let tokens: Vec<String> = fields.iter().map(FieldSpec::header_token).collect();
        header.push_str(&tokens.join("\t"));
        header.push('\n');

        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            format,
            fields,
            metadata,
            start_epoch,
            scale,
            mono_origin,
            mono_offset: wall - start_epoch,
            prev_ticks: 0,
            bytes_written: 0,
            index_spacing,
            next_anchor: 0,
            _lock: lock,
        };
        writer.file.write_all(header.as_bytes())?;
        writer.bytes_written = header.len() as u64;
        writer.reset_anchor_threshold();
        Ok(writer)
    }

    /// Continues an existing log file.
    ///
    /// The header is learned by reading the file, the tick counter resumes
    /// from its final record, and no header is re-emitted.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = Reader::open(path)?;
        reader.seek_last()?;
        let format = reader.format();
        let fields = reader.fields().to_vec();
        let metadata = {
            let mut m = reader.metadata().clone();
            m.remove("start_epoch");
            m.remove("timestamp_scale");
            m.remove("ts_scale");
            m
        };
        let start_epoch = reader.start_epoch();
        let scale = reader.timestamp_scale();
        let prev_ticks = reader.ticks();
        drop(reader);

        let file = OpenOptions::new().append(true).open(path)?;
        let lock = WriteLock::acquire(&file, path)?;
        let bytes_written = file.metadata()?.len();

        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            format,
            fields,
            metadata,
            start_epoch,
            scale,
            mono_origin: Instant::now(),
            mono_offset: system_epoch() - start_epoch,
            prev_ticks,
            bytes_written,
            index_spacing: 0,
            next_anchor: 0,
            _lock: lock,
        };
        writer.reset_anchor_threshold();
        Ok(writer)
    }

    /// Enables periodic anchor comments on an appending writer.
    pub fn set_index_spacing(&mut self, spacing: u64) {
        self.index_spacing = spacing;
        self.reset_anchor_threshold();
    }

    fn reset_anchor_threshold(&mut self) {
        if self.index_spacing > 0 {
            self.next_anchor = (self.bytes_written / self.index_spacing + 1) * self.index_spacing;
        }
    }

    fn validate_fields(format: Format, fields: &[FieldSpec]) -> Result<()> {
        if fields.first().map(|f| f.name.as_str()) != Some(format.tick_field()) {
            return Err(HydraError::FieldDecl(
                "field vector must start with the tick field".to_string(),
            ));
        }
        for (i, f) in fields.iter().enumerate() {
            if !codec::is_word(&f.name) {
                return Err(HydraError::FieldDecl(f.name.clone()));
            }
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(HydraError::FieldDecl(format!(
                    "duplicate field name: {}",
                    f.name
                )));
            }
            if let Some(default) = &f.default {
                codec::validate_value(default, false)?;
            }
        }
        Ok(())
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On-disk format being emitted.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Epoch second corresponding to tick counter zero.
    pub fn start_epoch(&self) -> f64 {
        self.start_epoch
    }

    /// Ticks per second.
    pub fn timestamp_scale(&self) -> f64 {
        self.scale
    }

    /// Tick counter of the most recently written record.
    pub fn ticks(&self) -> u64 {
        self.prev_ticks
    }

    /// The header in re-emittable form (rotation template).
    pub fn header_spec(&self) -> HeaderSpec {
        HeaderSpec {
            format: self.format,
            fields: self.fields.clone(),
            metadata: self.metadata.clone(),
            timestamp_scale: self.scale,
        }
    }

    /// Tick counter for "now", derived from the monotonic clock.
    fn now_ticks(&self) -> u64 {
        let secs = self.mono_origin.elapsed().as_secs_f64() + self.mono_offset;
        let ticks = (secs * self.scale).floor();
        if ticks <= 0.0 {
            0
        } else {
            ticks as u64
        }
    }

    /// Appends one record timestamped "now".
    ///
    /// `values` maps declared field names to values; omitted fields are
    /// emitted empty. Naming an undeclared field is an error.
    pub fn write_record(&mut self, values: &[(&str, &str)]) -> Result<()> {
        self.write_record_at(self.now_ticks(), values)
    }

    /// Appends one record at an explicit tick counter (replay, testing).
    ///
    /// A counter below the previous record's is clamped to it with a
    /// warning; the on-disk counter never decreases.
    pub fn write_record_at(&mut self, ticks: u64, values: &[(&str, &str)]) -> Result<()> {
        for (name, _) in values {
            if !self.fields.iter().skip(1).any(|f| f.name == *name) {
                return Err(HydraError::NoSuchField(name.to_string()));
            }
        }

        let mut ticks = ticks;
        let mut regressed = false;
        if ticks < self.prev_ticks {
            warn!(
                requested = ticks,
                prev = self.prev_ticks,
                "tick counter would regress; clamping"
            );
            ticks = self.prev_ticks;
            regressed = true;
        }
        let delta = ticks - self.prev_ticks;
        let tick_text = if regressed && self.format == Format::Tsv1 {
            encode_tick(self.format, Tick::Absolute(ticks))
        } else if delta == 0 {
            match self.format {
                // An empty first field would make the line TAB-led, which
                // tsv1 reads as a continuation; spell the zero out.
                Format::Tsv1 => encode_tick(self.format, Tick::Delta(0)),
                Format::Tsv0 => String::new(),
            }
        } else {
            encode_tick(self.format, Tick::Delta(delta))
        };

        let keep_newline = self.format == Format::Tsv1;
        let mut columns: Vec<String> = Vec::with_capacity(self.fields.len());
        columns.push(tick_text);
        let mut continuations: Vec<(usize, Vec<String>)> = Vec::new();
        for (i, spec) in self.fields.iter().enumerate().skip(1) {
            let raw = values
                .iter()
                .find(|(name, _)| *name == spec.name)
                .map(|(_, v)| *v)
                .unwrap_or("");
            let aliased = if spec.name == "level" {
                codec::writer_alias(raw).unwrap_or(raw)
            } else {
                raw
            };
            let clean = sanitize_value(aliased, keep_newline);
            let clean = if spec.default.as_deref() == Some(clean.as_ref()) {
                String::new()
            } else {
                clean.into_owned()
            };
            if keep_newline && clean.contains('\n') {
                let mut segments = clean.split('\n');
                columns.push(segments.next().unwrap_or("").to_string());
                continuations.push((i + 1, segments.map(str::to_owned).collect()));
            } else {
                columns.push(clean);
            }
        }

        let mut buf = String::new();
        if self.index_spacing > 0 && self.bytes_written >= self.next_anchor {
            buf.push_str(&anchor_line(self.prev_ticks));
            while self.next_anchor <= self.bytes_written {
                self.next_anchor += self.index_spacing;
            }
        }
        buf.push_str(&columns.join("\t"));
        buf.push('\n');
        for (column, lines) in continuations {
            for line in lines {
                for _ in 0..column {
                    buf.push('\t');
                }
                buf.push_str(&line);
                buf.push('\n');
            }
        }

        self.file.write_all(buf.as_bytes())?;
        self.bytes_written += buf.len() as u64;
        self.prev_ticks = ticks;
        Ok(())
    }

    /// Appends one record with positional message parts joined by single
    /// spaces plus extra named field values.
    pub fn log(&mut self, level: &str, parts: &[&str], fields: &[(&str, &str)]) -> Result<()> {
        let message = parts.join(" ");
        let mut values: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 2);
        values.push(("level", level));
        values.push(("message", message.as_str()));
        values.extend_from_slice(fields);
        self.write_record(&values)
    }

    /// Logs a TRACE record.
    pub fn trace(&mut self, message: &str) -> Result<()> {
        self.log("TRACE", &[message], &[])
    }

    /// Logs a DEBUG record.
    pub fn debug(&mut self, message: &str) -> Result<()> {
        self.log("DEBUG", &[message], &[])
    }

    /// Logs an INFO record.
    pub fn info(&mut self, message: &str) -> Result<()> {
        self.log("INFO", &[message], &[])
    }

    /// Logs a WARNING record.
    pub fn warn(&mut self, message: &str) -> Result<()> {
        self.log("WARNING", &[message], &[])
    }

    /// Logs an ERROR record.
    pub fn error(&mut self, message: &str) -> Result<()> {
        self.log("ERROR", &[message], &[])
    }

    /// Logs a CRITICAL record.
    pub fn crit(&mut self, message: &str) -> Result<()> {
        self.log("CRITICAL", &[message], &[])
    }

    /// Logs an ALERT record.
    pub fn alert(&mut self, message: &str) -> Result<()> {
        self.log("ALERT", &[message], &[])
    }

    /// Logs an EMERGENCY record.
    pub fn emerg(&mut self, message: &str) -> Result<()> {
        self.log("EMERGENCY", &[message], &[])
    }

    /// Flushes file content to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
