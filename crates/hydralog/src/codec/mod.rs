//! Shared record machinery for the tsv0 and tsv1 formats.
//!
//! Both formats store one record per line (plus continuation lines in
//! tsv1), TAB-separated, with the tick counter in the first column. This
//! module holds everything the reader and writer have in common: the tick
//! counter encodings, the level table, field declarations with defaults,
//! header line parsing and emission, and value validation.

use crate::error::{HydraError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Program name carried by the magic line.
pub const MAGIC_PROGRAM: &str = "hydralog-dump";

/// Prefix of metadata header lines.
pub const META_PREFIX: &str = "#%";

/// Prefix of the field declaration header line.
pub const FIELDS_PREFIX: &str = "#:";

/// On-disk format of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Historical format: hexadecimal tick differentials, no absolute
    /// counters, no continuation lines.
    Tsv0,
    /// Current format: base-64 tick counters with absolute resets and
    /// multi-line field values.
    Tsv1,
}

impl Format {
    /// On-disk name of the format.
    pub fn name(self) -> &'static str {
        match self {
            Format::Tsv0 => "tsv0",
            Format::Tsv1 => "tsv1",
        }
    }

    /// Parses an on-disk format name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tsv0" => Some(Format::Tsv0),
            "tsv1" => Some(Format::Tsv1),
            _ => None,
        }
    }

    /// Name of the mandatory first field.
    pub fn tick_field(self) -> &'static str {
        match self {
            Format::Tsv0 => "timestamp_step_hex",
            Format::Tsv1 => "dT",
        }
    }

    /// Metadata key carrying the tick scale.
    pub fn scale_key(self) -> &'static str {
        match self {
            Format::Tsv0 => "ts_scale",
            Format::Tsv1 => "timestamp_scale",
        }
    }

    /// The magic first line of a file in this format (without newline).
    /// tsv0 keeps the historical `--format=` spelling.
    pub fn magic_line(self) -> String {
        match self {
            Format::Tsv0 => format!("#!{} --format={}", MAGIC_PROGRAM, self.name()),
            Format::Tsv1 => format!("#!{} --in-format={}", MAGIC_PROGRAM, self.name()),
        }
    }
}

/// Parses the magic first line and selects the format.
///
/// Accepts both `--in-format=` and the historical `--format=`, and permits
/// the program token to carry an interpreter path.
pub fn parse_magic(line: &str) -> Result<Format> {
    let rest = line
        .strip_prefix("#!")
        .ok_or_else(|| HydraError::BadMagic(line.to_string()))?;
    let mut tokens = rest.split_whitespace();
    let program = tokens.next().unwrap_or("");
    let program = program.rsplit('/').next().unwrap_or(program);
    if program != MAGIC_PROGRAM {
        return Err(HydraError::BadMagic(line.to_string()));
    }
    for token in tokens {
        let name = token
            .strip_prefix("--in-format=")
            .or_else(|| token.strip_prefix("--format="));
        if let Some(name) = name {
            return Format::from_name(name)
                .ok_or_else(|| HydraError::UnknownFormat(name.to_string()));
        }
    }
    Err(HydraError::BadMagic(line.to_string()))
}

// ---------------------------------------------------------------------------
// Tick counter encodings
// ---------------------------------------------------------------------------

const B64_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_-";

fn b64_digit(c: u8) -> Option<u64> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as u64),
        b'A'..=b'Z' => Some((c - b'A') as u64 + 10),
        b'a'..=b'z' => Some((c - b'a') as u64 + 36),
        b'_' => Some(62),
        b'-' => Some(63),
        _ => None,
    }
}

/// Encodes a tick counter in the base-64 alphabet, most significant digit
/// first.
pub fn encode_base64(mut value: u64) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(B64_ALPHABET[(value & 0x3f) as usize]);
        value >>= 6;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    // the alphabet is ASCII
    String::from_utf8(digits).unwrap_or_default()
}

/// Decodes a base-64 tick counter.
pub fn decode_base64(text: &str) -> Result<u64> {
    if text.is_empty() {
        return Err(HydraError::BadCounter(text.to_string()));
    }
    let mut value: u64 = 0;
    for c in text.bytes() {
        let d = b64_digit(c).ok_or_else(|| HydraError::BadCounter(text.to_string()))?;
        if value > (u64::MAX >> 6) {
            return Err(HydraError::BadCounter(text.to_string()));
        }
        value = (value << 6) | d;
    }
    Ok(value)
}

/// Encodes a tick counter in uppercase hexadecimal.
pub fn encode_hex(value: u64) -> String {
    format!("{value:X}")
}

/// Decodes a hexadecimal tick counter (either case).
pub fn decode_hex(text: &str) -> Result<u64> {
    if text.is_empty() {
        return Err(HydraError::BadCounter(text.to_string()));
    }
    u64::from_str_radix(text, 16).map_err(|_| HydraError::BadCounter(text.to_string()))
}

/// A decoded tick counter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Empty field: the counter does not move.
    Same,
    /// Differential: add to the running counter.
    Delta(u64),
    /// Absolute reset (tsv1 only); must not decrease the counter.
    Absolute(u64),
}

/// Parses the first field of a record line.
pub fn parse_tick(format: Format, text: &str) -> Result<Tick> {
    if text.is_empty() {
        return Ok(Tick::Same);
    }
    if let Some(rest) = text.strip_prefix('=') {
        if format == Format::Tsv0 {
            return Err(HydraError::BadCounter(text.to_string()));
        }
        return Ok(Tick::Absolute(decode_base64(rest)?));
    }
    match format {
        Format::Tsv0 => Ok(Tick::Delta(decode_hex(text)?)),
        Format::Tsv1 => Ok(Tick::Delta(decode_base64(text)?)),
    }
}

/// Encodes a tick counter field for a record line.
pub fn encode_tick(format: Format, tick: Tick) -> String {
    match (format, tick) {
        (_, Tick::Same) => String::new(),
        (Format::Tsv0, Tick::Delta(d)) => encode_hex(d),
        (Format::Tsv1, Tick::Delta(d)) => encode_base64(d),
        (Format::Tsv1, Tick::Absolute(t)) => format!("={}", encode_base64(t)),
        (Format::Tsv0, Tick::Absolute(_)) => {
            debug_assert!(false, "tsv0 has no absolute counter form");
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// Canonical level names, writer aliases and accepted short read forms,
/// ordered by syslog priority (0 = most severe).
const LEVELS: [(&str, &str, &[&str]); 9] = [
    ("EMERGENCY", "EM", &["EMERG"]),
    ("ALERT", "A", &[]),
    ("CRITICAL", "C", &["CRIT"]),
    ("ERROR", "E", &["ERR"]),
    ("WARNING", "W", &["WARN"]),
    ("NOTICE", "N", &["NOTE"]),
    ("INFO", "I", &[]),
    ("DEBUG", "D", &[]),
    ("TRACE", "T", &[]),
];

/// Normalizes a level spelling to its canonical full name.
///
/// Matching is case-insensitive and accepts full names, the historical
/// short forms (`EMERG`, `CRIT`, ...) and the writer aliases
/// (`EM A C E W N I D T`). Unknown spellings yield `None` so the caller
/// can preserve them verbatim.
pub fn canonical_level(text: &str) -> Option<&'static str> {
    let upper = text.to_ascii_uppercase();
    for (name, alias, shorts) in LEVELS {
        if upper == name || upper == alias || shorts.contains(&upper.as_str()) {
            return Some(name);
        }
    }
    None
}

/// The compressed spelling the writer uses for a recognized level.
pub fn writer_alias(text: &str) -> Option<&'static str> {
    let canon = canonical_level(text)?;
    LEVELS
        .iter()
        .find(|(name, _, _)| *name == canon)
        .map(|(_, alias, _)| *alias)
}

/// Syslog-style priority of a level (EMERGENCY = 0 ... TRACE = 8).
///
/// `DEBUGn`/`TRACEn` variants with a decimal suffix land fractionally
/// above their base level. Unknown levels yield `None`.
pub fn level_priority(text: &str) -> Option<f64> {
    if let Some(canon) = canonical_level(text) {
        return LEVELS
            .iter()
            .position(|(name, _, _)| *name == canon)
            .map(|p| p as f64);
    }
    let upper = text.to_ascii_uppercase();
    for base in ["DEBUG", "TRACE"] {
        if let Some(suffix) = upper.strip_prefix(base) {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                let base_pri = LEVELS.iter().position(|(name, _, _)| *name == base)? as f64;
                let n: f64 = suffix.parse().ok()?;
                return Some(base_pri + n / 10f64.powi(suffix.len() as i32));
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Field declarations
// ---------------------------------------------------------------------------

/// Returns `true` when `name` is a legal field or metadata name (`\w+`).
pub fn is_word(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// One entry of the `#:` field vector: `NAME[:ENC][=DEFAULT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name (`\w+`).
    pub name: String,
    /// Encoding attribute, e.g. `UTF-8` or `*16`; informational except on
    /// the tick field, where `*N` carries the tick scale.
    pub encoding: Option<String>,
    /// Declared default: an empty field decodes to it, and the writer
    /// suppresses values equal to it. `Some("")` makes empty a legal value.
    pub default: Option<String>,
}

impl FieldSpec {
    /// A plain field with no encoding and no default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: None,
            default: None,
        }
    }

    /// A field with a declared default.
    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: None,
            default: Some(default.into()),
        }
    }

    /// Parses one `NAME[:ENC][=DEFAULT]` token.
    pub fn parse(token: &str) -> Result<Self> {
        let (head, default) = match token.split_once('=') {
            Some((h, d)) => (h, Some(d.to_string())),
            None => (token, None),
        };
        let (name, encoding) = match head.split_once(':') {
            Some((n, e)) => (n, Some(e.to_string())),
            None => (head, None),
        };
        if !is_word(name) {
            return Err(HydraError::FieldDecl(token.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            encoding,
            default,
        })
    }

    /// Renders the token back for a `#:` header line.
    pub fn header_token(&self) -> String {
        let mut out = self.name.clone();
        if let Some(enc) = &self.encoding {
            out.push(':');
            out.push_str(enc);
        }
        if let Some(default) = &self.default {
            out.push('=');
            out.push_str(default);
        }
        out
    }
}

/// Parses the payload of a `#%` metadata line (after the prefix).
pub fn parse_meta_line(rest: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for token in rest.split('\t') {
        let token = token.trim_matches(' ');
        if token.is_empty() {
            continue;
        }
        let (k, v) = token
            .split_once('=')
            .ok_or_else(|| HydraError::Header(format!("metadata without '=': {token:?}")))?;
        if !is_word(k) {
            return Err(HydraError::Header(format!("bad metadata key: {k:?}")));
        }
        pairs.push((k.to_string(), v.to_string()));
    }
    Ok(pairs)
}

/// Parses the payload of the `#:` field declaration line (after the
/// prefix). Field names must be unique.
pub fn parse_fields_line(rest: &str) -> Result<Vec<FieldSpec>> {
    let mut fields = Vec::new();
    for token in rest.split('\t') {
        let token = token.trim_matches(' ');
        if token.is_empty() {
            continue;
        }
        let spec = FieldSpec::parse(token)?;
        if fields.iter().any(|f: &FieldSpec| f.name == spec.name) {
            return Err(HydraError::FieldDecl(format!(
                "duplicate field name: {}",
                spec.name
            )));
        }
        fields.push(spec);
    }
    if fields.is_empty() {
        return Err(HydraError::Header("empty field declaration".to_string()));
    }
    Ok(fields)
}

/// Parses a `*N` tick-scale encoding attribute.
pub fn parse_scale(encoding: &str) -> Option<f64> {
    encoding
        .strip_prefix('*')
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .map(|n| n as f64)
}

// ---------------------------------------------------------------------------
// Anchor comments
// ---------------------------------------------------------------------------

/// Parses an anchor comment `#\tt=<hex>`, if that is what `line` is.
pub fn parse_anchor(line: &str) -> Option<u64> {
    let hex = line.strip_prefix("#\tt=")?;
    u64::from_str_radix(hex.trim_end(), 16).ok()
}

/// Renders an anchor comment for `ticks`, with trailing newline.
pub fn anchor_line(ticks: u64) -> String {
    format!("#\tt={ticks:X}\n")
}

// ---------------------------------------------------------------------------
// Value validation
// ---------------------------------------------------------------------------

/// Rejects control characters in a decoded value. `\n` is tolerated only
/// when `allow_newline` is set (joined continuation values).
pub fn validate_value(text: &str, allow_newline: bool) -> Result<()> {
    for b in text.bytes() {
        if b < 0x20 && !(allow_newline && b == b'\n') {
            return Err(HydraError::ControlChar { byte: b });
        }
    }
    Ok(())
}

/// Replaces forbidden control characters with spaces before encoding.
/// `keep_newline` preserves `\n` for formats with continuation lines.
pub fn sanitize_value(text: &str, keep_newline: bool) -> Cow<'_, str> {
    let dirty = text
        .bytes()
        .any(|b| b < 0x20 && !(keep_newline && b == b'\n'));
    if !dirty {
        return Cow::Borrowed(text);
    }
    let cleaned: String = text
        .chars()
        .map(|c| {
            if (c as u32) < 0x20 && !(keep_newline && c == '\n') {
                ' '
            } else {
                c
            }
        })
        .collect();
    Cow::Owned(cleaned)
}

// ---------------------------------------------------------------------------
// Header description
// ---------------------------------------------------------------------------

/// Everything a header says about a file, in parsed form.
///
/// Produced by readers and writers, and consumed by
/// [`Writer::create_from`](crate::writer::Writer::create_from) to start a
/// fresh file (rotation) with the same shape. `metadata` excludes
/// `start_epoch` and the scale key, which belong to the individual file.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSpec {
    /// On-disk format.
    pub format: Format,
    /// Full field vector, tick field first.
    pub fields: Vec<FieldSpec>,
    /// File-level metadata (sans per-file keys).
    pub metadata: BTreeMap<String, String>,
    /// Ticks per second.
    pub timestamp_scale: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_known_values() {
        assert_eq!(encode_base64(0), "0");
        assert_eq!(encode_base64(9), "9");
        assert_eq!(encode_base64(10), "A");
        assert_eq!(encode_base64(36), "a");
        assert_eq!(encode_base64(62), "_");
        assert_eq!(encode_base64(63), "-");
        // 64 is "10": one sixty-four, zero units
        assert_eq!(encode_base64(64), "10");
        assert_eq!(decode_base64("10").unwrap(), 64);
        assert_eq!(decode_base64("--").unwrap(), 63 * 64 + 63);
    }

    #[test]
    fn test_base64_roundtrip() {
        for v in [0u64, 1, 63, 64, 65, 4096, 123_456_789, u64::MAX] {
            assert_eq!(decode_base64(&encode_base64(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(decode_base64("").is_err());
        assert!(decode_base64("1.5").is_err());
        assert!(decode_base64("+1").is_err());
    }

    #[test]
    fn test_hex_either_case() {
        assert_eq!(decode_hex("ff").unwrap(), 255);
        assert_eq!(decode_hex("FF").unwrap(), 255);
        assert_eq!(encode_hex(255), "FF");
        assert!(decode_hex("").is_err());
        assert!(decode_hex("xyz").is_err());
    }

    #[test]
    fn test_parse_tick() {
        assert_eq!(parse_tick(Format::Tsv1, "").unwrap(), Tick::Same);
        assert_eq!(parse_tick(Format::Tsv1, "10").unwrap(), Tick::Delta(64));
        assert_eq!(
            parse_tick(Format::Tsv1, "=10").unwrap(),
            Tick::Absolute(64)
        );
        assert_eq!(parse_tick(Format::Tsv0, "10").unwrap(), Tick::Delta(16));
        // tsv0 has no absolute form
        assert!(parse_tick(Format::Tsv0, "=10").is_err());
    }

    #[test]
    fn test_magic_line_roundtrip() {
        for format in [Format::Tsv0, Format::Tsv1] {
            assert_eq!(parse_magic(&format.magic_line()).unwrap(), format);
        }
        // legacy spelling accepted for tsv1 as well
        assert_eq!(
            parse_magic("#!hydralog-dump --format=tsv1").unwrap(),
            Format::Tsv1
        );
        // interpreter-style path
        assert_eq!(
            parse_magic("#!/usr/bin/hydralog-dump --in-format=tsv1").unwrap(),
            Format::Tsv1
        );
        assert!(parse_magic("#!other-tool --in-format=tsv1").is_err());
        assert!(matches!(
            parse_magic("#!hydralog-dump --in-format=tsv9"),
            Err(HydraError::UnknownFormat(_))
        ));
        assert!(parse_magic("plain text").is_err());
    }

    #[test]
    fn test_level_canonicalization() {
        assert_eq!(canonical_level("warn"), Some("WARNING"));
        assert_eq!(canonical_level("WARNING"), Some("WARNING"));
        assert_eq!(canonical_level("W"), Some("WARNING"));
        assert_eq!(canonical_level("emerg"), Some("EMERGENCY"));
        assert_eq!(canonical_level("EM"), Some("EMERGENCY"));
        assert_eq!(canonical_level("custom"), None);
    }

    #[test]
    fn test_writer_alias() {
        assert_eq!(writer_alias("DEBUG"), Some("D"));
        assert_eq!(writer_alias("emergency"), Some("EM"));
        assert_eq!(writer_alias("weird"), None);
    }

    #[test]
    fn test_level_priority_ordering() {
        assert_eq!(level_priority("EMERGENCY"), Some(0.0));
        assert_eq!(level_priority("TRACE"), Some(8.0));
        let d = level_priority("DEBUG").unwrap();
        let d3 = level_priority("DEBUG3").unwrap();
        let t = level_priority("TRACE").unwrap();
        assert!(d < d3 && d3 < t);
        let d15 = level_priority("DEBUG15").unwrap();
        assert!((d15 - 7.15).abs() < 1e-9);
        assert_eq!(level_priority("nope"), None);
    }

    #[test]
    fn test_field_spec_parse() {
        let f = FieldSpec::parse("message").unwrap();
        assert_eq!(f.name, "message");
        assert_eq!(f.encoding, None);
        assert_eq!(f.default, None);

        let f = FieldSpec::parse("ident:UTF-8=daemon").unwrap();
        assert_eq!(f.name, "ident");
        assert_eq!(f.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(f.default.as_deref(), Some("daemon"));
        assert_eq!(f.header_token(), "ident:UTF-8=daemon");

        // empty default means empty is a legal value
        let f = FieldSpec::parse("facility=").unwrap();
        assert_eq!(f.default.as_deref(), Some(""));

        assert!(FieldSpec::parse("bad name").is_err());
        assert!(FieldSpec::parse(":x").is_err());
    }

    #[test]
    fn test_parse_fields_line_rejects_duplicates() {
        assert!(parse_fields_line("dT\tlevel\tlevel").is_err());
        let fields = parse_fields_line("dT:*16\tlevel\tmessage").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(parse_scale(fields[0].encoding.as_deref().unwrap()), Some(16.0));
    }

    #[test]
    fn test_parse_meta_line() {
        let pairs = parse_meta_line("start_epoch=1577836800\thost=db1").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("start_epoch".to_string(), "1577836800".to_string()),
                ("host".to_string(), "db1".to_string())
            ]
        );
        assert!(parse_meta_line("no_equals_here").is_err());
    }

    #[test]
    fn test_anchor_roundtrip() {
        let line = anchor_line(0x1234);
        assert_eq!(line, "#\tt=1234\n");
        assert_eq!(parse_anchor(line.trim_end()), Some(0x1234));
        assert_eq!(parse_anchor("# comment"), None);
        assert_eq!(parse_anchor("#\tt=zz"), None);
    }

    #[test]
    fn test_validate_and_sanitize() {
        assert!(validate_value("plain text", false).is_ok());
        assert!(validate_value("two\nlines", true).is_ok());
        assert!(validate_value("two\nlines", false).is_err());
        assert!(validate_value("tab\there", true).is_err());
        assert_eq!(sanitize_value("a\tb", false), "a b");
        assert_eq!(sanitize_value("a\nb", true), "a\nb");
        assert_eq!(sanitize_value("a\nb", false), "a b");
        assert!(matches!(sanitize_value("clean", true), Cow::Borrowed(_)));
    }
}
