//! Property-based round-trip tests over real files.
//!
//! Values are constrained to what the format can legally store: no
//! control characters except `\n` inside tsv1 field values.

use hydralog::{FieldSpec, Reader, ReaderOptions, Writer, WriterOptions};
use proptest::prelude::*;
use tempfile::TempDir;

/// Printable, control-free field values.
fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,30}").unwrap()
}

/// Multi-line values: printable segments joined by newlines.
fn multiline_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::string::string_regex("[ -~]{0,12}").unwrap(), 1..5)
        .prop_map(|segs| segs.join("\n"))
}

/// Canonical level names plus a couple of pass-through spellings.
fn level_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("EMERGENCY"),
        Just("ALERT"),
        Just("CRITICAL"),
        Just("ERROR"),
        Just("WARNING"),
        Just("NOTICE"),
        Just("INFO"),
        Just("DEBUG"),
        Just("TRACE"),
        Just("DEBUG3"),
        Just("AUDIT"),
    ]
    .prop_map(str::to_string)
}

/// Bounded tick deltas; the running sum stays far from overflow.
fn deltas_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..10_000, 1..40)
}

/// Empty values decode as absent when no default is declared.
fn expected(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// decode(encode(R)) = R for single-line values, modulo empty-field
    /// normalization.
    #[test]
    fn prop_record_roundtrip(
        deltas in deltas_strategy(),
        values in prop::collection::vec((value_strategy(), value_strategy()), 40),
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prop.tsv");
        let mut w = Writer::create(&path, WriterOptions {
            fields: vec![FieldSpec::new("facility"), FieldSpec::new("message")],
            start_epoch: Some(1_000_000.0),
            ..WriterOptions::default()
        }).unwrap();
        let mut ticks = 0u64;
        let n = deltas.len();
        for (d, (facility, message)) in deltas.iter().zip(values.iter()) {
            ticks += d;
            w.write_record_at(ticks, &[("facility", facility), ("message", message)]).unwrap();
        }
        drop(w);

        let mut r = Reader::open(&path).unwrap();
        let mut count = 0;
        let mut prev_ts = f64::MIN;
        while let Some(rec) = r.next().unwrap() {
            let (facility, message) = &values[count];
            prop_assert_eq!(rec.facility(), expected(facility));
            prop_assert_eq!(rec.message(), expected(message));
            prop_assert!(rec.timestamp() >= prev_ts);
            prev_ts = rec.timestamp();
            count += 1;
        }
        prop_assert_eq!(count, n);
    }

    /// Messages containing newlines survive encode/decode bit-exact.
    #[test]
    fn prop_continuation_roundtrip(messages in prop::collection::vec(multiline_strategy(), 1..15)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multi.tsv");
        let mut w = Writer::create(&path, WriterOptions {
            fields: vec![FieldSpec::new("message")],
            start_epoch: Some(0.0),
            ..WriterOptions::default()
        }).unwrap();
        for (i, m) in messages.iter().enumerate() {
            w.write_record_at(i as u64 + 1, &[("message", m)]).unwrap();
        }
        drop(w);

        let mut r = Reader::open(&path).unwrap();
        for m in &messages {
            let rec = r.next().unwrap().unwrap();
            prop_assert_eq!(rec.message(), expected(m));
        }
        prop_assert!(r.next().unwrap().is_none());
    }

    /// The writer aliases recognized levels; the reader restores them.
    /// Unknown names pass through unchanged.
    #[test]
    fn prop_level_roundtrip(levels in prop::collection::vec(level_strategy(), 1..20)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.tsv");
        let mut w = Writer::create(&path, WriterOptions {
            fields: vec![FieldSpec::new("level"), FieldSpec::new("message")],
            start_epoch: Some(0.0),
            ..WriterOptions::default()
        }).unwrap();
        for (i, level) in levels.iter().enumerate() {
            w.write_record_at(i as u64 + 1, &[("level", level), ("message", "x")]).unwrap();
        }
        drop(w);

        let mut r = Reader::open(&path).unwrap();
        for level in &levels {
            let rec = r.next().unwrap().unwrap();
            prop_assert_eq!(rec.level(), Some(level.as_str()));
        }
    }

    /// After seek(t) the next record is the first with timestamp >= t.
    #[test]
    fn prop_seek_locality(
        deltas in prop::collection::vec(0u64..50, 1..30),
        offset in 0u64..1600,
        period in prop_oneof![Just(-1i64), Just(1i64), Just(4i64)],
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seek.tsv");
        let mut w = Writer::create(&path, WriterOptions {
            fields: vec![FieldSpec::new("message")],
            start_epoch: Some(50_000.0),
            ..WriterOptions::default()
        }).unwrap();
        let mut ticks = 0u64;
        let mut all_ts = Vec::new();
        for (i, d) in deltas.iter().enumerate() {
            ticks += d;
            all_ts.push(50_000.0 + ticks as f64);
            w.write_record_at(ticks, &[("message", &format!("r{i}"))]).unwrap();
        }
        drop(w);

        let mut r = Reader::open_with(&path, ReaderOptions {
            autoindex_period: period,
            ..ReaderOptions::default()
        }).unwrap();
        // warm the index with a full pass, then seek around
        while r.next().unwrap().is_some() {}

        let target = 50_000.0 + offset as f64;
        r.seek(target).unwrap();
        let got = r.peek().unwrap().map(|rec| rec.timestamp());
        let want = all_ts.iter().copied().find(|&t| t >= target);
        prop_assert_eq!(got, want);
    }
}
