//! End-to-end decode tests over the public API: JSON and columnar paths,
//! embedded promotion, indirection, custom codecs, and error reporting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder, TimestampMillisecondBuilder};
use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray, StructArray,
};
use arrow_schema::{Field as ArrowField, Schema};
use chrono::{DateTime, FixedOffset};
use tokio_util::sync::CancellationToken;

use skiff_core::{
    unmarshal_json, unmarshal_json_with, unmarshal_record, DecodeError, DecodeOptions,
    DecodeResult, Descriptor, Doc, DocSet, Field, Registry, ShapeRef, SlotMut,
};

struct Span;

impl Doc for Span {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Span>(
            "Span",
            vec![
                Field::new("ok", ShapeRef::of::<bool>()),
                Field::new("id", ShapeRef::of::<i64>()),
                Field::new("ratio", ShapeRef::of::<f64>()),
                Field::new("name", ShapeRef::of::<String>()),
                Field::new("tags", ShapeRef::of::<Vec<String>>()),
            ],
        )
    }
}

fn batch(cols: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<ArrowField> = cols
        .iter()
        .map(|(name, arr)| ArrowField::new(*name, arr.data_type().clone(), true))
        .collect();
    let arrays = cols.into_iter().map(|(_, arr)| arr).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

fn span_batch() -> RecordBatch {
    let mut tags = ListBuilder::new(StringBuilder::new());
    tags.values().append_value("prod");
    tags.values().append_value("edge");
    tags.append(true);
    tags.values().append_value("dev");
    tags.append(true);

    batch(vec![
        ("ok", Arc::new(BooleanArray::from(vec![true, false])) as ArrayRef),
        ("id", Arc::new(Int64Array::from(vec![7i64, 8])) as ArrayRef),
        (
            "ratio",
            Arc::new(Float64Array::from(vec![0.5f64, 1.5])) as ArrayRef,
        ),
        (
            "name",
            Arc::new(StringArray::from(vec!["alpha", "beta"])) as ArrayRef,
        ),
        ("tags", Arc::new(tags.finish()) as ArrayRef),
    ])
}

const SPAN_JSON: &[u8] = br#"[
    {"ok": true,  "id": 7, "ratio": 0.5, "name": "alpha", "tags": ["prod", "edge"]},
    {"ok": false, "id": 8, "ratio": 1.5, "name": "beta",  "tags": ["dev"]}
]"#;

fn assert_spans(docs: &DocSet<Span>) {
    assert_eq!(docs.len(), 2);

    let first = docs.get(0);
    assert!(first.bool("ok"));
    assert_eq!(first.i64("id"), 7);
    assert!((first.f64("ratio") - 0.5).abs() < f64::EPSILON);
    assert_eq!(first.str("name"), "alpha");
    let tags = first.seq("tags");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags.str(0), "prod");
    assert_eq!(tags.str(1), "edge");

    let second = docs.get(1);
    assert!(!second.bool("ok"));
    assert_eq!(second.i64("id"), 8);
    assert_eq!(second.str("name"), "beta");
    assert_eq!(second.seq("tags").len(), 1);
    assert_eq!(second.seq("tags").str(0), "dev");
}

#[test]
fn json_and_columnar_agree() {
    let reg = Registry::new();

    let mut from_json = DocSet::<Span>::new(&reg);
    unmarshal_json(&reg, SPAN_JSON, &mut from_json).unwrap();
    assert_spans(&from_json);

    let mut from_batch = DocSet::<Span>::new(&reg);
    unmarshal_record(&reg, &span_batch(), &mut from_batch).unwrap();
    assert_spans(&from_batch);
}

#[test]
fn unknown_keys_are_skipped() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    let json = br#"[{"junk": {"deep": [1, 2, {"x": "y"}]}, "id": 3, "more": null}]"#;
    unmarshal_json(&reg, json, &mut docs).unwrap();
    assert_eq!(docs.get(0).i64("id"), 3);
}

#[test]
fn case_insensitive_key_fallback() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    unmarshal_json(&reg, br#"[{"ID": 9, "Name": "mixed"}]"#, &mut docs).unwrap();
    assert_eq!(docs.get(0).i64("id"), 9);
    assert_eq!(docs.get(0).str("name"), "mixed");
}

#[test]
fn null_values_leave_zero_values() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    let json = br#"[{"ok": null, "id": null, "name": null, "tags": null}]"#;
    unmarshal_json(&reg, json, &mut docs).unwrap();
    let v = docs.get(0);
    assert!(!v.bool("ok"));
    assert_eq!(v.i64("id"), 0);
    assert_eq!(v.str("name"), "");
    assert!(v.seq("tags").is_empty());
}

#[test]
fn top_level_null_and_empty_array() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    unmarshal_json(&reg, b"null", &mut docs).unwrap();
    assert!(docs.is_empty());
    unmarshal_json(&reg, b" [] ", &mut docs).unwrap();
    assert!(docs.is_empty());
}

#[test]
fn trailing_garbage_is_syntax_error() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    let err = unmarshal_json(&reg, b"[] x", &mut docs).unwrap_err();
    assert!(matches!(err, DecodeError::Syntax { offset: 3, .. }));
}

#[test]
fn error_offsets_are_byte_exact() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    //        0123456789
    let json = br#"[{"id": x}]"#;
    let err = unmarshal_json(&reg, json, &mut docs).unwrap_err();
    assert!(
        matches!(err, DecodeError::UnexpectedEnd { context: "number", offset: 8 }),
        "{err}"
    );
}

#[test]
fn type_error_names_struct_and_field() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    let err = unmarshal_json(&reg, br#"[{"id": "nope"}]"#, &mut docs).unwrap_err();
    match err {
        DecodeError::Type {
            value,
            target,
            strukt,
            field,
            ..
        } => {
            assert_eq!(value, "string");
            assert_eq!(target, "i64");
            assert_eq!(strukt, "Span");
            assert_eq!(field, "id");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn depth_limit_applies_to_skipped_values() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    let mut json = br#"[{"junk":"#.to_vec();
    json.extend(std::iter::repeat(b'[').take(skiff_core::MAX_DEPTH + 1));
    let err = unmarshal_json(&reg, &json, &mut docs).unwrap_err();
    assert!(matches!(err, DecodeError::ExceededMaxDepth { .. }), "{err}");
}

#[test]
fn non_struct_root_is_invalid_unmarshal() {
    let reg = Registry::new();
    let mut docs = DocSet::<i64>::new(&reg);
    let err = unmarshal_json(&reg, b"[1, 2]", &mut docs).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::InvalidUnmarshal { target: "i64" }
    ));
}

// Fixed-length arrays.

struct Pair;

impl Doc for Pair {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Pair>(
            "Pair",
            vec![Field::new("xs", ShapeRef::of::<[i64; 2]>())],
        )
    }
}

#[test]
fn fixed_array_tail_fill_and_excess_skip() {
    let reg = Registry::new();
    let mut docs = DocSet::<Pair>::new(&reg);

    unmarshal_json(&reg, br#"[{"xs": [5]}]"#, &mut docs).unwrap();
    let xs = docs.get(0).array("xs");
    assert_eq!((xs.i64(0), xs.i64(1)), (5, 0));

    unmarshal_json(&reg, br#"[{"xs": [1, 2, 3, 4]}]"#, &mut docs).unwrap();
    let xs = docs.get(0).array("xs");
    assert_eq!((xs.i64(0), xs.i64(1)), (1, 2));

    // Re-decoding with null resets previously written slots.
    unmarshal_json(&reg, br#"[{"xs": null}]"#, &mut docs).unwrap();
    let xs = docs.get(0).array("xs");
    assert_eq!((xs.i64(0), xs.i64(1)), (0, 0));
}

#[test]
fn fixed_array_columnar_length_must_match() {
    let reg = Registry::new();
    let mut docs = DocSet::<Pair>::new(&reg);

    let mut xs = ListBuilder::new(arrow_array::builder::Int64Builder::new());
    xs.values().append_value(1);
    xs.values().append_value(2);
    xs.values().append_value(3);
    xs.append(true);
    let err = unmarshal_record(&reg, &batch(vec![("xs", Arc::new(xs.finish()) as ArrayRef)]), &mut docs)
        .unwrap_err();
    match err {
        DecodeError::Type { value, field, .. } => {
            assert_eq!(value, "list[3]");
            assert_eq!(field, "xs");
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut xs = ListBuilder::new(arrow_array::builder::Int64Builder::new());
    xs.values().append_value(4);
    xs.values().append_value(5);
    xs.append(true);
    unmarshal_record(&reg, &batch(vec![("xs", Arc::new(xs.finish()) as ArrayRef)]), &mut docs)
        .unwrap();
    let view = docs.get(0).array("xs");
    assert_eq!((view.i64(0), view.i64(1)), (4, 5));
}

// Pointer indirection and self-referential shapes.

struct Node;

impl Doc for Node {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Node>(
            "Node",
            vec![
                Field::new("value", ShapeRef::of::<i64>()),
                Field::new("next", ShapeRef::of::<Option<Box<Node>>>()),
            ],
        )
    }
}

#[test]
fn cyclic_shape_compiles_and_decodes() {
    let reg = Registry::new();
    let mut docs = DocSet::<Node>::new(&reg);
    let json = br#"[{"value": 1, "next": {"value": 2, "next": null}}]"#;
    unmarshal_json(&reg, json, &mut docs).unwrap();

    let head = docs.get(0);
    assert_eq!(head.i64("value"), 1);
    let tail = head.ptr("next").expect("second node present");
    assert_eq!(tail.i64("value"), 2);
    assert!(tail.ptr("next").is_none());
}

#[test]
fn null_pointer_never_allocates() {
    let reg = Registry::new();
    let mut docs = DocSet::<Node>::new(&reg);
    unmarshal_json(&reg, br#"[{"value": 3, "next": null}]"#, &mut docs).unwrap();
    assert!(docs.get(0).ptr("next").is_none());

    // Absent key behaves the same as an explicit null.
    unmarshal_json(&reg, br#"[{"value": 4}]"#, &mut docs).unwrap();
    assert!(docs.get(0).ptr("next").is_none());
}

// Embedded promotion.

struct Base;

impl Doc for Base {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Base>(
            "Base",
            vec![
                Field::new("span_id", ShapeRef::of::<String>()),
                Field::new("trace_id", ShapeRef::of::<String>()),
            ],
        )
    }
}

struct Event;

impl Doc for Event {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Event>(
            "Event",
            vec![
                Field::embedded("base", ShapeRef::of::<Base>()),
                Field::new("level", ShapeRef::of::<i64>()),
            ],
        )
    }
}

struct LinkedEvent;

impl Doc for LinkedEvent {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<LinkedEvent>(
            "LinkedEvent",
            vec![
                Field::embedded("base", ShapeRef::of::<Option<Box<Base>>>()),
                Field::new("level", ShapeRef::of::<i64>()),
            ],
        )
    }
}

#[test]
fn embedded_fields_promote_into_parent_keys() {
    let reg = Registry::new();
    let mut docs = DocSet::<Event>::new(&reg);
    let json = br#"[{"span_id": "s1", "trace_id": "t1", "level": 2}]"#;
    unmarshal_json(&reg, json, &mut docs).unwrap();

    let v = docs.get(0);
    assert_eq!(v.i64("level"), 2);
    let base = v.doc("base");
    assert_eq!(base.str("span_id"), "s1");
    assert_eq!(base.str("trace_id"), "t1");
}

#[test]
fn embedded_pointer_allocates_lazily() {
    let reg = Registry::new();
    let mut docs = DocSet::<LinkedEvent>::new(&reg);

    unmarshal_json(&reg, br#"[{"span_id": "s9", "level": 1}]"#, &mut docs).unwrap();
    let base = docs.get(0).ptr("base").expect("promoted value allocates");
    assert_eq!(base.str("span_id"), "s9");

    // No promoted key seen: the pointer stays nil.
    unmarshal_json(&reg, br#"[{"level": 1}]"#, &mut docs).unwrap();
    assert!(docs.get(0).ptr("base").is_none());
}

#[test]
fn embedded_fields_promote_in_columnar_order() {
    let reg = Registry::new();
    let mut docs = DocSet::<Event>::new(&reg);
    // Columns in declaration order: span_id, trace_id (promoted), level.
    let b = batch(vec![
        ("span_id", Arc::new(StringArray::from(vec!["s2"])) as ArrayRef),
        ("trace_id", Arc::new(StringArray::from(vec!["t2"])) as ArrayRef),
        ("level", Arc::new(Int64Array::from(vec![5i64])) as ArrayRef),
    ]);
    unmarshal_record(&reg, &b, &mut docs).unwrap();
    let v = docs.get(0);
    assert_eq!(v.doc("base").str("span_id"), "s2");
    assert_eq!(v.doc("base").str("trace_id"), "t2");
    assert_eq!(v.i64("level"), 5);
}

// Stringified payloads.

struct Wrapped;

impl Doc for Wrapped {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Wrapped>(
            "Wrapped",
            vec![
                Field::new("n", ShapeRef::of::<i64>()).stringified(),
                Field::new("p", ShapeRef::of::<Option<Box<i64>>>()).stringified(),
            ],
        )
    }
}

#[test]
fn stringified_values_re_enter_decode() {
    let reg = Registry::new();
    let mut docs = DocSet::<Wrapped>::new(&reg);
    unmarshal_json(&reg, br#"[{"n": "42", "p": "7"}]"#, &mut docs).unwrap();
    assert_eq!(docs.get(0).i64("n"), 42);

    unmarshal_json(&reg, br#"[{"n": "1", "p": null}]"#, &mut docs).unwrap();
    assert_eq!(docs.get(0).i64("n"), 1);

    // A bare value where the wrapping string should be is rejected.
    let err = unmarshal_json(&reg, br#"[{"n": 42}]"#, &mut docs).unwrap_err();
    assert!(
        matches!(err, DecodeError::UnexpectedEnd { context: "string", offset: 7 }),
        "{err}"
    );
}

// Timestamps.

struct Stamped;

impl Doc for Stamped {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Stamped>(
            "Stamped",
            vec![Field::new("at", ShapeRef::of::<DateTime<FixedOffset>>())],
        )
    }
}

#[test]
fn rfc3339_timestamps_keep_their_offset() {
    let reg = Registry::new();
    let mut docs = DocSet::<Stamped>::new(&reg);
    unmarshal_json(&reg, br#"[{"at": "2021-07-01T08:00:00-04:00"}]"#, &mut docs).unwrap();
    let at = docs.get(0).timestamp("at");
    assert_eq!(at.timestamp(), 1_625_140_800);
    assert_eq!(at.offset().local_minus_utc(), -4 * 3600);

    // The value token starts at byte 8.
    let err =
        unmarshal_json(&reg, br#"[{"at": "yesterday"}]"#, &mut docs).unwrap_err();
    assert!(matches!(err, DecodeError::Syntax { offset: 8, .. }), "{err}");
}

#[test]
fn timestamp_columns_convert_unit_and_zone() {
    let reg = Registry::new();
    let mut docs = DocSet::<Stamped>::new(&reg);

    // Milliseconds in a named zone; 2021-07-01 is EDT (UTC-4).
    let mut b = TimestampMillisecondBuilder::new().with_timezone("America/New_York");
    b.append_value(1_625_140_800_000);
    let col = b.finish();
    unmarshal_record(&reg, &batch(vec![("at", Arc::new(col) as ArrayRef)]), &mut docs).unwrap();

    let at = docs.get(0).timestamp("at");
    assert_eq!(at.timestamp(), 1_625_140_800);
    assert_eq!(at.offset().local_minus_utc(), -4 * 3600);
    assert_eq!(at.to_rfc3339(), "2021-07-01T08:00:00-04:00");
}

struct StampedList;

impl Doc for StampedList {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<StampedList>(
            "StampedList",
            vec![Field::new("at", ShapeRef::of::<[DateTime<FixedOffset>; 1]>())],
        )
    }
}

#[test]
fn timestamp_array_column_decodes_elementwise() {
    let reg = Registry::new();
    let mut docs = DocSet::<StampedList>::new(&reg);

    let mut list =
        ListBuilder::new(TimestampMillisecondBuilder::new().with_timezone("America/New_York"));
    list.values().append_value(1_625_140_800_000);
    list.append(true);
    unmarshal_record(
        &reg,
        &batch(vec![("at", Arc::new(list.finish()) as ArrayRef)]),
        &mut docs,
    )
    .unwrap();

    let at = docs.get(0).array("at").timestamp(0);
    assert_eq!(at.to_rfc3339(), "2021-07-01T08:00:00-04:00");
}

#[test]
fn columnar_arity_mismatch_is_rejected() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);
    // Two columns against five declared fields: a truncated batch must not
    // silently decode a prefix.
    let b = batch(vec![
        ("ok", Arc::new(BooleanArray::from(vec![true])) as ArrayRef),
        ("id", Arc::new(Int64Array::from(vec![1i64])) as ArrayRef),
    ]);
    let err = unmarshal_record(&reg, &b, &mut docs).unwrap_err();
    match err {
        DecodeError::Type { value, strukt, .. } => {
            assert_eq!(value, "struct of 2 columns");
            assert_eq!(strukt, "Span");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// Null columns never touch the destination.

#[test]
fn null_column_entries_leave_destination_untouched() {
    let reg = Registry::new();
    let mut docs = DocSet::<Span>::new(&reg);

    let mut tags = ListBuilder::new(StringBuilder::new());
    tags.append(false);
    tags.append(false);
    let b = batch(vec![
        ("ok", Arc::new(BooleanArray::from(vec![None, Some(true)])) as ArrayRef),
        ("id", Arc::new(Int64Array::from(vec![None, Some(1i64)])) as ArrayRef),
        (
            "ratio",
            Arc::new(Float64Array::from(vec![None, Some(2.0f64)])) as ArrayRef,
        ),
        (
            "name",
            Arc::new(StringArray::from(vec![None, Some("x")])) as ArrayRef,
        ),
        ("tags", Arc::new(tags.finish()) as ArrayRef),
    ]);

    unmarshal_record(&reg, &b, &mut docs).unwrap();
    let v = docs.get(0);
    assert!(!v.bool("ok"));
    assert_eq!(v.i64("id"), 0);
    assert_eq!(v.str("name"), "");
    assert!(v.seq("tags").is_empty());
    assert_eq!(docs.get(1).i64("id"), 1);
}

// Custom codecs.

struct Handle;

#[derive(Debug)]
struct HandleCodec {
    calls: Arc<AtomicUsize>,
    cancellable_calls: Arc<AtomicUsize>,
}

static HANDLE_CALLS: std::sync::OnceLock<(Arc<AtomicUsize>, Arc<AtomicUsize>)> =
    std::sync::OnceLock::new();

fn handle_counters() -> &'static (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    HANDLE_CALLS.get_or_init(|| {
        (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        )
    })
}

impl skiff_core::RawDocDecode for HandleCodec {
    fn decode_raw(&self, raw: &[u8], mut out: SlotMut<'_>) -> DecodeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let inner = raw.strip_prefix(b"\"").and_then(|r| r.strip_suffix(b"\""));
        let inner = inner.ok_or_else(|| DecodeError::Syntax {
            message: "handle must be a string".to_owned(),
            offset: 0,
        })?;
        out.put_bytes(inner)
    }

    fn decode_raw_cancellable(
        &self,
        cancel: &CancellationToken,
        raw: &[u8],
        out: SlotMut<'_>,
    ) -> DecodeResult<()> {
        self.cancellable_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(DecodeError::Syntax {
                message: "decode cancelled".to_owned(),
                offset: 0,
            });
        }
        self.decode_raw(raw, out)
    }
}

impl Doc for Handle {
    fn descriptor() -> Descriptor {
        let (calls, cancellable_calls) = handle_counters().clone();
        Descriptor::custom_of::<Handle>(
            "Handle",
            8,
            Arc::new(HandleCodec {
                calls,
                cancellable_calls,
            }),
        )
    }
}

struct Tagged;

impl Doc for Tagged {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Tagged>(
            "Tagged",
            vec![Field::new("handle", ShapeRef::of::<Handle>())],
        )
    }
}

#[test]
fn custom_codec_receives_exact_value_bytes() {
    let reg = Registry::new();
    let mut docs = DocSet::<Tagged>::new(&reg);
    unmarshal_json(&reg, br#"[{"handle": "h-77"}]"#, &mut docs).unwrap();
    assert_eq!(docs.get(0).str("handle"), "h-77");

    // A null value never reaches the codec.
    let before = handle_counters().0.load(Ordering::SeqCst);
    unmarshal_json(&reg, br#"[{"handle": null}]"#, &mut docs).unwrap();
    assert_eq!(handle_counters().0.load(Ordering::SeqCst), before);
    assert_eq!(docs.get(0).str("handle"), "");
}

#[test]
fn custom_codec_cancellation_path() {
    let reg = Registry::new();
    let mut docs = DocSet::<Tagged>::new(&reg);

    let token = CancellationToken::new();
    let opts = DecodeOptions {
        cancel: Some(token.clone()),
    };
    let before = handle_counters().1.load(Ordering::SeqCst);
    unmarshal_json_with(&reg, br#"[{"handle": "h-1"}]"#, &opts, &mut docs).unwrap();
    assert_eq!(handle_counters().1.load(Ordering::SeqCst), before + 1);

    token.cancel();
    let err = unmarshal_json_with(&reg, br#"[{"handle": "h-2"}]"#, &opts, &mut docs).unwrap_err();
    // The codec's syntax error surfaces at the value's offset (byte 12).
    assert!(matches!(err, DecodeError::Syntax { offset: 12, .. }), "{err}");
}

#[test]
fn custom_codec_errors_name_their_field() {
    let reg = Registry::new();
    let mut docs = DocSet::<Tagged>::new(&reg);
    let err = unmarshal_json(&reg, br#"[{"handle": 12}]"#, &mut docs).unwrap_err();
    assert!(matches!(err, DecodeError::Syntax { offset: 12, .. }), "{err}");
}

#[test]
fn null_timestamp_and_codec_columns_are_untouched() {
    let reg = Registry::new();

    // A null timestamp entry skips unit/zone conversion entirely; the slot
    // reads back as the epoch zero value.
    let mut docs = DocSet::<Stamped>::new(&reg);
    let mut b = TimestampMillisecondBuilder::new().with_timezone("America/New_York");
    b.append_null();
    unmarshal_record(&reg, &batch(vec![("at", Arc::new(b.finish()) as ArrayRef)]), &mut docs)
        .unwrap();
    let at = docs.get(0).timestamp("at");
    assert_eq!(at.timestamp(), 0);
    assert_eq!(at.offset().local_minus_utc(), 0);

    // A null codec column entry never reaches the codec.
    let mut docs = DocSet::<Tagged>::new(&reg);
    let before = handle_counters().0.load(Ordering::SeqCst);
    let col = StringArray::from(vec![None::<&str>]);
    unmarshal_record(&reg, &batch(vec![("handle", Arc::new(col) as ArrayRef)]), &mut docs)
        .unwrap();
    assert_eq!(handle_counters().0.load(Ordering::SeqCst), before);
    assert_eq!(docs.get(0).str("handle"), "");
}

// Maps are representable but not decodable.

struct WithMap;

impl Doc for WithMap {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<WithMap>(
            "WithMap",
            vec![
                Field::new("attrs", ShapeRef::of::<HashMap<String, i64>>()),
                Field::new("id", ShapeRef::of::<i64>()),
            ],
        )
    }
}

#[test]
fn map_fields_fail_only_when_touched() {
    let reg = Registry::new();
    let mut docs = DocSet::<WithMap>::new(&reg);

    unmarshal_json(&reg, br#"[{"id": 6}]"#, &mut docs).unwrap();
    assert_eq!(docs.get(0).i64("id"), 6);

    let err = unmarshal_json(&reg, br#"[{"attrs": {"a": 1}}]"#, &mut docs).unwrap_err();
    match err {
        DecodeError::Type { strukt, field, .. } => {
            assert_eq!(strukt, "WithMap");
            assert_eq!(field, "attrs");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// Nested structures in both modes.

struct Inner;

impl Doc for Inner {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Inner>(
            "Inner",
            vec![Field::new("n", ShapeRef::of::<i64>())],
        )
    }
}

struct Outer;

impl Doc for Outer {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<Outer>(
            "Outer",
            vec![
                Field::new("inner", ShapeRef::of::<Inner>()),
                Field::new("items", ShapeRef::of::<Vec<Inner>>()),
            ],
        )
    }
}

#[test]
fn nested_structures_decode_in_both_modes() {
    let reg = Registry::new();
    let mut docs = DocSet::<Outer>::new(&reg);

    let json = br#"[{"inner": {"n": 1}, "items": [{"n": 2}, {"n": 3}]}]"#;
    unmarshal_json(&reg, json, &mut docs).unwrap();
    let v = docs.get(0);
    assert_eq!(v.doc("inner").i64("n"), 1);
    assert_eq!(v.seq("items").doc(1).i64("n"), 3);

    let inner = StructArray::from(vec![(
        Arc::new(ArrowField::new("n", arrow_schema::DataType::Int64, true)),
        Arc::new(Int64Array::from(vec![1i64])) as ArrayRef,
    )]);
    let mut items = ListBuilder::new(arrow_array::builder::StructBuilder::from_fields(
        vec![ArrowField::new("n", arrow_schema::DataType::Int64, true)],
        2,
    ));
    {
        let sb = items.values();
        sb.field_builder::<arrow_array::builder::Int64Builder>(0)
            .unwrap()
            .append_value(2);
        sb.append(true);
        sb.field_builder::<arrow_array::builder::Int64Builder>(0)
            .unwrap()
            .append_value(3);
        sb.append(true);
    }
    items.append(true);

    let b = batch(vec![
        ("inner", Arc::new(inner) as ArrayRef),
        ("items", Arc::new(items.finish()) as ArrayRef),
    ]);
    let mut docs = DocSet::<Outer>::new(&reg);
    unmarshal_record(&reg, &b, &mut docs).unwrap();
    let v = docs.get(0);
    assert_eq!(v.doc("inner").i64("n"), 1);
    assert_eq!(v.seq("items").len(), 2);
    assert_eq!(v.seq("items").doc(0).i64("n"), 2);
    assert_eq!(v.seq("items").doc(1).i64("n"), 3);
}

// View accessors reuse descriptors resolved when the set was created.

static COUNTED_BUILDS: AtomicUsize = AtomicUsize::new(0);

struct Counted;

impl Doc for Counted {
    fn descriptor() -> Descriptor {
        COUNTED_BUILDS.fetch_add(1, Ordering::SeqCst);
        Descriptor::struct_of::<Counted>(
            "Counted",
            vec![Field::new("n", ShapeRef::of::<i64>())],
        )
    }
}

struct HasCounted;

impl Doc for HasCounted {
    fn descriptor() -> Descriptor {
        Descriptor::struct_of::<HasCounted>(
            "HasCounted",
            vec![
                Field::new("c", ShapeRef::of::<Counted>()),
                Field::new("cs", ShapeRef::of::<Vec<Counted>>()),
            ],
        )
    }
}

#[test]
fn view_accessors_reuse_resolved_descriptors() {
    let reg = Registry::new();
    let mut docs = DocSet::<HasCounted>::new(&reg);
    unmarshal_json(&reg, br#"[{"c": {"n": 1}, "cs": [{"n": 2}, {"n": 3}]}]"#, &mut docs).unwrap();

    let after_decode = COUNTED_BUILDS.load(Ordering::SeqCst);
    let v = docs.get(0);
    assert_eq!(v.doc("c").i64("n"), 1);
    let cs = v.seq("cs");
    assert_eq!(cs.len(), 2);
    assert_eq!(cs.doc(1).i64("n"), 3);
    assert_eq!(
        COUNTED_BUILDS.load(Ordering::SeqCst),
        after_decode,
        "reading views must not rebuild shape descriptors"
    );
}
