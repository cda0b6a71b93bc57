// tests/jsonpath_walker.rs
//
// The explicit path type and its get/set/delete walkers, plus
// property-style checks for the walker and the search sanitizer.

use n8n_cli::jsonpath::{delete, get, set, FieldPath, PathSeg};
use proptest::prelude::*;
use serde_json::{json, Value};

#[test]
fn parse_handles_dotted_and_indexed_paths() {
    let path = FieldPath::parse("a.b[3].c").unwrap();
    assert_eq!(
        path.0,
        vec![
            PathSeg::Key("a".into()),
            PathSeg::Key("b".into()),
            PathSeg::Index(3),
            PathSeg::Key("c".into()),
        ]
    );
    assert_eq!(path.to_string(), "a.b[3].c");
}

#[test]
fn parse_rejects_malformed_paths() {
    assert!(FieldPath::parse("").is_err());
    assert!(FieldPath::parse("a..b").is_err());
    assert!(FieldPath::parse("a.").is_err());
    assert!(FieldPath::parse("a[b]").is_err());
    assert!(FieldPath::parse("a[1").is_err());
    assert!(FieldPath::parse("[0]").is_err());
}

#[test]
fn get_walks_objects_and_arrays() {
    let doc = json!({ "a": { "b": [ {"c": 42} ] } });
    let path = FieldPath::parse("a.b[0].c").unwrap();
    assert_eq!(get(&doc, &path), Some(&json!(42)));

    let missing = FieldPath::parse("a.b[1].c").unwrap();
    assert_eq!(get(&doc, &missing), None);
}

#[test]
fn set_creates_intermediate_containers() {
    let mut doc = json!({});
    let path = FieldPath::parse("rules.values[2].conditions.options").unwrap();
    set(&mut doc, &path, json!({ "caseSensitive": true })).unwrap();

    // Array padded with nulls up to index 2.
    assert_eq!(doc["rules"]["values"][0], Value::Null);
    assert_eq!(doc["rules"]["values"][1], Value::Null);
    assert_eq!(
        doc["rules"]["values"][2]["conditions"]["options"]["caseSensitive"],
        json!(true)
    );
}

#[test]
fn set_refuses_kind_mismatches() {
    let mut doc = json!({ "a": "scalar" });
    let path = FieldPath::parse("a.b").unwrap();
    assert!(set(&mut doc, &path, json!(1)).is_err());
    // The document is unchanged.
    assert_eq!(doc, json!({ "a": "scalar" }));
}

#[test]
fn delete_removes_and_reports() {
    let mut doc = json!({ "a": { "b": [1, 2, 3] } });

    let path = FieldPath::parse("a.b[1]").unwrap();
    assert_eq!(delete(&mut doc, &path), Some(json!(2)));
    assert_eq!(doc["a"]["b"], json!([1, 3]));

    let missing = FieldPath::parse("a.zzz").unwrap();
    assert_eq!(delete(&mut doc, &missing), None);
}

// -----------------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------------

/// Path segments that survive FieldPath's display/parse round trip.
fn arb_path() -> impl Strategy<Value = FieldPath> {
    let seg = prop_oneof![
        "[a-z][a-z0-9_]{0,8}".prop_map(PathSeg::Key),
        (0usize..5).prop_map(PathSeg::Index),
    ];
    proptest::collection::vec(seg, 1..6).prop_map(|mut segs| {
        // A leading index has no container to attach to; force a key.
        if matches!(segs[0], PathSeg::Index(_)) {
            segs[0] = PathSeg::Key("root".into());
        }
        FieldPath(segs)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn set_then_get_returns_what_was_written(path in arb_path(), payload in 0i64..1000) {
        let mut doc = json!({});
        let value = json!(payload);
        prop_assume!(set(&mut doc, &path, value.clone()).is_ok());
        prop_assert_eq!(get(&doc, &path), Some(&value));
    }

    #[test]
    fn display_parse_round_trips(path in arb_path()) {
        let rendered = path.to_string();
        let reparsed = FieldPath::parse(&rendered).unwrap();
        prop_assert_eq!(path, reparsed);
    }

    #[test]
    fn set_then_delete_round_trips(path in arb_path(), payload in 0i64..1000) {
        let mut doc = json!({});
        let value = json!(payload);
        prop_assume!(set(&mut doc, &path, value.clone()).is_ok());
        prop_assert_eq!(delete(&mut doc, &path), Some(value));
        prop_assert_eq!(get(&doc, &path), None);
    }

    #[test]
    fn fts_sanitizer_neutralizes_arbitrary_input(query in ".{0,40}") {
        use n8n_cli::catalog::{sanitize_fts_query, SearchMode};
        // Must never panic, and any produced query is quote-wrapped tokens.
        if let Some(sanitized) = sanitize_fts_query(&query, SearchMode::Or) {
            for token in sanitized.split(" OR ") {
                prop_assert!(token.starts_with('"') && token.ends_with('"'));
                let inner = &token[1..token.len() - 1];
                for meta in ['"', '(', ')', '{', '}', '[', ']', '*', '+', '-', ':', '^', '~'] {
                    prop_assert!(!inner.contains(meta));
                }
            }
        }
    }
}
