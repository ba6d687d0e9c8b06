use proptest::prelude::*;
use serde_json::{json, Value};

use homni_onboarding::Metadata;

fn extensions(pairs: Vec<(String, i64)>) -> Metadata {
    pairs
        .into_iter()
        .fold(Metadata::default(), |meta, (key, value)| meta.with_extension(key, value))
}

proptest! {
    #[test]
    fn merge_never_drops_existing_keys(
        existing in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8),
        incoming in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8),
    ) {
        let base = extensions(existing);
        let update = extensions(incoming);
        let merged = base.merged_with(&update);

        for key in base.extensions.keys() {
            prop_assert!(merged.extensions.contains_key(key));
        }
        for (key, value) in &update.extensions {
            prop_assert_eq!(merged.extensions.get(key), Some(value));
        }
        prop_assert!(merged.extensions.len() <= base.extensions.len() + update.extensions.len());
    }

    #[test]
    fn merge_with_empty_is_identity(
        existing in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8),
        count in proptest::option::of(0u64..1000),
    ) {
        let mut base = extensions(existing);
        base.linked_leads_count = count;
        prop_assert_eq!(base.merged_with(&Metadata::default()), base);
    }
}

#[test]
fn test_column_round_trip_preserves_foreign_keys() {
    let stored = r#"{"theme":"dark","companyName":"Acme AS","nested":{"a":[1,2]},"onboarding_completed":false}"#;
    let meta = Metadata::from_column(Some(stored)).unwrap();

    assert_eq!(meta.onboarding_completed, Some(false));
    assert_eq!(meta.company_name(), Some("Acme AS"));

    let written: Value = serde_json::from_str(&meta.to_column().unwrap()).unwrap();
    let original: Value = serde_json::from_str(stored).unwrap();
    assert_eq!(written, original);
}

#[test]
fn test_mistyped_column_still_reads_and_round_trips() {
    let stored = r#"{"version":"2.0","linked_leads_count":2.5,"companyName":42,"theme":"dark"}"#;
    let meta = Metadata::from_column(Some(stored)).expect("Mistyped keys must not fail the read");

    assert_eq!(meta.version, None);
    assert_eq!(meta.linked_leads_count, None);
    assert_eq!(meta.company_name(), None);

    let written: Value = serde_json::from_str(&meta.to_column().unwrap()).unwrap();
    let original: Value = serde_json::from_str(stored).unwrap();
    assert_eq!(written, original);
}

#[test]
fn test_typed_fields_override_on_merge() {
    let mut existing = Metadata {
        linked_leads_count: Some(5),
        company_name: Some("Old AS".to_string()),
        ..Metadata::default()
    };
    let incoming = Metadata {
        company_name: Some("New AS".to_string()),
        ..Metadata::default()
    };

    existing.merge(&incoming);
    assert_eq!(existing.company_name(), Some("New AS"));
    assert_eq!(existing.linked_leads_count, Some(5));
}

#[test]
fn test_malformed_column_is_an_error() {
    assert!(Metadata::from_column(Some("[1, 2]")).is_err());
    assert!(Metadata::from_column(Some("{not json")).is_err());
    assert_eq!(
        serde_json::to_value(Metadata::from_column(Some("  ")).unwrap()).unwrap(),
        json!({})
    );
}
