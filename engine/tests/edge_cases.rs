//! Edge case tests for curator-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use curator_engine::{
    backup_file_name, next_sequence, plan_new_fields, CollectionCounts, Error, FieldType, JobState,
    Occupancy, Policy, Record, RecordKind, RefCollection, ReferenceRow, ReorderPlan, Snapshot,
    TEMP_OFFSET_GAP,
};
use serde_json::json;

fn row(value: serde_json::Value) -> curator_engine::FieldMap {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Compaction Edge Cases
// ============================================================================

#[test]
fn already_dense_ids_need_no_moves() {
    let plan = ReorderPlan::build(1..=50, 50).unwrap();
    assert_eq!(plan.move_count(), 0);
    assert_eq!(plan.next_id(), 51);
}

#[test]
fn only_attachments_leaves_nothing_to_compact() {
    let occupancy =
        Occupancy::from_iter([(3, RecordKind::Attachment), (8, RecordKind::Attachment)]);
    let plan = ReorderPlan::build(occupancy.live_ids(), occupancy.max_id()).unwrap();

    assert!(plan.is_empty());
    assert_eq!(plan.next_id(), 1);
    assert_eq!(plan.offset(), 8 + TEMP_OFFSET_GAP);
}

#[test]
fn offset_grows_with_record_count() {
    let count = TEMP_OFFSET_GAP + 10;
    let plan = ReorderPlan::build((1..=count).map(|id| id * 2), count * 2).unwrap();

    // The gap is raised to N+1 so temp ids never overlap the range 1..=N.
    assert_eq!(plan.offset(), count * 2 + count + 1);
    for m in plan.moves().take(100) {
        assert!(plan.temp_id(m) > count * 2);
    }
}

#[test]
fn unsorted_input_is_ordered_by_id() {
    let plan = ReorderPlan::build([40, 10, 30, 20], 40).unwrap();
    assert_eq!(plan.new_id_for(10), Some(1));
    assert_eq!(plan.new_id_for(40), Some(4));
}

#[test]
fn very_large_ids() {
    let plan = ReorderPlan::build([i64::MAX / 4, 1], i64::MAX / 4).unwrap();
    assert_eq!(plan.new_id_for(i64::MAX / 4), Some(2));
    assert!(plan.offset() > i64::MAX / 4);
}

// ============================================================================
// Allocation Edge Cases
// ============================================================================

#[test]
fn dense_store_allocates_past_the_end() {
    let occupancy: Occupancy = (1..=10).map(|id| (id, RecordKind::Post)).collect();
    for policy in Policy::ALL {
        assert_eq!(occupancy.allocate(policy).id, 11);
    }
}

#[test]
fn skip_policy_walks_over_attachment_runs() {
    let occupancy = Occupancy::from_iter([
        (1, "attachment"),
        (2, "attachment"),
        (3, "attachment"),
        (5, "post"),
    ]);
    assert_eq!(occupancy.allocate(Policy::MinFreeSkipAttachments).id, 4);
    assert_eq!(occupancy.allocate(Policy::GrowFreeSkipAttachments).id, 6);
}

#[test]
fn removing_an_evicted_attachment_frees_the_slot() {
    let mut occupancy = Occupancy::from_iter([(1, "post"), (2, "attachment")]);
    let allocation = occupancy.allocate(Policy::MinFreeDeleteAttachments);
    assert_eq!(allocation.evicted, Some(2));

    occupancy.remove(2);
    assert_eq!(occupancy.attachment_count(), 0);
    assert_eq!(occupancy.allocate(Policy::MinFreeSkipAttachments).id, 2);
}

// ============================================================================
// Record and Snapshot Edge Cases
// ============================================================================

#[test]
fn unicode_and_nested_fields_survive_snapshot() {
    let record = Record::new(1, RecordKind::Post)
        .with_field("title", "日本語テスト 🎉")
        .with_field("meta", json!({"a": [1, {"b": null}], "c": "x\ny"}));
    let snapshot = Snapshot::new(vec![record.clone()], vec![], 0);

    let parsed = Snapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
    assert_eq!(parsed.records[0], record);
}

#[test]
fn empty_snapshot_has_zero_totals() {
    let snapshot = Snapshot::from_json(r#"{"records": [], "referenceRows": []}"#).unwrap();
    assert_eq!(snapshot.totals(), CollectionCounts::default());

    let job = JobState::new("empty.json", snapshot.totals(), 0);
    assert!(job.is_complete());
    assert_eq!(job.percent(), 100);
    assert!(job.progress().done);
}

#[test]
fn snapshot_reference_rows_keep_their_collection() {
    let json = r#"{
        "records": [{"cid": 1, "type": "post", "parent": 0}],
        "referenceRows": [
            {"collection": "relationships", "cid": 1, "mid": 4},
            {"collection": "fields", "cid": 1, "name": "cover", "str_value": null}
        ],
        "timestamp": 5,
        "version": "2.0"
    }"#;

    let snapshot = Snapshot::from_json(json).unwrap();
    assert_eq!(snapshot.references_in(RefCollection::Relationships).count(), 1);
    assert_eq!(snapshot.references_in(RefCollection::Fields).count(), 1);
}

#[test]
fn unknown_reference_collection_is_malformed() {
    let json = r#"{"records": [], "referenceRows": [{"collection": "users", "uid": 1}]}"#;
    assert!(matches!(
        Snapshot::from_json(json),
        Err(Error::MalformedData(_))
    ));
}

#[test]
fn negative_parent_is_rejected() {
    assert!(Record::from_row(row(json!({"cid": 2, "type": "post", "parent": -1}))).is_err());
}

#[test]
fn reference_row_with_null_key() {
    let reference = ReferenceRow::new(
        RefCollection::Relationships,
        row(json!({"cid": 1, "mid": null})),
    );
    assert!(matches!(reference.key_values(), Err(Error::MalformedData(_))));
}

// ============================================================================
// Schema and Naming Edge Cases
// ============================================================================

#[test]
fn field_names_with_special_characters() {
    let rows = vec![row(json!({"cid": 1, "weird-name.with space": 1.5, "ünïcode": "x"}))];
    let fields = plan_new_fields(&["cid"], &["cid"], rows.iter());

    assert_eq!(fields.len(), 2);
    assert!(fields
        .iter()
        .any(|f| f.name == "weird-name.with space" && f.field_type == FieldType::Float));
}

#[test]
fn backup_sequence_past_ninety_nine() {
    let names: Vec<String> = (1..=99)
        .map(|n| backup_file_name("AMD_backup", "20240201", n))
        .collect();
    let next = next_sequence("AMD_backup", "20240201", names.iter().map(String::as_str));

    assert_eq!(next, 100);
    assert_eq!(
        backup_file_name("AMD_backup", "20240201", next),
        "AMD_backup_20240201_100.json"
    );
}
