//! Synchronization protocol tests: mutations on either proxy mirror onto the
//! opposite tree, indexes stay aligned, detached subtrees are reclaimed

use rstest::{fixture, rstest};
use serde_json::json;

use treemirror::{AliasTable, NodeSeed, TreeError, TreeMapper};

/// Two-level tree under partially aliased field names: `label` -> `name`,
/// `children` -> `items`; `id` keeps its default name.
#[fixture]
fn mapper() -> TreeMapper {
    treemirror::util::testing::init_test_setup();
    TreeMapper::new(
        json!({
            "id": 1,
            "name": "Root",
            "items": [
                {"id": 11, "name": "A", "items": [
                    {"id": 111, "name": "A1"},
                ]},
                {"id": 12, "name": "B"},
            ]
        }),
        AliasTable::from_pairs([("label", "name"), ("children", "items")]).unwrap(),
    )
    .unwrap()
}

fn view_ids(mapper: &TreeMapper) -> Vec<serde_json::Value> {
    mapper
        .view_children(mapper.view_root())
        .iter()
        .map(|&c| mapper.view(c).unwrap().id.clone())
        .collect()
}

fn raw_ids(mapper: &TreeMapper) -> Vec<serde_json::Value> {
    mapper
        .raw_children(mapper.raw_root())
        .iter()
        .map(|&c| mapper.raw(c).unwrap().field("id").cloned().unwrap())
        .collect()
}

// ============================================================
// Index alignment
// ============================================================

#[rstest]
fn given_mixed_edit_sequence_when_applied_then_indexes_stay_aligned(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let view_root = mapper.view_root();

    mapper
        .raw_proxy()
        .push_child(raw_root, json!({"id": 13, "name": "C"}))
        .unwrap();
    mapper.view_proxy().remove_child(view_root, 0).unwrap();
    mapper
        .raw_proxy()
        .set_child(raw_root, 1, json!({"id": 14, "name": "D"}))
        .unwrap();
    mapper
        .view_proxy()
        .push_child(view_root, NodeSeed::new(15, "E"))
        .unwrap();

    assert_eq!(view_ids(&mapper), vec![json!(12), json!(14), json!(15)]);
    assert_eq!(raw_ids(&mapper), vec![json!(12), json!(14), json!(15)]);

    // Pairing still holds position by position
    let raw_children = mapper.raw_children(raw_root);
    let view_children = mapper.view_children(view_root);
    assert_eq!(raw_children.len(), view_children.len());
    for (raw_child, view_child) in raw_children.iter().zip(&view_children) {
        assert_eq!(mapper.view_node_for(*raw_child), Some(*view_child));
    }
}

#[rstest]
fn given_view_delete_when_mirrored_then_raw_index_removed(mut mapper: TreeMapper) {
    let view_root = mapper.view_root();
    let removed = mapper.view_proxy().remove_child(view_root, 0).unwrap();

    assert_eq!(removed["id"], json!(11));
    assert_eq!(raw_ids(&mapper), vec![json!(12)]);
    assert_eq!(view_ids(&mapper), vec![json!(12)]);
}

#[rstest]
fn given_raw_delete_when_mirrored_then_view_index_removed(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let removed = mapper.raw_proxy().remove_child(raw_root, 1).unwrap();

    assert_eq!(removed, json!({"id": 12, "name": "B"}));
    assert_eq!(view_ids(&mapper), vec![json!(11)]);
}

// ============================================================
// Appends
// ============================================================

#[rstest]
fn given_view_push_when_mirrored_then_raw_child_materializes_aliased(mut mapper: TreeMapper) {
    let view_root = mapper.view_root();
    let seed = NodeSeed::new(20, "New").with_children(vec![NodeSeed::new(21, "Nested")]);
    let new_view = mapper.view_proxy().push_child(view_root, seed).unwrap();

    let new_raw = mapper.raw_node_for(new_view).expect("pair registered");
    let record = mapper.raw(new_raw).unwrap();
    assert_eq!(record.field("id"), Some(&json!(20)));
    assert_eq!(record.field("name"), Some(&json!("New")));
    // Flags stay view-only on conversion
    assert_eq!(record.field("isDisabled"), None);
    assert_eq!(record.field("isLeaf"), None);

    // The nested seed converted too, and the whole tree exports with the
    // caller's children key
    let exported = mapper.export_raw();
    assert_eq!(exported["items"][2]["items"][0]["id"], json!(21));
}

#[rstest]
fn given_leaf_raw_record_when_view_pushes_then_children_array_is_created(mut mapper: TreeMapper) {
    // Node B has no "items" key at all
    let b_view = mapper.view_children(mapper.view_root())[1];
    mapper
        .view_proxy()
        .push_child(b_view, NodeSeed::new(121, "B1"))
        .unwrap();

    let b_raw = mapper.raw_node_for(b_view).unwrap();
    assert!(mapper.raw(b_raw).unwrap().has_children_key());
    assert_eq!(mapper.export_raw()["items"][1]["items"][0]["id"], json!(121));
}

// ============================================================
// Scalar fields and the write-back rule
// ============================================================

#[rstest]
fn given_raw_scalar_update_when_mirrored_then_view_field_changes(mut mapper: TreeMapper) {
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    mapper
        .raw_proxy()
        .set_field(a_raw, "name", json!("renamed"))
        .unwrap();

    let a_view = mapper.view_node_for(a_raw).unwrap();
    assert_eq!(mapper.view(a_view).unwrap().label, "renamed");
}

#[rstest]
fn given_raw_insert_of_aliasable_key_when_mirrored_then_view_flag_set(mut mapper: TreeMapper) {
    // isDisabled keeps its canonical name as default alias; the raw record
    // gains the key, the view node picks the flag up
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    mapper
        .raw_proxy()
        .set_field(a_raw, "isDisabled", json!(true))
        .unwrap();

    let a_view = mapper.view_node_for(a_raw).unwrap();
    assert!(mapper.view(a_view).unwrap().is_disabled);
}

#[rstest]
fn given_unmapped_raw_key_when_written_then_view_untouched(mut mapper: TreeMapper) {
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    let a_view = mapper.view_node_for(a_raw).unwrap();
    let before = mapper.view(a_view).unwrap().clone();

    mapper
        .raw_proxy()
        .set_field(a_raw, "payload", json!({"anything": [1, 2]}))
        .unwrap();

    assert_eq!(mapper.view(a_view).unwrap(), &before);
    assert_eq!(mapper.raw(a_raw).unwrap().field("payload"), Some(&json!({"anything": [1, 2]})));
}

#[rstest]
fn given_configured_alias_when_view_writes_then_only_that_raw_field_changes(mut mapper: TreeMapper) {
    let a_view = mapper.view_children(mapper.view_root())[0];
    mapper.view_proxy().set_label(a_view, "edited").unwrap();

    let a_raw = mapper.raw_node_for(a_view).unwrap();
    let record = mapper.raw(a_raw).unwrap();
    assert_eq!(record.field("name"), Some(&json!("edited")));
    // Nothing else appeared
    assert_eq!(record.field("label"), None);
    assert_eq!(record.field("id"), Some(&json!(11)));
    assert_eq!(record.fields().len(), 2);
}

#[rstest]
fn given_unconfigured_flag_when_view_writes_then_raw_shape_unpolluted(mut mapper: TreeMapper) {
    // isLeaf has no configured alias and the raw record has no "isLeaf" key:
    // the write must be a silent no-op on the raw side
    let a_view = mapper.view_children(mapper.view_root())[0];
    mapper.view_proxy().set_leaf(a_view, true).unwrap();

    assert!(mapper.view(a_view).unwrap().is_leaf);
    let a_raw = mapper.raw_node_for(a_view).unwrap();
    assert_eq!(mapper.raw(a_raw).unwrap().field("isLeaf"), None);
}

#[rstest]
fn given_preexisting_raw_key_when_view_writes_then_lands_without_alias(mut mapper: TreeMapper) {
    // "id" is not configured in the alias table, but the raw records carry an
    // "id" key already, so identity writes go through
    let a_view = mapper.view_children(mapper.view_root())[0];
    mapper.view_proxy().set_id(a_view, json!(991)).unwrap();

    let a_raw = mapper.raw_node_for(a_view).unwrap();
    assert_eq!(mapper.raw(a_raw).unwrap().field("id"), Some(&json!(991)));
}

#[rstest]
fn given_raw_field_removal_when_mirrored_then_view_field_resets(mut mapper: TreeMapper) {
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    let a_view = mapper.view_node_for(a_raw).unwrap();

    assert!(mapper.raw_proxy().remove_field(a_raw, "name").unwrap());
    assert_eq!(mapper.view(a_view).unwrap().label, "");
    assert!(!mapper.raw_proxy().remove_field(a_raw, "name").unwrap());
}

#[rstest]
fn given_private_prefixed_key_when_written_then_stored_but_never_mirrored(mut mapper: TreeMapper) {
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    let a_view = mapper.view_node_for(a_raw).unwrap();
    let before = mapper.view(a_view).unwrap().clone();

    mapper
        .raw_proxy()
        .set_field(a_raw, "_isDisabled", json!(true))
        .unwrap();

    assert_eq!(mapper.raw(a_raw).unwrap().field("_isDisabled"), Some(&json!(true)));
    assert_eq!(mapper.view(a_view).unwrap(), &before);
}

// ============================================================
// Replacement and reparenting
// ============================================================

#[rstest]
fn given_fresh_replacement_when_mirrored_then_old_pair_detached(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let old_raw = mapper.raw_children(raw_root)[1];
    let old_view = mapper.view_node_for(old_raw).unwrap();

    mapper
        .raw_proxy()
        .set_child(raw_root, 1, json!({"id": 99, "name": "fresh"}))
        .unwrap();

    assert_eq!(view_ids(&mapper), vec![json!(11), json!(99)]);
    assert_eq!(mapper.view_node_for(old_raw), None);
    assert_eq!(mapper.raw_node_for(old_view), None);
}

#[rstest]
fn given_existing_node_moved_by_raw_replace_then_view_reuses_and_reparents(mut mapper: TreeMapper) {
    // Move A1 (grandchild) up to replace B at root index 1
    let raw_root = mapper.raw_root();
    let a_raw = mapper.raw_children(raw_root)[0];
    let a1_raw = mapper.raw_children(a_raw)[0];
    let a1_view_before = mapper.view_node_for(a1_raw).unwrap();
    let b_raw = mapper.raw_children(raw_root)[1];
    let b_view = mapper.view_node_for(b_raw).unwrap();

    mapper
        .raw_proxy()
        .set_child_existing(raw_root, 1, a1_raw)
        .unwrap();

    // Same view node, new parent
    let a1_view = mapper.view_node_for(a1_raw).unwrap();
    assert_eq!(a1_view, a1_view_before);
    assert_eq!(mapper.view_parent(a1_view), Some(mapper.view_root()));

    // The old parent no longer references the moved node, on either side
    let a_view = mapper.view_node_for(a_raw).unwrap();
    assert_eq!(mapper.view_children(a_view), vec![]);
    assert_eq!(mapper.raw_children(a_raw), vec![]);

    // The replaced occupant pair is gone
    assert_eq!(mapper.raw_node_for(b_view), None);
    assert_eq!(view_ids(&mapper), vec![json!(11), json!(111)]);
}

#[rstest]
fn given_existing_node_moved_by_view_replace_then_raw_moves_with_it(mut mapper: TreeMapper) {
    let view_root = mapper.view_root();
    let a_view = mapper.view_children(view_root)[0];
    let a1_view = mapper.view_children(a_view)[0];
    let a1_raw = mapper.raw_node_for(a1_view).unwrap();

    mapper
        .view_proxy()
        .set_child_existing(view_root, 1, a1_view)
        .unwrap();

    assert_eq!(mapper.raw_node_for(a1_view), Some(a1_raw));
    assert_eq!(mapper.raw_parent(a1_raw), Some(mapper.raw_root()));
    assert_eq!(raw_ids(&mapper), vec![json!(11), json!(111)]);
    assert_eq!(mapper.view_children(a_view), vec![]);
}

#[rstest]
fn given_move_into_own_subtree_when_replacing_then_cycle_detected(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let a_raw = mapper.raw_children(raw_root)[0];
    let err = mapper
        .raw_proxy()
        .set_child_existing(a_raw, 0, raw_root)
        .unwrap_err();
    assert!(matches!(err, TreeError::CycleDetected));
}

// ============================================================
// Whole-children replacement and truncation
// ============================================================

#[rstest]
fn given_raw_children_field_replaced_then_view_rebuilds(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let old_views = mapper.view_children(mapper.view_root());

    mapper
        .raw_proxy()
        .set_field(
            raw_root,
            "items",
            json!([{"id": 31, "name": "X"}, {"id": 32, "name": "Y"}]),
        )
        .unwrap();

    assert_eq!(view_ids(&mapper), vec![json!(31), json!(32)]);
    for view_child in mapper.view_children(mapper.view_root()) {
        assert_eq!(mapper.view_parent(view_child), Some(mapper.view_root()));
    }
    // Old subtrees were detached
    for old in old_views {
        assert_eq!(mapper.raw_node_for(old), None);
        assert!(mapper.view(old).is_none());
    }
}

#[rstest]
fn given_view_children_replaced_then_raw_rebuilds_with_aliases(mut mapper: TreeMapper) {
    let view_root = mapper.view_root();
    mapper
        .view_proxy()
        .set_children(view_root, vec![NodeSeed::new(41, "P"), NodeSeed::new(42, "Q")])
        .unwrap();

    assert_eq!(raw_ids(&mapper), vec![json!(41), json!(42)]);
    assert_eq!(mapper.export_raw()["items"][0]["name"], json!("P"));
    assert_eq!(mapper.raw_count(), 3);
    assert_eq!(mapper.view_count(), 3);
}

#[rstest]
fn given_raw_children_set_to_null_then_view_children_clear(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    mapper
        .raw_proxy()
        .set_field(raw_root, "items", json!(null))
        .unwrap();

    assert_eq!(mapper.view(mapper.view_root()).unwrap().child_count(), 0);
    assert!(!mapper.raw(raw_root).unwrap().has_children_key());
    assert_eq!(mapper.raw_count(), 1);
    assert_eq!(mapper.view_count(), 1);
}

#[rstest]
fn given_raw_truncation_then_view_truncates_and_detaches(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let dropped_view = mapper.view_children(mapper.view_root())[1];

    mapper.raw_proxy().truncate_children(raw_root, 1).unwrap();

    assert_eq!(view_ids(&mapper), vec![json!(11)]);
    assert!(mapper.view(dropped_view).is_none());
}

#[rstest]
fn given_view_truncation_to_zero_then_raw_empties(mut mapper: TreeMapper) {
    let view_root = mapper.view_root();
    mapper.view_proxy().truncate_children(view_root, 0).unwrap();

    assert_eq!(raw_ids(&mapper), vec![] as Vec<serde_json::Value>);
    // Only the two roots remain
    assert_eq!(mapper.raw_count(), 1);
    assert_eq!(mapper.view_count(), 1);
}

// ============================================================
// Reclamation
// ============================================================

#[rstest]
fn given_subtree_removal_then_all_pair_state_reclaimed(mut mapper: TreeMapper) {
    assert_eq!(mapper.raw_count(), 4);
    assert_eq!(mapper.view_count(), 4);

    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    let a_view = mapper.view_node_for(a_raw).unwrap();
    let a1_raw = mapper.raw_children(a_raw)[0];
    let a1_view = mapper.view_node_for(a1_raw).unwrap();

    // Removing A drops A and A1 from both stores
    let raw_root = mapper.raw_root();
    mapper.raw_proxy().remove_child(raw_root, 0).unwrap();

    assert_eq!(mapper.raw_count(), 2);
    assert_eq!(mapper.view_count(), 2);
    for (raw_id, view_id) in [(a_raw, a_view), (a1_raw, a1_view)] {
        assert!(mapper.raw(raw_id).is_none());
        assert!(mapper.view(view_id).is_none());
        assert_eq!(mapper.view_node_for(raw_id), None);
        assert_eq!(mapper.raw_node_for(view_id), None);
    }
}

#[rstest]
fn given_detached_handle_when_mutating_then_detached_error(mut mapper: TreeMapper) {
    let a_raw = mapper.raw_children(mapper.raw_root())[0];
    let raw_root = mapper.raw_root();
    mapper.raw_proxy().remove_child(raw_root, 0).unwrap();

    let err = mapper
        .raw_proxy()
        .set_field(a_raw, "name", json!("ghost"))
        .unwrap_err();
    assert!(matches!(err, TreeError::DetachedNode));
}

#[rstest]
fn given_out_of_bounds_index_when_mutating_then_error(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let err = mapper.raw_proxy().remove_child(raw_root, 5).unwrap_err();
    assert!(matches!(err, TreeError::IndexOutOfBounds { index: 5, len: 2 }));
}

// ============================================================
// Invalid structural input through the proxy
// ============================================================

#[rstest]
fn given_non_object_child_when_pushing_then_invalid_child_error(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let err = mapper.raw_proxy().push_child(raw_root, json!(42)).unwrap_err();
    assert!(matches!(err, TreeError::InvalidChild { index: 2, kind: "number" }));
}

#[rstest]
fn given_scalar_children_value_when_setting_field_then_invalid_children(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let err = mapper
        .raw_proxy()
        .set_field(raw_root, "items", json!("oops"))
        .unwrap_err();
    assert!(matches!(err, TreeError::InvalidChildren { kind: "string", .. }));
}

#[rstest]
fn given_invalid_nested_child_when_replacing_children_then_nothing_changes(mut mapper: TreeMapper) {
    let raw_root = mapper.raw_root();
    let before = mapper.export_raw();

    let err = mapper
        .raw_proxy()
        .set_field(raw_root, "items", json!([{"id": 1}, "scalar"]))
        .unwrap_err();
    assert!(matches!(err, TreeError::InvalidChild { index: 1, .. }));
    assert_eq!(mapper.export_raw(), before);
}
