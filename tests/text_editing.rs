//! Text edits and JSON patches, directly and through the store

use crudearch::text::{self, char_len, remove_column, remove_columns, truncate_row};
use crudearch::{ArchiveError, EntryStore, Result};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn prop_insert_then_truncate_is_identity(
        original in "[a-zé日\\n\\r ]{0,40}",
        inserted in "[A-Z語\\n]{0,10}",
        at in 0usize..64
    ) {
        let i = at.min(char_len(&original));
        let edited = text::insert_at_index(&original, &inserted, i).unwrap();
        let restored = truncate_row(&edited, i, i + char_len(&inserted)).unwrap();
        prop_assert_eq!(restored, original);
    }

    #[test]
    fn prop_disjoint_column_ranges_commute(
        original in "[a-z]{0,12}(\n[a-z]{0,12}){0,5}",
        a in (0usize..4, 0usize..3),
        b in (6usize..12, 0usize..3)
    ) {
        let first = (a.0, a.0 + a.1);
        let second = (b.0, b.0 + b.1);
        let forward = remove_columns(&original, &[first, second]).unwrap();
        let backward = remove_columns(&original, &[second, first]).unwrap();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_remove_column_past_line_end_is_noop(
        line in "[a-z]{0,8}",
        start in 8usize..20,
        width in 0usize..5
    ) {
        let result = remove_column(&line, start, start + width).unwrap();
        prop_assert_eq!(result, line);
    }
}

#[test]
fn test_store_edits_compose() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_text("poem.txt", "roses are red\nviolets are blue", "utf-8")?;

    store.insert_text_at_position("poem.txt", "deep ", 1, 0)?;
    store.prepend_text("poem.txt", "# Poem\n")?;
    store.append_text("poem.txt", "\n")?;
    store.replace_text("poem.txt", "are", "look")?;
    assert_eq!(
        store.get_text("poem.txt")?,
        "# Poem\nroses look red\ndeep violets look blue\n"
    );

    store.remove_row_range("poem.txt", 1, 0, 6)?;
    store.truncate_text("poem.txt", 0, 7)?;
    assert_eq!(store.get_text("poem.txt")?, "look red\ndeep violets look blue\n");

    store.remove_text_column("poem.txt", 0, 5)?;
    assert_eq!(store.get_text("poem.txt")?, "red\nviolets look blue\n");
    Ok(())
}

#[test]
fn test_store_column_ranges() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_text("table.csv", "a,b,c\nd,e,f", "utf-8")?;
    store.remove_text_columns("table.csv", &[(4, 5), (0, 2)])?;
    assert_eq!(store.get_text("table.csv")?, "b,\ne,");
    Ok(())
}

#[test]
fn test_store_edit_errors() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_text("short.txt", "ab\ncd", "utf-8")?;

    assert!(matches!(
        store.insert_text_at_position("short.txt", "x", 5, 0),
        Err(ArchiveError::Index(_))
    ));
    assert!(matches!(
        store.truncate_text("short.txt", 3, 1),
        Err(ArchiveError::Index(_))
    ));
    assert!(matches!(
        store.remove_row_range("short.txt", 0, 3, 4),
        Err(ArchiveError::Index(_))
    ));
    assert!(matches!(
        store.append_text("missing.txt", "x"),
        Err(ArchiveError::NotFound(_))
    ));
    assert_eq!(store.get_text("short.txt")?, "ab\ncd");
    Ok(())
}

#[test]
fn test_utf16_entry_edits() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_text("wide.txt", "hi", "utf-16le")?;
    assert_eq!(store.get("wide.txt")?, &[b'h', 0, b'i', 0]);

    store.insert_text_at_index("wide.txt", "!", 2)?;
    assert_eq!(store.get("wide.txt")?, &[b'h', 0, b'i', 0, b'!', 0]);
    assert_eq!(store.get_as_text("wide.txt", "utf-16le")?, "hi!");
    Ok(())
}

#[test]
fn test_json_patch_through_store() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_file("doc.json", br#"{"a":1,"b":2}"#.to_vec())?;
    store.update_json_value("doc.json", "b", json!(3))?;
    assert_eq!(store.get_json("doc.json")?, json!({"a": 1, "b": 3}));

    store.update_json_value("doc.json", "nested", json!({"k": [true, null]}))?;
    assert_eq!(store.get_json("doc.json")?["nested"]["k"][0], json!(true));
    Ok(())
}

#[test]
fn test_json_patch_errors_leave_entry() -> Result<()> {
    let mut store = EntryStore::create();
    store.add_file("list.json", b"[1,2,3]".to_vec())?;
    store.add_file("broken.json", b"{\"a\":".to_vec())?;

    assert!(matches!(
        store.update_json_value("list.json", "a", json!(1)),
        Err(ArchiveError::TypeMismatch(_))
    ));
    assert!(matches!(
        store.update_json_value("broken.json", "a", json!(1)),
        Err(ArchiveError::Json(_))
    ));
    assert_eq!(store.get("list.json")?, b"[1,2,3]");
    Ok(())
}

#[test]
fn test_configured_indent() -> Result<()> {
    let mut store = EntryStore::create();
    store.config_mut().json_indent = 4;
    store.add_json("cfg.json", &json!({"k": 1}))?;
    assert_eq!(store.get_text("cfg.json")?, "{\n    \"k\": 1\n}");
    Ok(())
}
