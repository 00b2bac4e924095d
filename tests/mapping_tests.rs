//! Mapping resolution tests: auto-matching, injectivity, schema declarations

use audit_bots::mapping::{
    auto_match, is_supported_workbook_name, tables, Blocker, CategorySchema, FieldKind, FieldSpec,
    NameMatch, Readiness, Schema, SheetSchema, SlotMapping, TableKey,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// AUTO-MATCHING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sheet_names_ignore_case_and_whitespace() {
    let matched = auto_match(
        &strings(&["Loan Dump"]),
        &strings(&["Summary", "LOAN  DUMP"]),
        NameMatch::Sheet,
    );
    assert_eq!(matched["Loan Dump"], "LOAN  DUMP");
}

#[test]
fn test_field_names_ignore_punctuation() {
    let matched = auto_match(
        &strings(&["LOAN OUTSTANDING (Rs.)", "PROJECT NO"]),
        &strings(&["Project_No", "Loan Outstanding Rs", "Remarks"]),
        NameMatch::Field,
    );
    assert_eq!(matched["LOAN OUTSTANDING (Rs.)"], "Loan Outstanding Rs");
    assert_eq!(matched["PROJECT NO"], "Project_No");
}

#[test]
fn test_ambiguous_match_stays_unresolved() {
    let matched = auto_match(
        &strings(&["PIN CODE"]),
        &strings(&["Pin Code", "PIN_CODE"]),
        NameMatch::Field,
    );
    assert_eq!(matched["PIN CODE"], "");
}

// ═══════════════════════════════════════════════════════════════════════════
// SLOT MAPPING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_single_candidate_fills_every_slot() {
    let mut mapping = SlotMapping::for_sheets(
        "Loan Book",
        strings(&["Base", "Comparison", "Extra"]),
        strings(&["Sheet1"]),
    );
    mapping.bootstrap(None);
    assert!(mapping.is_ready());
    assert!(mapping.pairs().all(|(_, v)| v == "Sheet1"));
}

#[test]
fn test_assignment_keeps_mapping_injective() {
    let mut mapping = SlotMapping::for_fields(
        "Banking / Loan Dump",
        strings(&["ASSET", "INT_RATE", "URI"]),
        strings(&["ASSET", "INT_RATE", "URI", "Other"]),
    );
    mapping.bootstrap(None);
    assert!(mapping.is_ready());

    let cleared = mapping.assign("URI", "ASSET").unwrap();
    assert_eq!(cleared, vec!["ASSET".to_string()]);
    assert_eq!(mapping.get("URI"), Some("ASSET"));
    assert_eq!(mapping.get("ASSET"), None);
    assert_eq!(mapping.unresolved(), vec!["ASSET"]);

    for (slot, value) in [("ASSET", "URI"), ("INT_RATE", "URI"), ("URI", "Other"), ("ASSET", "Other")] {
        mapping.assign(slot, value).unwrap();
        let chosen: Vec<&str> = mapping.pairs().map(|(_, v)| v).filter(|v| !v.is_empty()).collect();
        let distinct: BTreeSet<&str> = chosen.iter().copied().collect();
        assert_eq!(chosen.len(), distinct.len(), "duplicate after {slot} -> {value}");
    }
}

#[test]
fn test_assign_rejects_unknown_slot_and_value() {
    let mut mapping = SlotMapping::for_fields("scope", strings(&["A"]), strings(&["x", "y"]));
    assert!(mapping.assign("B", "x").is_err());
    assert!(mapping.assign("A", "z").is_err());
    assert!(mapping.assign("A", "").unwrap().is_empty());
}

#[test]
fn test_bootstrap_restores_previous_selections() {
    let mut mapping = SlotMapping::for_fields("scope", strings(&["A", "B"]), strings(&["x", "y"]));
    mapping.bootstrap(None);
    assert_eq!(mapping.unresolved(), vec!["A", "B"]);

    mapping.assign("A", "y").unwrap();
    let saved = mapping.selections();

    let mut restored = SlotMapping::for_fields("scope", strings(&["A", "B"]), strings(&["x", "y"]));
    restored.bootstrap(Some(&saved));
    assert_eq!(restored.get("A"), Some("y"));
    assert_eq!(restored.get("B"), None);

    // a saved choice that is no longer offered is dropped
    let mut shrunk = SlotMapping::for_fields("scope", strings(&["A", "B"]), strings(&["x", "z"]));
    shrunk.bootstrap(Some(&saved));
    assert_eq!(shrunk.get("A"), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_banking_schema_shape() {
    let schema = Schema::banking();
    assert_eq!(schema.categories().len(), 4);
    let book = schema.category(tables::LOAN_BOOK_COMPARISON.category).unwrap();
    assert_eq!(book.header_row, 2);
    assert_eq!(
        schema.sheet(tables::LOAN_BOOK_BASE.category, tables::LOAN_BOOK_BASE.sheet)
            .unwrap()
            .required_fields(),
        strings(&["PROJECT NO", "LOAN OUTSTANDING (Rs.)", "Asset classification"])
    );
}

#[test]
fn test_conditional_field_follows_trigger_upload() {
    let mut schema = Schema::banking();
    let dump = || {
        schema
            .sheet(tables::LOAN_DUMP.category, tables::LOAN_DUMP.sheet)
            .unwrap()
            .required_fields()
    };
    assert!(!dump().contains(&"PIN CODE".to_string()));

    let uploaded: BTreeSet<String> = [tables::PIN_BLACKLIST.category.to_string()].into();
    let changed = schema.apply_conditional_fields(&uploaded);
    assert_eq!(changed, vec![tables::LOAN_DUMP.key()]);
    assert!(schema
        .sheet(tables::LOAN_DUMP.category, tables::LOAN_DUMP.sheet)
        .unwrap()
        .required_fields()
        .contains(&"PIN CODE".to_string()));

    assert!(schema.apply_conditional_fields(&uploaded).is_empty());
}

#[test]
fn test_enterprise_categories_share_master() {
    let schema = Schema::enterprise();
    for category in schema.categories() {
        assert_eq!(category.fallback_source.as_deref(), Some("MASTER"));
    }
    assert!(schema.table_keys().contains(&TableKey::new("H2R", "Attendance Register")));
}

#[test]
fn test_schema_rejects_duplicate_sheets() {
    let sheet = || SheetSchema::new("S", vec![FieldSpec::new("A", "A", FieldKind::Text)]);
    let result = Schema::new("bad", vec![CategorySchema::new("C", "C", 0, vec![sheet(), sheet()])], Vec::new());
    assert!(result.is_err());
    assert!(Schema::new("empty", Vec::new(), Vec::new()).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// READINESS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_readiness_messages() {
    let blocked = Readiness::from(Blocker::Unresolved(strings(&["ASSET", "URI"])));
    assert!(!blocked.is_ready());
    assert_eq!(blocked.blocker().unwrap().to_string(), "Unmapped: ASSET, URI");
    assert_eq!(
        Blocker::InsufficientSheets { found: 1, required: 2 }.to_string(),
        "Workbook has fewer sheets than required (1 found, 2 required)"
    );
    assert!(Readiness::Ready.blocker().is_none());
}

#[test]
fn test_supported_workbook_names() {
    assert!(is_supported_workbook_name("dump.XLSX"));
    assert!(is_supported_workbook_name("legacy.xls"));
    assert!(is_supported_workbook_name(""));
    assert!(!is_supported_workbook_name("notes.csv"));
}
