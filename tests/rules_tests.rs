//! Rule catalogue tests
//!
//! Each bot is exercised through the registry with hand-built canonical
//! tables, the way the orchestrator calls it.

use audit_bots::config::RuleParameters;
use audit_bots::core::rules::{banking, order_to_cash, payroll, procurement};
use audit_bots::core::{Registry, RuleContext};
use audit_bots::mapping::canon::*;
use audit_bots::types::{Column, Table, Value};
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;

fn table(name: &str, columns: Vec<(&str, Vec<Value>)>) -> Table {
    let mut t = Table::new(name);
    for (column, values) in columns {
        t.add_column(Column::new(column, values));
    }
    t
}

fn t(s: &str) -> Value {
    Value::text(s)
}

fn n(x: f64) -> Value {
    Value::Number(x)
}

fn d(y: i32, m: u32, day: u32) -> Value {
    Value::Date(date(y, m, day))
}

fn date(y: i32, m: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn ctx_as_of(y: i32, m: u32, day: u32) -> RuleContext {
    RuleContext::new(RuleParameters {
        as_of: NaiveDate::from_ymd_opt(y, m, day),
        ..RuleParameters::default()
    })
}

fn evaluate(registry: &Registry, code: &str, inputs: &[&Table]) -> Table {
    registry
        .get(code)
        .unwrap_or_else(|| panic!("no rule {code}"))
        .evaluate(inputs, &ctx_as_of(2025, 3, 31))
        .unwrap()
}

fn texts(table: &Table, column: &str) -> Vec<String> {
    table
        .column(column)
        .unwrap()
        .values
        .iter()
        .map(|v| v.to_string())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// BANKING: CATEGORY + THRESHOLD FILTERS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_zero_or_null_roi_returns_first_row_only() {
    let loans = table(
        "Loan Dump",
        vec![
            (ASSET, vec![t("11"), t("11"), t("13")]),
            (INT_RATE, vec![t("0"), t("5"), t("0")]),
            ("ACCT", vec![t("A1"), t("A2"), t("A3")]),
        ],
    );
    let out = evaluate(&Registry::banking(), "zero_or_null_roi_loans", &[&loans]);
    assert_eq!(out.row_count(), 1);
    assert_eq!(texts(&out, "ACCT"), vec!["A1"]);
    assert_eq!(out.name, "zero_or_null_roi_loans");
}

#[test]
fn test_zero_roi_dash_placeholder_flagged_null_not() {
    let loans = table(
        "Loan Dump",
        vec![
            (ASSET, vec![t("12"), t("12"), t("12")]),
            (INT_RATE, vec![t("-"), Value::Null, t("0.00")]),
        ],
    );
    let out = banking::zero_or_null_roi_loans(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, INT_RATE), vec!["-", "0.00"]);
}

#[test]
fn test_standard_accounts_with_uri_zero() {
    let loans = table(
        "Loan Dump",
        vec![
            (ASSET, vec![t("11"), t("21"), t("12"), t("12")]),
            (URI, vec![n(0.0), n(0.0), n(3.0), Value::Null]),
        ],
    );
    let out = banking::standard_accounts_with_uri_zero(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, ASSET), vec!["11"]);
}

#[test]
fn test_negative_outstanding() {
    let loans = table("Loan Dump", vec![(AMT_OS, vec![n(-1.0), n(0.0), Value::Null, n(10.0)])]);
    let out = banking::negative_amt_outstanding(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(out.row_count(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BANKING: RATIO CHECKS
// ═══════════════════════════════════════════════════════════════════════════

fn npa(asset: &str, provision: Value, outstanding: Value) -> Table {
    table(
        "Loan Dump",
        vec![
            (CUST_CATEGORY, vec![t("NPA")]),
            (ASSET, vec![t(asset)]),
            (PROVISION, vec![provision]),
            (AMT_OS, vec![outstanding]),
        ],
    )
}

#[test]
fn test_substandard_provision_below_threshold_flagged() {
    let registry = Registry::banking();
    let code = "provision_verification_substandard_npa";
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(10.0), n(100.0))]).row_count(), 1);
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(20.0), n(100.0))]).row_count(), 0);
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(15.0), n(100.0))]).row_count(), 0);
}

#[test]
fn test_substandard_zero_or_null_denominator_excluded() {
    let registry = Registry::banking();
    let code = "provision_verification_substandard_npa";
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(10.0), n(0.0))]).row_count(), 0);
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(10.0), Value::Null)]).row_count(), 0);
    assert_eq!(evaluate(&registry, code, &[&npa("21", Value::Null, n(100.0))]).row_count(), 0);
}

#[test]
fn test_doubtful3_requires_full_provision() {
    let registry = Registry::banking();
    let code = "provision_verification_doubtful3_npa";
    assert_eq!(evaluate(&registry, code, &[&npa("31", n(100.0), n(100.0))]).row_count(), 0);
    assert_eq!(evaluate(&registry, code, &[&npa("32", n(90.0), n(100.0))]).row_count(), 1);
    assert_eq!(evaluate(&registry, code, &[&npa("33", Value::Null, n(100.0))]).row_count(), 1);
    assert_eq!(evaluate(&registry, code, &[&npa("21", n(90.0), n(100.0))]).row_count(), 0);
}

#[test]
fn test_overdrawn_standard_accounts() {
    let loans = table(
        "Loan Dump",
        vec![
            (AMT_OS, vec![n(111.0), n(110.0), n(50.0), Value::Null]),
            (DRAW_LMT, vec![n(100.0), n(100.0), n(100.0), n(100.0)]),
        ],
    );
    let out = banking::standard_accounts_overdue_details(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, AMT_OS), vec!["111"]);
}

#[test]
fn test_agri_sector_over_limit() {
    let loans = table(
        "Loan Dump",
        vec![
            (ASSET, vec![t("11"), t("11"), t("21")]),
            (SECTOR, vec![t("01.Agri"), t("01.Agri"), t("01.Agri")]),
            (AMT_OS, vec![n(135.0), n(134.0), n(500.0)]),
            (SANC_LMT, vec![n(100.0), n(100.0), n(100.0)]),
        ],
    );
    let out = banking::agri0_sector_over_limit(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, AMT_OS), vec!["135"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// BANKING: DATE WINDOWS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_restructured_within_window() {
    let loans = table(
        "Loan Dump",
        vec![
            (RESTRUCTURED_FLG, vec![t("Y"), t("Y"), t("N"), t("Y")]),
            (ASSET, vec![t("11"), t("11"), t("11"), t("12")]),
            (PROVISION, vec![n(1.0), n(1.0), n(1.0), n(1.0)]),
            (AMT_OS, vec![n(100.0), n(100.0), n(100.0), n(100.0)]),
            (RESTR_DATE, vec![d(2024, 6, 1), d(2022, 1, 1), d(2024, 6, 1), Value::Null]),
        ],
    );
    let out = banking::restructured_standard_accounts(&[&loans], &ctx_as_of(2025, 3, 31)).unwrap();
    assert_eq!(out.row_count(), 1);
    assert_eq!(out.column(RESTR_DATE).unwrap().get(0), &d(2024, 6, 1));
}

#[test]
fn test_npa_fb_overdue_window_inclusive() {
    let loans = table(
        "Loan Dump",
        vec![
            (FB_NFB_FLG, vec![t("FB"), t("FB"), t("NFB"), t("FB")]),
            // as_of 2025-03-31 minus 90 days = 2024-12-31
            (OUT_ORD_DT, vec![d(2024, 12, 31), d(2025, 1, 1), d(2024, 1, 1), Value::Null]),
        ],
    );
    let out = banking::npa_fb_accounts_overdue(&[&loans], &ctx_as_of(2025, 3, 31)).unwrap();
    assert_eq!(out.row_count(), 1);
    assert_eq!(out.column(OUT_ORD_DT).unwrap().get(0), &d(2024, 12, 31));
}

// ═══════════════════════════════════════════════════════════════════════════
// BANKING: INTEREST STEP, MODE DEVIATION, MEMBERSHIP
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_odd_interest_excludes_nulls() {
    let loans = table(
        "Loan Dump",
        vec![
            (ASSET, vec![t("11"), t("11"), t("11"), t("21")]),
            (INT_RATE, vec![t("7.25"), t("7.33"), Value::Null, t("7.33")]),
        ],
    );
    let out = banking::standard_accounts_with_odd_interest(&[&loans], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, INT_RATE), vec!["7.33"]);
}

#[test]
fn test_mode_deviation_flags_minority_code() {
    let loans = table(
        "Loan Dump",
        vec![
            (FACILITYCD, vec![t("F1"), t("F1"), t("F1"), t("F2"), t("F2")]),
            (SCHEME_CD, vec![t("A"), t("A"), t("B"), t("C"), t("C")]),
            ("ROW", vec![n(1.0), n(2.0), n(3.0), n(4.0), n(5.0)]),
        ],
    );
    let out = evaluate(&Registry::banking(), "misaligned_scheme_for_facilities", &[&loans]);
    assert_eq!(texts(&out, "ROW"), vec!["3"]);
    assert_eq!(texts(&out, SCHEME_CD), vec!["B"]);
}

#[test]
fn test_mode_deviation_groups_rows_without_facility() {
    let loans = table(
        "Loan Dump",
        vec![
            (FACILITYCD, vec![Value::Null, t(" "), Value::Null, t("F1")]),
            (SCHEME_CD, vec![t("A"), t("A"), t("B"), t("B")]),
            ("ROW", vec![n(1.0), n(2.0), n(3.0), n(4.0)]),
        ],
    );
    let out = evaluate(&Registry::banking(), "misaligned_scheme_for_facilities", &[&loans]);
    assert_eq!(texts(&out, "ROW"), vec!["3"]);
}

#[test]
fn test_blacklisted_pin_membership() {
    let loans = table("Loan Dump", vec![(PIN_CODE, vec![t("500001"), t("500002")])]);
    let blacklist = table("Blacklisted PIN CODE", vec![(PIN_CODE, vec![t(" 500002 ")])]);
    let out = evaluate(&Registry::banking(), "blacklisted_pin_code_loans", &[&loans, &blacklist]);
    assert_eq!(texts(&out, PIN_CODE), vec!["500002"]);
}

#[test]
fn test_blacklisted_pin_numeric_cells_match_text() {
    let loans = table("Loan Dump", vec![(PIN_CODE, vec![n(500002.0), t("500003")])]);
    let blacklist = table("Blacklisted PIN CODE", vec![(PIN_CODE, vec![t("500002")])]);
    let out = banking::blacklisted_pin_code_loans(&[&loans, &blacklist], &RuleContext::default()).unwrap();
    assert_eq!(out.row_count(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BANKING: TWO-SNAPSHOT RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════

fn loan_book(keys: &[&str], outstanding: &[f64], class: &[&str]) -> Table {
    table(
        "Loan Book",
        vec![
            (PROJECT_NO, keys.iter().map(|k| t(k)).collect()),
            (LOAN_OUTSTANDING, outstanding.iter().map(|x| n(*x)).collect()),
            (ASSET_CLASSIFICATION, class.iter().map(|c| t(c)).collect()),
        ],
    )
}

#[test]
fn test_reconciliation_blanks_unchanged_rows() {
    let base = loan_book(&["P1", "P2", "P3"], &[100.0, 100.0, 50.0], &["Standard", "Standard", "SMA"]);
    let comparison = loan_book(&["P1", "P2"], &[100.0, 90.0], &["Standard", "Standard"]);
    let out = evaluate(&Registry::banking(), "blank_asset_classification", &[&base, &comparison]);

    assert_eq!(
        out.column_names(),
        vec![
            "PROJECT_NO",
            "LOAN_OUTSTANDING_Base",
            "ASSET_CLASSIFICATION_Base",
            "LOAN_OUTSTANDING_Comparison",
            "ASSET_CLASSIFICATION_Comparison",
            "Difference",
        ]
    );
    // P3 has no comparison row: inner join drops it
    assert_eq!(texts(&out, PROJECT_NO), vec!["P1", "P2"]);
    assert_eq!(texts(&out, "ASSET_CLASSIFICATION_Base"), vec!["", "Standard"]);
    assert_eq!(texts(&out, "ASSET_CLASSIFICATION_Comparison"), vec!["", "Standard"]);
    assert_eq!(texts(&out, "Difference"), vec!["0", "10"]);
}

#[test]
fn test_reconciliation_keeps_changed_classification() {
    let base = loan_book(&["P1"], &[100.0], &["Standard"]);
    let comparison = loan_book(&["P1"], &[100.0], &["SMA-1"]);
    let out = banking::blank_asset_classification(&[&base, &comparison], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, "ASSET_CLASSIFICATION_Base"), vec!["Standard"]);
    assert_eq!(texts(&out, "ASSET_CLASSIFICATION_Comparison"), vec!["SMA-1"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// PURITY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_rules_are_pure() {
    let loans = table(
        "Loan Dump",
        vec![
            (FACILITYCD, vec![t("F1"), t("F1"), t("F1")]),
            (SCHEME_CD, vec![t("A"), t("A"), t("B")]),
            (ASSET, vec![t("11"), t("11"), t("13")]),
            (INT_RATE, vec![t("0"), t("7.33"), t("0")]),
        ],
    );
    let before = loans.clone();
    let registry = Registry::banking();
    for code in ["misaligned_scheme_for_facilities", "zero_or_null_roi_loans", "standard_accounts_with_odd_interest"] {
        let first = evaluate(&registry, code, &[&loans]);
        let second = evaluate(&registry, code, &[&loans]);
        assert_eq!(first, second, "{code} is not deterministic");
    }
    assert_eq!(loans, before);
}

#[test]
fn test_missing_canonical_column_is_an_error() {
    let loans = table("Loan Dump", vec![(ASSET, vec![t("11")])]);
    let err = banking::zero_or_null_roi_loans(&[&loans], &RuleContext::default()).unwrap_err();
    assert!(err.to_string().contains(INT_RATE));
}

// ═══════════════════════════════════════════════════════════════════════════
// PROCURE TO PAY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_vendor_kyc_notes() {
    let vendors = table(
        "Vendor Master",
        vec![
            (VENDOR_NAME, vec![t("Acme"), t("Bolt"), t("Cog")]),
            (PAN_NO, vec![t("ABCDE1234F"), t("BAD"), Value::Null]),
            (GST_NO, vec![t("27ABCDE1234F1Z5"), t("27ABCDE1234F1Z5"), t("27ABCDE1234F1Z5")]),
            (BANK_ACCOUNT, vec![t("001"), t("002"), Value::Null]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "P2P1", &[&vendors]);
    assert_eq!(texts(&out, VENDOR_NAME), vec!["Bolt", "Cog"]);
    assert_eq!(texts(&out, procurement::PAN_EXCEPTION), vec!["Invalid", "Missing"]);
    assert_eq!(texts(&out, procurement::GST_EXCEPTION), vec!["", ""]);
    assert_eq!(texts(&out, procurement::BANK_EXCEPTION), vec!["", "Missing"]);
}

#[test]
fn test_po_grn_invoice_mismatch() {
    let sample = table(
        "P2P Sample",
        vec![
            (PO_NO, vec![t("PO1"), t("PO1"), t("PO2")]),
            (PO_QTY, vec![n(10.0), n(10.0), n(5.0)]),
            (PO_AMT, vec![n(1000.0), n(1000.0), n(9000.0)]),
            (GRN_QTY, vec![n(4.0), n(6.0), n(5.0)]),
            (INVOICE_QTY, vec![n(4.0), n(6.0), n(5.0)]),
            (INVOICE_AMOUNT, vec![n(400.0), n(600.0), n(5000.0)]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "P2P2", &[&sample]);
    assert_eq!(texts(&out, PO_NO), vec!["PO2"]);
    assert_eq!(texts(&out, procurement::QTY_EXCEPTION), vec![""]);
    assert_eq!(texts(&out, procurement::AMT_EXCEPTION), vec!["Amount Mismatch"]);
    assert_eq!(texts(&out, procurement::FINANCIAL_IMPACT), vec!["4000"]);
}

#[test]
fn test_post_invoice_pos() {
    let sample = table(
        "P2P Sample",
        vec![
            (PO_NO, vec![t("PO1"), t("PO2"), t("PO3")]),
            (PO_DATE, vec![d(2025, 2, 10), d(2025, 1, 1), Value::Null]),
            (INVOICE_DATE, vec![d(2025, 2, 1), d(2025, 1, 5), d(2025, 1, 5)]),
        ],
    );
    let out = procurement::post_invoice_pos(&[&sample], &RuleContext::default()).unwrap();
    assert_eq!(&out.column_names()[..3], &[PO_DATE, INVOICE_DATE, PO_NO]);
    assert_eq!(texts(&out, PO_NO), vec!["PO1"]);
}

#[test]
fn test_split_orders_grouped_over_threshold() {
    let sample = table(
        "P2P Sample",
        vec![
            (VENDOR_NAME, vec![t("Acme"), t("Acme"), t("Acme"), t("Bolt")]),
            (ITEM_CODE, vec![t("I1"), t("I1"), t("I2"), t("I1")]),
            (PO_DATE, vec![d(2025, 1, 1), d(2025, 1, 1), d(2025, 1, 1), d(2025, 1, 1)]),
            (PO_NO, vec![t("PO2"), t("PO1"), t("PO3"), t("PO4")]),
            (INVOICE_AMOUNT, vec![n(6000.0), n(5000.0), n(20000.0), n(20000.0)]),
        ],
    );
    let out = procurement::split_orders(&[&sample], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, procurement::SPLIT_GROUP), vec!["Group_1", "Group_1"]);
    assert_eq!(texts(&out, PO_NO), vec!["PO1", "PO2"]);
    assert_eq!(texts(&out, procurement::GROUP_TOTAL_INVOICE), vec!["11000", "11000"]);
}

#[test]
fn test_duplicate_vendor_pairs() {
    let vendors = table(
        "Vendor Master",
        vec![
            (VENDOR_NAME, vec![t("Acme"), t("ACME Ltd"), t("Cog")]),
            (PAN_NO, vec![t("ABCDE1234F"), t("ABCDE1234F"), t("ZZZZZ9999Z")]),
            (GST_NO, vec![Value::Null, Value::Null, Value::Null]),
            (BANK_ACCOUNT, vec![t("001"), t("001"), t("003")]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "P2P5", &[&vendors]);
    assert_eq!(out.row_count(), 1);
    assert_eq!(texts(&out, "Row_A"), vec!["1"]);
    assert_eq!(texts(&out, "Row_B"), vec!["2"]);
    assert_eq!(texts(&out, "Exception_Noted"), vec!["Bank Account Match, PAN Match"]);
    assert_eq!(texts(&out, "B_Vendor_Name"), vec!["ACME Ltd"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// ORDER TO CASH
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_overdue_delivery_label_and_gap() {
    let sample = table(
        "O2C Sample",
        vec![
            (SO_DATE, vec![d(2025, 1, 1), d(2025, 1, 1)]),
            (DELIVERY_DATE, vec![d(2025, 1, 6), d(2025, 1, 9)]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "O2C1", &[&sample]);
    let label = order_to_cash::overdue_label(5);
    assert_eq!(out.column_names()[0], label.as_str());
    assert_eq!(texts(&out, order_to_cash::DATE_DIFF), vec!["8"]);
}

#[test]
fn test_dispatch_without_invoice() {
    let sample = table(
        "O2C Sample",
        vec![
            (DELIVERY_NO, vec![t("D1"), t("D2"), Value::Null]),
            (INVOICE_NO, vec![t("INV1"), t("  "), Value::Null]),
        ],
    );
    let out = order_to_cash::dispatch_without_invoice(&[&sample], &RuleContext::default()).unwrap();
    assert_eq!(texts(&out, DELIVERY_NO), vec!["D2"]);
}

#[test]
fn test_missing_customer_data_note() {
    let customers = table(
        "Customer Master",
        vec![
            (GST_NO, vec![Value::Null, t("27ABCDE1234F1Z5")]),
            (PAN_NO, vec![Value::Null, t("ABCDE1234F")]),
            (CREDIT_LIMIT, vec![n(100.0), n(100.0)]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "O2C3", &[&customers]);
    assert_eq!(texts(&out, order_to_cash::EXCEPTION_NOTED), vec!["GST_No + PAN_No Missing"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// HIRE TO RETIRE
// ═══════════════════════════════════════════════════════════════════════════

fn employees() -> Table {
    table(
        "Employee Master",
        vec![
            (EMPLOYEE_ID, vec![t("E1"), t("E2")]),
            (EMPLOYEE_NAME, vec![t("Asha"), t("Ravi")]),
            (EXIT_DATE, vec![Value::Null, d(2025, 1, 2)]),
            (STATUS, vec![t("Active"), t("Exited")]),
        ],
    )
}

fn attendance() -> Table {
    table(
        "Attendance Register",
        vec![
            (EMPLOYEE_ID, vec![t("E1"), t("E2"), t("E9"), t("E8")]),
            (EMPLOYEE_NAME, vec![t("Asha"), t("Ravi"), t("Ghost"), t("Absent")]),
            (MONTH, vec![t("Jan 2025"), t("Jan 2025"), t("Jan 2025"), t("Jan 2025")]),
            ("D1", vec![t("P"), t("P"), t("P"), t("A")]),
            ("D2", vec![t("P"), t("P"), Value::Null, t("A")]),
            ("D3", vec![t("P"), t("P"), t("P"), Value::Null]),
            ("D4", vec![t("P"), t("A"), t("P"), t("A")]),
            ("D5", vec![t("P"), t("L"), t("A"), t("A")]),
        ],
    )
}

#[test]
fn test_ghost_employees_counted_from_day_columns() {
    let out = evaluate(&Registry::enterprise(), "H2R1", &[&employees(), &attendance()]);
    assert_eq!(&out.column_names()[..2], &[EMPLOYEE_ID, payroll::PRESENT_DAYS]);
    assert_eq!(texts(&out, EMPLOYEE_ID), vec!["E9"]);
    assert_eq!(texts(&out, payroll::PRESENT_DAYS), vec!["3"]);
}

#[test]
fn test_ghost_employees_prefer_present_days_total() {
    let mut register = attendance();
    register.add_column(Column::new(
        payroll::PRESENT_DAYS,
        vec![n(20.0), n(18.0), Value::Null, n(2.0)],
    ));
    let out = evaluate(&Registry::enterprise(), "H2R1", &[&employees(), &register]);
    // E9 has no total and falls back to its day marks; E8's total wins over its absences
    assert_eq!(texts(&out, EMPLOYEE_ID), vec!["E9", "E8"]);
    assert_eq!(texts(&out, payroll::PRESENT_DAYS), vec!["3", "2"]);
}

#[test]
fn test_ghost_employees_from_present_days_without_day_columns() {
    let register = table(
        "Attendance Register",
        vec![
            (EMPLOYEE_ID, vec![t("E1"), t("E7"), t("E8")]),
            (EMPLOYEE_NAME, vec![t("Asha"), t("New"), t("Idle")]),
            (MONTH, vec![t("Jan 2025"), t("Jan 2025"), t("Jan 2025")]),
            (payroll::PRESENT_DAYS, vec![n(22.0), n(4.0), n(0.0)]),
        ],
    );
    let out = evaluate(&Registry::enterprise(), "H2R1", &[&employees(), &register]);
    assert_eq!(texts(&out, EMPLOYEE_ID), vec!["E7"]);
    assert_eq!(texts(&out, payroll::PRESENT_DAYS), vec!["4"]);
}

#[test]
fn test_attendance_after_exit() {
    let out = evaluate(&Registry::enterprise(), "H2R2", &[&employees(), &attendance()]);
    assert_eq!(
        out.column_names(),
        vec![EMPLOYEE_ID, EMPLOYEE_NAME, MONTH, EXIT_DATE, "Date", "Status"]
    );
    // E2 left on 2 Jan: present on D3, leave on D5; absent on D4
    assert_eq!(texts(&out, EMPLOYEE_ID), vec!["E2", "E2"]);
    assert_eq!(texts(&out, "Date"), vec!["2025-01-03", "2025-01-05"]);
    assert_eq!(texts(&out, "Status"), vec!["P", "L"]);
}

#[test]
fn test_attendance_after_exit_unparseable_month_fails() {
    let mut register = attendance();
    register.add_column(Column::new(MONTH, vec![t("soon"); 4]));
    let result = payroll::attendance_after_exit(&[&employees(), &register], &RuleContext::default());
    assert!(result.is_err());
}

#[test]
fn test_attendance_without_day_columns_is_empty() {
    let register = table(
        "Attendance Register",
        vec![
            (EMPLOYEE_ID, vec![t("E2")]),
            (EMPLOYEE_NAME, vec![t("Ravi")]),
            (MONTH, vec![t("2025-01")]),
        ],
    );
    let out = payroll::attendance_after_exit(&[&employees(), &register], &RuleContext::default()).unwrap();
    assert!(out.is_empty());
    assert_eq!(out.columns.len(), 6);
}
