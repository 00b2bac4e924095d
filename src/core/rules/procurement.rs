//! Procure-to-pay checks over the P2P sample and the vendor master

use super::{approx_eq, input, CatalogRule, RuleContext};
use crate::error::{AuditError, AuditResult};
use crate::mapping::canon::*;
use crate::mapping::{tables, TableRef};
use crate::types::{Column, Table, Value};
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub const GROUP: &str = "P2P";

pub const PAN_EXCEPTION: &str = "PAN_Exception_Noted";
pub const GST_EXCEPTION: &str = "GST_Exception_Noted";
pub const BANK_EXCEPTION: &str = "Bank_Exception_Noted";

pub const QTY_EXCEPTION: &str = "Exception Noted (Qty)";
pub const AMT_EXCEPTION: &str = "Exception Noted (Amt)";
pub const FINANCIAL_IMPACT: &str = "Financial_Impact";
pub const GRN_QTY_SUM: &str = "GRN_Qty_Sum";
pub const INVOICE_QTY_SUM: &str = "Invoice_Qty_Sum";
pub const INVOICE_AMOUNT_SUM: &str = "Invoice_Amount_Sum";

pub const SPLIT_GROUP: &str = "Group";
pub const GROUP_TOTAL_INVOICE: &str = "Group_Total_Invoice";

const SAMPLE: &[TableRef] = &[tables::P2P_SAMPLE];
const VENDORS: &[TableRef] = &[tables::VENDOR_MASTER];

pub fn catalogue() -> Vec<CatalogRule> {
    vec![
        CatalogRule {
            code: "P2P1",
            title: "Validate Vendor KYC",
            group: GROUP,
            inputs: VENDORS,
            eval: validate_vendor_kyc,
        },
        CatalogRule {
            code: "P2P2",
            title: "PO-GRN-Invoice Match",
            group: GROUP,
            inputs: SAMPLE,
            eval: po_grn_invoice_mismatches,
        },
        CatalogRule {
            code: "P2P3",
            title: "Post-Invoice POs",
            group: GROUP,
            inputs: SAMPLE,
            eval: post_invoice_pos,
        },
        CatalogRule {
            code: "P2P4",
            title: "Split Orders",
            group: GROUP,
            inputs: SAMPLE,
            eval: split_orders,
        },
        CatalogRule {
            code: "P2P5",
            title: "Duplicate Vendors",
            group: GROUP,
            inputs: VENDORS,
            eval: duplicate_vendors,
        },
    ]
}

const PAN_PATTERN: &str = r"^[A-Z]{5}[0-9]{4}[A-Z]$";
const GST_PATTERN: &str = r"^(0[1-9]|1[0-9]|2[0-9]|3[0-7])[A-Z]{5}[0-9]{4}[A-Z][0-9]Z[0-9A-Z]$";

fn compile(code: &str, pattern: &str) -> AuditResult<Regex> {
    Regex::new(pattern).map_err(|e| AuditError::rule(code, format!("Regex error: {}", e)))
}

/// "" when the id is fine, otherwise "Missing" or "Invalid"
fn id_exception(value: &Value, pattern: &Regex) -> &'static str {
    match value.key() {
        None => "Missing",
        Some(id) if !pattern.is_match(&id.to_uppercase()) => "Invalid",
        Some(_) => "",
    }
}

/// Vendors with a missing or malformed PAN or GST number, or no bank account
pub fn validate_vendor_kyc(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let vendors = input(inputs, 0, "P2P1")?;
    let pan = vendors.require(PAN_NO)?;
    let gst = vendors.require(GST_NO)?;
    let bank = vendors.require(BANK_ACCOUNT)?;
    let pan_pattern = compile("P2P1", PAN_PATTERN)?;
    let gst_pattern = compile("P2P1", GST_PATTERN)?;

    let mut rows = Vec::new();
    let (mut pan_notes, mut gst_notes, mut bank_notes) = (Vec::new(), Vec::new(), Vec::new());
    for r in 0..vendors.row_count() {
        let pan_note = id_exception(pan.get(r), &pan_pattern);
        let gst_note = id_exception(gst.get(r), &gst_pattern);
        let bank_note = if bank.get(r).key().is_none() { "Missing" } else { "" };
        if pan_note.is_empty() && gst_note.is_empty() && bank_note.is_empty() {
            continue;
        }
        rows.push(r);
        pan_notes.push(Value::text(pan_note));
        gst_notes.push(Value::text(gst_note));
        bank_notes.push(Value::text(bank_note));
    }

    let mut out = vendors.take_rows(&rows);
    out.add_column(Column::new(PAN_EXCEPTION, pan_notes));
    out.add_column(Column::new(GST_EXCEPTION, gst_notes));
    out.add_column(Column::new(BANK_EXCEPTION, bank_notes));
    Ok(out)
}

struct PoTotals {
    po_qty: Option<f64>,
    po_amt: Option<f64>,
    grn_qty: f64,
    invoice_qty: f64,
    invoice_amount: f64,
}

/// Per purchase order: quantity ordered vs received vs invoiced, and PO
/// amount vs invoiced amount beyond the tolerance. Every line of a
/// mismatched PO is reported with the PO-level totals.
pub fn po_grn_invoice_mismatches(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let sample = input(inputs, 0, "P2P2")?;
    let po_no = sample.require(PO_NO)?;
    let po_qty = sample.require(PO_QTY)?;
    let po_amt = sample.require(PO_AMT)?;
    let grn_qty = sample.require(GRN_QTY)?;
    let invoice_qty = sample.require(INVOICE_QTY)?;
    let invoice_amount = sample.require(INVOICE_AMOUNT)?;
    let tolerance = ctx.params.amount_tolerance;

    let mut totals: HashMap<String, PoTotals> = HashMap::new();
    for r in 0..sample.row_count() {
        let Some(po) = po_no.get(r).key() else {
            continue;
        };
        let entry = totals.entry(po).or_insert(PoTotals {
            po_qty: None,
            po_amt: None,
            grn_qty: 0.0,
            invoice_qty: 0.0,
            invoice_amount: 0.0,
        });
        entry.po_qty = entry.po_qty.or(po_qty.get(r).as_number());
        entry.po_amt = entry.po_amt.or(po_amt.get(r).as_number());
        entry.grn_qty += grn_qty.get(r).as_number().unwrap_or(0.0);
        entry.invoice_qty += invoice_qty.get(r).as_number().unwrap_or(0.0);
        entry.invoice_amount += invoice_amount.get(r).as_number().unwrap_or(0.0);
    }

    let mut notes: HashMap<&str, (&'static str, &'static str)> = HashMap::new();
    for (po, t) in &totals {
        let qty_ok = t
            .po_qty
            .is_some_and(|q| approx_eq(q, t.grn_qty) && approx_eq(q, t.invoice_qty));
        let amt_ok = t
            .po_amt
            .map_or(true, |a| (a - t.invoice_amount).abs() <= tolerance);
        if !qty_ok || !amt_ok {
            notes.insert(
                po.as_str(),
                (
                    if qty_ok { "" } else { "Quantity Mismatch" },
                    if amt_ok { "" } else { "Amount Mismatch" },
                ),
            );
        }
    }

    let rows: Vec<usize> = (0..sample.row_count())
        .filter(|&r| po_no.get(r).key().is_some_and(|po| notes.contains_key(po.as_str())))
        .collect();

    let mut out = sample.take_rows(&rows);
    let (mut qty_notes, mut amt_notes, mut impact) = (Vec::new(), Vec::new(), Vec::new());
    let (mut grn_sums, mut qty_sums, mut amt_sums) = (Vec::new(), Vec::new(), Vec::new());
    for &r in &rows {
        let Some(po) = po_no.get(r).key() else {
            continue;
        };
        let (Some(t), Some((qty_note, amt_note))) = (totals.get(&po), notes.get(po.as_str())) else {
            continue;
        };
        qty_notes.push(Value::text(*qty_note));
        amt_notes.push(Value::text(*amt_note));
        impact.push(t.po_amt.map_or(Value::Null, |a| Value::Number(a - t.invoice_amount)));
        grn_sums.push(Value::Number(t.grn_qty));
        qty_sums.push(Value::Number(t.invoice_qty));
        amt_sums.push(Value::Number(t.invoice_amount));
    }
    out.add_column(Column::new(GRN_QTY_SUM, grn_sums));
    out.add_column(Column::new(INVOICE_QTY_SUM, qty_sums));
    out.add_column(Column::new(INVOICE_AMOUNT_SUM, amt_sums));
    out.add_column(Column::new(QTY_EXCEPTION, qty_notes));
    out.add_column(Column::new(AMT_EXCEPTION, amt_notes));
    out.add_column(Column::new(FINANCIAL_IMPACT, impact));
    out.move_to_front(&[
        PO_NO,
        QTY_EXCEPTION,
        AMT_EXCEPTION,
        FINANCIAL_IMPACT,
        PO_QTY,
        PO_AMT,
        GRN_QTY_SUM,
        INVOICE_QTY_SUM,
        INVOICE_AMOUNT_SUM,
    ]);
    Ok(out)
}

/// Purchase orders raised after the invoice they cover
pub fn post_invoice_pos(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let sample = input(inputs, 0, "P2P3")?;
    let po_date = sample.require(PO_DATE)?;
    let invoice_date = sample.require(INVOICE_DATE)?;

    let mut out = sample.filter_rows(|r| {
        match (po_date.get(r).as_date(), invoice_date.get(r).as_date()) {
            (Some(po), Some(invoice)) => po > invoice,
            _ => false,
        }
    });
    out.move_to_front(&[PO_DATE, INVOICE_DATE, PO_NO]);
    Ok(out)
}

type SplitKey = (String, String, NaiveDateTime);

/// Several POs to one vendor for one item on one day whose invoices together
/// exceed the split-order threshold
pub fn split_orders(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let sample = input(inputs, 0, "P2P4")?;
    let vendor = sample.require(VENDOR_NAME)?;
    let item = sample.require(ITEM_CODE)?;
    let po_date = sample.require(PO_DATE)?;
    let po_no = sample.require(PO_NO)?;
    let invoice_amount = sample.require(INVOICE_AMOUNT)?;
    let threshold = ctx.params.split_order_threshold;

    let key_of = |r: usize| -> Option<SplitKey> {
        po_no.get(r).key()?;
        Some((vendor.get(r).key()?, item.get(r).key()?, po_date.get(r).as_date()?))
    };

    let mut groups: BTreeMap<SplitKey, (BTreeSet<String>, f64, Vec<usize>)> = BTreeMap::new();
    for r in 0..sample.row_count() {
        let Some(key) = key_of(r) else {
            continue;
        };
        let entry = groups.entry(key).or_default();
        if let Some(po) = po_no.get(r).key() {
            entry.0.insert(po);
        }
        entry.1 += invoice_amount.get(r).as_number().unwrap_or(0.0);
        entry.2.push(r);
    }

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut group_totals = Vec::new();
    let flagged = groups
        .into_iter()
        .filter(|(_, (pos, total, _))| pos.len() > 1 && *total > threshold);
    for (n, (_, (_, total, mut members))) in flagged.enumerate() {
        members.sort_by_key(|&r| po_no.get(r).key());
        for r in members {
            rows.push(r);
            labels.push(Value::text(format!("Group_{}", n + 1)));
            group_totals.push(Value::Number(total));
        }
    }

    let mut out = sample.take_rows(&rows);
    out.insert_column(0, Column::new(SPLIT_GROUP, labels));
    out.add_column(Column::new(GROUP_TOTAL_INVOICE, group_totals));
    out.move_to_front(&[
        SPLIT_GROUP,
        VENDOR_NAME,
        ITEM_CODE,
        PO_DATE,
        PO_NO,
        INVOICE_AMOUNT,
        GROUP_TOTAL_INVOICE,
    ]);
    Ok(out)
}

/// Pairs of vendor-master rows sharing a PAN, GST number, name or bank
/// account. Rows are numbered from 1.
pub fn duplicate_vendors(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let vendors = input(inputs, 0, "P2P5")?;
    let checks = [
        (PAN_NO, "PAN Match"),
        (GST_NO, "GST Match"),
        (VENDOR_NAME, "Vendor Name Match"),
        (BANK_ACCOUNT, "Bank Account Match"),
    ];

    let mut pairs: BTreeMap<(usize, usize), BTreeSet<&str>> = BTreeMap::new();
    for (column, label) in checks {
        let values = vendors.require(column)?;
        let mut by_value: HashMap<String, Vec<usize>> = HashMap::new();
        for r in 0..vendors.row_count() {
            if let Some(k) = values.get(r).key() {
                by_value.entry(k).or_default().push(r);
            }
        }
        for rows in by_value.values().filter(|rows| rows.len() > 1) {
            for (i, &a) in rows.iter().enumerate() {
                for &b in &rows[i + 1..] {
                    pairs.entry((a.min(b), a.max(b))).or_default().insert(label);
                }
            }
        }
    }

    let mut header = vec!["Row_A".to_string(), "Row_B".to_string(), "Exception_Noted".to_string()];
    header.extend(vendors.columns.iter().map(|c| format!("A_{}", c.name)));
    header.extend(vendors.columns.iter().map(|c| format!("B_{}", c.name)));

    let mut seen = HashSet::new();
    if let Some(dup) = header.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(AuditError::rule("P2P5", format!("column '{dup}' would be duplicated")));
    }

    let mut out = Table::with_header("P2P5", &header);
    for ((a, b), labels) in pairs {
        let mut row = vec![
            Value::Number((a + 1) as f64),
            Value::Number((b + 1) as f64),
            Value::text(labels.into_iter().collect::<Vec<_>>().join(", ")),
        ];
        row.extend(vendors.columns.iter().map(|c| c.get(a).clone()));
        row.extend(vendors.columns.iter().map(|c| c.get(b).clone()));
        out.push_row(row)?;
    }
    Ok(out)
}
