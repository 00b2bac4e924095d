//! Order-to-cash checks over the O2C sample and the customer master

use super::{input, label_column, CatalogRule, RuleContext};
use crate::error::AuditResult;
use crate::mapping::canon::*;
use crate::mapping::{tables, TableRef};
use crate::types::{Column, Table, Value};

pub const GROUP: &str = "O2C";

pub const EXCEPTION_NOTED: &str = "Exception_Noted";
pub const DATE_DIFF: &str = "DateDiff";

const SAMPLE: &[TableRef] = &[tables::O2C_SAMPLE];
const CUSTOMERS: &[TableRef] = &[tables::CUSTOMER_MASTER];

pub fn catalogue() -> Vec<CatalogRule> {
    vec![
        CatalogRule {
            code: "O2C1",
            title: "Overdue Delivery",
            group: GROUP,
            inputs: SAMPLE,
            eval: overdue_delivery,
        },
        CatalogRule {
            code: "O2C2",
            title: "Dispatch Without Invoice",
            group: GROUP,
            inputs: SAMPLE,
            eval: dispatch_without_invoice,
        },
        CatalogRule {
            code: "O2C3",
            title: "Missing Customer Master Data",
            group: GROUP,
            inputs: CUSTOMERS,
            eval: missing_customer_data,
        },
    ]
}

/// Label column name carries the allowed number of days
pub fn overdue_label(days: i64) -> String {
    format!("Exception_Noted ({days}_Days)")
}

/// Deliveries made more than the allowed number of days after the order
pub fn overdue_delivery(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let sample = input(inputs, 0, "O2C1")?;
    let ordered = sample.require(SO_DATE)?;
    let delivered = sample.require(DELIVERY_DATE)?;
    let allowed = ctx.params.overdue_delivery_days;

    let mut rows = Vec::new();
    let mut gaps = Vec::new();
    for r in 0..sample.row_count() {
        let (Some(so), Some(delivery)) = (ordered.get(r).as_date(), delivered.get(r).as_date()) else {
            continue;
        };
        let days = (delivery - so).num_days();
        if days > allowed {
            rows.push(r);
            gaps.push(Value::Number(days as f64));
        }
    }

    let label = overdue_label(allowed);
    let mut out = sample.take_rows(&rows);
    out.add_column(Column::new(DATE_DIFF, gaps));
    out.add_column(label_column(&label, "Overdue Delivery", rows.len()));
    out.move_to_front(&[label.as_str(), SO_DATE, DELIVERY_DATE]);
    Ok(out)
}

/// Deliveries with a delivery number but no invoice number
pub fn dispatch_without_invoice(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let sample = input(inputs, 0, "O2C2")?;
    let delivery = sample.require(DELIVERY_NO)?;
    let invoice = sample.require(INVOICE_NO)?;

    let mut out = sample.filter_rows(|r| !delivery.get(r).is_blank() && invoice.get(r).is_blank());
    let len = out.row_count();
    out.add_column(label_column(EXCEPTION_NOTED, "Dispatch Without Invoice", len));
    out.move_to_front(&[EXCEPTION_NOTED, DELIVERY_NO, INVOICE_NO]);
    Ok(out)
}

/// Customers missing any of GST number, PAN or credit limit
pub fn missing_customer_data(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let customers = input(inputs, 0, "O2C3")?;
    let checked = [GST_NO, PAN_NO, CREDIT_LIMIT];
    let columns = checked
        .iter()
        .map(|name| customers.require(name))
        .collect::<AuditResult<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut notes = Vec::new();
    for r in 0..customers.row_count() {
        let missing: Vec<&str> = checked
            .iter()
            .zip(&columns)
            .filter(|(_, column)| column.get(r).is_blank())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            rows.push(r);
            notes.push(Value::text(format!("{} Missing", missing.join(" + "))));
        }
    }

    let mut out = customers.take_rows(&rows);
    out.add_column(Column::new(EXCEPTION_NOTED, notes));
    out.move_to_front(&[EXCEPTION_NOTED, PAN_NO, GST_NO, CREDIT_LIMIT]);
    Ok(out)
}
