//! Loan-portfolio checks over the loan dump, the PIN blacklist and the two
//! loan-book snapshots
//!
//! Asset codes: 11/12 standard, 21/22 sub-standard, 31/32/33 doubtful.

use super::{approx_eq, input, one_of, text_is, CatalogRule, EvalFn, RuleContext};
use crate::error::AuditResult;
use crate::mapping::canon::*;
use crate::mapping::{tables, TableRef};
use crate::types::{Column, Table, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const GROUP: &str = "Banking";
pub const LOAN_BOOK_GROUP: &str = "Loan Book";

const STANDARD: &[&str] = &["11", "12"];
const SUB_STANDARD: &[&str] = &["21", "22"];
const DOUBTFUL_3: &[&str] = &["31", "32", "33"];

const NPA: &str = "NPA";
const AGRI_SECTOR: &str = "01.Agri";

/// Column suffixes for the two loan-book snapshots after the join
pub const BASE_SUFFIX: &str = "_Base";
pub const COMPARISON_SUFFIX: &str = "_Comparison";
pub const DIFFERENCE: &str = "Difference";

const DUMP: &[TableRef] = &[tables::LOAN_DUMP];
const DUMP_AND_BLACKLIST: &[TableRef] = &[tables::LOAN_DUMP, tables::PIN_BLACKLIST];
const LOAN_BOOKS: &[TableRef] = &[tables::LOAN_BOOK_BASE, tables::LOAN_BOOK_COMPARISON];

pub fn catalogue() -> Vec<CatalogRule> {
    fn dump_rule(code: &'static str, title: &'static str, eval: EvalFn) -> CatalogRule {
        CatalogRule {
            code,
            title,
            group: GROUP,
            inputs: DUMP,
            eval,
        }
    }

    vec![
        dump_rule("zero_or_null_roi_loans", "Zero or Null ROI Loans", zero_or_null_roi_loans),
        dump_rule(
            "standard_accounts_with_uri_zero",
            "Standard Accounts with URI Zero",
            standard_accounts_with_uri_zero,
        ),
        dump_rule(
            "provision_verification_substandard_npa",
            "Provision Verification (Sub-Standard NPA)",
            provision_verification_substandard_npa,
        ),
        dump_rule(
            "restructured_standard_accounts",
            "Restructured Standard Accounts",
            restructured_standard_accounts,
        ),
        dump_rule(
            "provision_verification_doubtful3_npa",
            "Provision Verification (Doubtful-3 NPA)",
            provision_verification_doubtful3_npa,
        ),
        dump_rule(
            "npa_fb_accounts_overdue",
            "NPA FB Accounts with Overdue Flags",
            npa_fb_accounts_overdue,
        ),
        dump_rule("negative_amt_outstanding", "Negative Amount Outstanding", negative_amt_outstanding),
        dump_rule(
            "standard_accounts_overdue_details",
            "Standard Accounts Overdue Details",
            standard_accounts_overdue_details,
        ),
        dump_rule(
            "standard_accounts_with_odd_interest",
            "Standard Accounts with Odd Interest",
            standard_accounts_with_odd_interest,
        ),
        dump_rule("agri0_sector_over_limit", "Agri0 Sector Over Limit", agri0_sector_over_limit),
        dump_rule(
            "misaligned_scheme_for_facilities",
            "Misaligned Scheme for Facilities",
            misaligned_scheme_for_facilities,
        ),
        CatalogRule {
            code: "blacklisted_pin_code_loans",
            title: "Loans & Advances to Blacklisted Areas",
            group: GROUP,
            inputs: DUMP_AND_BLACKLIST,
            eval: blacklisted_pin_code_loans,
        },
        CatalogRule {
            code: "blank_asset_classification",
            title: "Blank Asset Classification",
            group: LOAN_BOOK_GROUP,
            inputs: LOAN_BOOKS,
            eval: blank_asset_classification,
        },
    ]
}

/// provision * 100 / outstanding; `None` when outstanding is zero or null or
/// provision is null
fn provision_ratio(provision: &Value, outstanding: &Value) -> Option<f64> {
    let outstanding = outstanding.as_number().filter(|o| *o != 0.0)?;
    let provision = provision.as_number()?;
    Some(provision * 100.0 / outstanding)
}

/// Rate of exactly zero, or the "-" placeholder. Null rates are not flagged.
fn is_zero_or_dash(rate: &Value) -> bool {
    text_is(rate, "-") || rate.as_number().is_some_and(|n| n == 0.0)
}

/// `rate` is a whole multiple of `step`
fn is_step_multiple(rate: f64, step: f64) -> bool {
    let q = rate / step;
    (q - q.round()).abs() <= 1e-6
}

pub fn zero_or_null_roi_loans(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "zero_or_null_roi_loans")?;
    let asset = loans.require(ASSET)?;
    let rate = loans.require(INT_RATE)?;
    Ok(loans.filter_rows(|r| one_of(asset.get(r), STANDARD) && is_zero_or_dash(rate.get(r))))
}

pub fn standard_accounts_with_uri_zero(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "standard_accounts_with_uri_zero")?;
    let asset = loans.require(ASSET)?;
    let uri = loans.require(URI)?;
    Ok(loans.filter_rows(|r| {
        one_of(asset.get(r), STANDARD) && uri.get(r).as_number().is_some_and(|n| n == 0.0)
    }))
}

pub fn provision_verification_substandard_npa(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "provision_verification_substandard_npa")?;
    let category = loans.require(CUST_CATEGORY)?;
    let asset = loans.require(ASSET)?;
    let provision = loans.require(PROVISION)?;
    let outstanding = loans.require(AMT_OS)?;
    let threshold = ctx.params.provision_threshold_pct;

    Ok(loans.filter_rows(|r| {
        text_is(category.get(r), NPA)
            && one_of(asset.get(r), SUB_STANDARD)
            && provision_ratio(provision.get(r), outstanding.get(r)).is_some_and(|p| p < threshold)
    }))
}

pub fn restructured_standard_accounts(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "restructured_standard_accounts")?;
    let flag = loans.require(RESTRUCTURED_FLG)?;
    let asset = loans.require(ASSET)?;
    let provision = loans.require(PROVISION)?;
    let outstanding = loans.require(AMT_OS)?;
    let restructured_on = loans.require(RESTR_DATE)?;
    let threshold = ctx.params.provision_threshold_pct;
    let window_start = ctx.days_before(ctx.params.restructuring_window_days);

    Ok(loans.filter_rows(|r| {
        text_is(flag.get(r), "Y")
            && one_of(asset.get(r), STANDARD)
            && provision_ratio(provision.get(r), outstanding.get(r)).is_some_and(|p| p < threshold)
            && restructured_on.get(r).as_date().is_some_and(|d| d > window_start)
    }))
}

/// Doubtful-3 NPAs must be provided for in full. A null on either side is a
/// mismatch.
pub fn provision_verification_doubtful3_npa(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "provision_verification_doubtful3_npa")?;
    let category = loans.require(CUST_CATEGORY)?;
    let asset = loans.require(ASSET)?;
    let provision = loans.require(PROVISION)?;
    let outstanding = loans.require(AMT_OS)?;

    Ok(loans.filter_rows(|r| {
        let fully_provided = match (provision.get(r).as_number(), outstanding.get(r).as_number()) {
            (Some(p), Some(o)) => approx_eq(p, o),
            _ => false,
        };
        text_is(category.get(r), NPA) && one_of(asset.get(r), DOUBTFUL_3) && !fully_provided
    }))
}

pub fn npa_fb_accounts_overdue(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "npa_fb_accounts_overdue")?;
    let fb_flag = loans.require(FB_NFB_FLG)?;
    let out_of_order = loans.require(OUT_ORD_DT)?;
    let cutoff = ctx.days_before(ctx.params.overdue_window_days);

    Ok(loans.filter_rows(|r| {
        text_is(fb_flag.get(r), "FB") && out_of_order.get(r).as_date().is_some_and(|d| d <= cutoff)
    }))
}

pub fn negative_amt_outstanding(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "negative_amt_outstanding")?;
    let outstanding = loans.require(AMT_OS)?;
    Ok(loans.filter_rows(|r| outstanding.get(r).as_number().is_some_and(|n| n < 0.0)))
}

pub fn standard_accounts_overdue_details(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "standard_accounts_overdue_details")?;
    let outstanding = loans.require(AMT_OS)?;
    let drawing_limit = loans.require(DRAW_LMT)?;
    let ratio = ctx.params.overdraw_ratio;

    Ok(loans.filter_rows(|r| {
        match (outstanding.get(r).as_number(), drawing_limit.get(r).as_number()) {
            (Some(os), Some(limit)) => os - limit > ratio * limit,
            _ => false,
        }
    }))
}

pub fn standard_accounts_with_odd_interest(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "standard_accounts_with_odd_interest")?;
    let asset = loans.require(ASSET)?;
    let rate = loans.require(INT_RATE)?;
    let step = ctx.params.interest_step;

    Ok(loans.filter_rows(|r| {
        one_of(asset.get(r), STANDARD)
            && rate.get(r).as_number().is_some_and(|n| !is_step_multiple(n, step))
    }))
}

pub fn agri0_sector_over_limit(inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "agri0_sector_over_limit")?;
    let asset = loans.require(ASSET)?;
    let sector = loans.require(SECTOR)?;
    let outstanding = loans.require(AMT_OS)?;
    let sanctioned = loans.require(SANC_LMT)?;
    let multiplier = ctx.params.agri_limit_multiplier;

    Ok(loans.filter_rows(|r| {
        one_of(asset.get(r), STANDARD)
            && text_is(sector.get(r), AGRI_SECTOR)
            && match (outstanding.get(r).as_number(), sanctioned.get(r).as_number()) {
                (Some(os), Some(limit)) => os > multiplier * limit,
                _ => false,
            }
    }))
}

/// Within each facility, the most frequent scheme code is the norm; rows
/// carrying any other code (or none) are flagged. Ties go to the smallest
/// code. Rows without a facility code form one group of their own.
pub fn misaligned_scheme_for_facilities(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "misaligned_scheme_for_facilities")?;
    let facility = loans.require(FACILITYCD)?;
    let scheme = loans.require(SCHEME_CD)?;

    let mut counts: HashMap<Option<String>, BTreeMap<String, usize>> = HashMap::new();
    for r in 0..loans.row_count() {
        let entry = counts.entry(facility.get(r).key()).or_default();
        if let Some(code) = scheme.get(r).key() {
            *entry.entry(code).or_default() += 1;
        }
    }

    let modes: HashMap<Option<String>, String> = counts
        .into_iter()
        .filter_map(|(group, codes)| {
            let mut best: Option<(String, usize)> = None;
            for (code, n) in codes {
                if best.as_ref().map_or(true, |(_, m)| n > *m) {
                    best = Some((code, n));
                }
            }
            best.map(|(code, _)| (group, code))
        })
        .collect();

    Ok(loans.filter_rows(|r| match modes.get(&facility.get(r).key()) {
        Some(mode) => scheme.get(r).key().as_deref() != Some(mode.as_str()),
        None => false,
    }))
}

/// Loans whose PIN code appears in the blacklist
pub fn blacklisted_pin_code_loans(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let loans = input(inputs, 0, "blacklisted_pin_code_loans")?;
    let blacklist = input(inputs, 1, "blacklisted_pin_code_loans")?;

    let blocked: HashSet<String> = blacklist
        .require(PIN_CODE)?
        .values
        .iter()
        .filter_map(Value::key)
        .collect();
    let pin = loans.require(PIN_CODE)?;

    Ok(loans.filter_rows(|r| pin.get(r).key().is_some_and(|k| blocked.contains(&k))))
}

/// Inner-join the base and comparison loan books on project number, add the
/// outstanding difference and blank both classifications where nothing moved.
pub fn blank_asset_classification(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let base = input(inputs, 0, "blank_asset_classification")?;
    let comparison = input(inputs, 1, "blank_asset_classification")?;

    let base_key = base.require(PROJECT_NO)?;
    let comparison_key = comparison.require(PROJECT_NO)?;
    let base_os = base.require(LOAN_OUTSTANDING)?;
    let comparison_os = comparison.require(LOAN_OUTSTANDING)?;
    let base_class = base.require(ASSET_CLASSIFICATION)?;
    let comparison_class = comparison.require(ASSET_CLASSIFICATION)?;

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for r in 0..comparison.row_count() {
        if let Some(k) = comparison_key.get(r).key() {
            index.entry(k).or_default().push(r);
        }
    }

    let pairs: Vec<(usize, usize)> = (0..base.row_count())
        .filter_map(|l| base_key.get(l).key().map(|k| (l, k)))
        .flat_map(|(l, k)| {
            index
                .get(&k)
                .map(|rows| rows.iter().map(|&r| (l, r)).collect::<Vec<_>>())
                .unwrap_or_default()
        })
        .collect();

    let overlap: HashSet<&str> = base
        .column_names()
        .into_iter()
        .filter(|n| *n != PROJECT_NO && comparison.has_column(n))
        .collect();
    let suffixed = |name: &str, suffix: &str| {
        if overlap.contains(name) {
            format!("{name}{suffix}")
        } else {
            name.to_string()
        }
    };

    let mut merged = Table::new("blank_asset_classification");
    for column in &base.columns {
        let name = if column.name == PROJECT_NO {
            column.name.clone()
        } else {
            suffixed(&column.name, BASE_SUFFIX)
        };
        merged
            .columns
            .push(Column::new(name, pairs.iter().map(|(l, _)| column.get(*l).clone()).collect()));
    }
    for column in comparison.columns.iter().filter(|c| c.name != PROJECT_NO) {
        merged.columns.push(Column::new(
            suffixed(&column.name, COMPARISON_SUFFIX),
            pairs.iter().map(|(_, r)| column.get(*r).clone()).collect(),
        ));
    }

    let mut difference = Vec::with_capacity(pairs.len());
    let mut unchanged = Vec::with_capacity(pairs.len());
    for (l, r) in &pairs {
        let delta = base_os.get(*l).as_number().unwrap_or(0.0)
            - comparison_os.get(*r).as_number().unwrap_or(0.0);
        let same_class = match (base_class.get(*l).key(), comparison_class.get(*r).key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        difference.push(Value::Number(delta));
        unchanged.push(delta == 0.0 && same_class);
    }
    merged.columns.push(Column::new(DIFFERENCE, difference));

    for name in [
        format!("{ASSET_CLASSIFICATION}{BASE_SUFFIX}"),
        format!("{ASSET_CLASSIFICATION}{COMPARISON_SUFFIX}"),
    ] {
        if let Some(column) = merged.column_mut(&name) {
            for (value, blank) in column.values.iter_mut().zip(&unchanged) {
                if *blank {
                    *value = Value::text("");
                }
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_multiple() {
        assert!(is_step_multiple(7.25, 0.05));
        assert!(is_step_multiple(10.0, 0.05));
        assert!(is_step_multiple(8.15, 0.05));
        assert!(!is_step_multiple(7.33, 0.05));
        assert!(!is_step_multiple(9.02, 0.05));
    }

    #[test]
    fn test_provision_ratio_guards() {
        assert_eq!(provision_ratio(&Value::Number(10.0), &Value::Number(100.0)), Some(10.0));
        assert_eq!(provision_ratio(&Value::Number(10.0), &Value::Number(0.0)), None);
        assert_eq!(provision_ratio(&Value::Number(10.0), &Value::Null), None);
        assert_eq!(provision_ratio(&Value::Null, &Value::Number(100.0)), None);
    }

    #[test]
    fn test_zero_or_dash() {
        assert!(is_zero_or_dash(&Value::text("0")));
        assert!(is_zero_or_dash(&Value::text(" - ")));
        assert!(is_zero_or_dash(&Value::Number(0.0)));
        assert!(!is_zero_or_dash(&Value::Null));
        assert!(!is_zero_or_dash(&Value::text("5")));
    }
}
