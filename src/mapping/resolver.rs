//! Slot resolution: required logical names -> physical sheet/column names
//!
//! One algorithm serves both levels. A `SlotMapping` holds the required slots
//! of one scope (a category's sheets, or one sheet's fields), the physical
//! candidates read from the workbook, and the current selection per slot.
//! After every user assignment the selection is a partial injection: no
//! candidate is claimed by two slots.

use crate::error::{AuditError, AuditResult};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// How names are normalised before auto-matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Drop all whitespace, lower-case ("Loan  Dump" == "loandump")
    Sheet,
    /// Drop everything that is not alphanumeric, lower-case
    /// ("LOAN OUTSTANDING (Rs.)" == "Loan Outstanding Rs")
    Field,
}

impl NameMatch {
    pub fn normalize(self, name: &str) -> String {
        let lowered = name.trim().to_lowercase();
        match self {
            NameMatch::Sheet => lowered.chars().filter(|c| !c.is_whitespace()).collect(),
            NameMatch::Field => lowered.chars().filter(|c| c.is_alphanumeric()).collect(),
        }
    }
}

/// Best-effort automatic assignment. A required name resolves to the single
/// candidate with the same normalised form; ambiguous or missing matches stay
/// empty.
pub fn auto_match(
    required: &[String],
    candidates: &[String],
    mode: NameMatch,
) -> BTreeMap<String, String> {
    let mut index: HashMap<String, Vec<&String>> = HashMap::new();
    for candidate in candidates {
        index.entry(mode.normalize(candidate)).or_default().push(candidate);
    }

    required
        .iter()
        .map(|name| {
            let chosen = match index.get(&mode.normalize(name)).map(Vec::as_slice) {
                Some([only]) => (*only).clone(),
                _ => String::new(),
            };
            (name.clone(), chosen)
        })
        .collect()
}

/// Mapping of one scope's required slots onto physical candidates
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMapping {
    scope: String,
    mode: NameMatch,
    candidates: Vec<String>,
    /// (required slot, selection) in declaration order; "" means unresolved
    slots: Vec<(String, String)>,
}

/// Sheet-level instance: required sheet -> physical sheet, per category
pub type SheetMapping = SlotMapping;

/// Field-level instance: required field -> physical column, per logical sheet
pub type FieldMapping = SlotMapping;

impl SlotMapping {
    pub fn new(
        scope: impl Into<String>,
        mode: NameMatch,
        required: Vec<String>,
        candidates: Vec<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            mode,
            candidates,
            slots: required.into_iter().map(|r| (r, String::new())).collect(),
        }
    }

    pub fn for_sheets(category: &str, required: Vec<String>, sheets: Vec<String>) -> Self {
        Self::new(category, NameMatch::Sheet, required, sheets)
    }

    pub fn for_fields(scope: &str, required: Vec<String>, columns: Vec<String>) -> Self {
        Self::new(scope, NameMatch::Field, required, columns)
    }

    /// Initial population. Restores `previous` selections when given (dropping
    /// any that are no longer valid candidates), otherwise auto-matches. When
    /// the scope offers exactly one candidate, every still-empty slot takes it.
    ///
    /// Bulk initialisation does not run conflict clearing.
    pub fn bootstrap(&mut self, previous: Option<&BTreeMap<String, String>>) {
        let base = match previous {
            Some(prev) if !prev.is_empty() => prev.clone(),
            _ => auto_match(&self.required(), &self.candidates, self.mode),
        };

        for (slot, selection) in &mut self.slots {
            let value = base.get(slot).cloned().unwrap_or_default();
            *selection = if self.candidates.contains(&value) {
                value
            } else {
                String::new()
            };
        }

        if let [only] = self.candidates.as_slice() {
            for (_, selection) in &mut self.slots {
                if selection.is_empty() {
                    *selection = only.clone();
                }
            }
        }

        debug!(scope = %self.scope, resolved = self.slots.len() - self.unresolved().len(), total = self.slots.len(), "mapping bootstrapped");
    }

    /// User edit: point `slot` at `value` ("" clears it). Any other slot that
    /// currently holds the same value is cleared. Returns the cleared slots.
    pub fn assign(&mut self, slot: &str, value: &str) -> AuditResult<Vec<String>> {
        let index = self.slot_index(slot)?;
        if !value.is_empty() && !self.candidates.iter().any(|c| c == value) {
            return Err(AuditError::Mapping(format!(
                "'{}' is not an available choice for '{}' in {}",
                value, slot, self.scope
            )));
        }

        let mut cleared = Vec::new();
        if !value.is_empty() {
            for (i, (other, selection)) in self.slots.iter_mut().enumerate() {
                if i != index && selection == value {
                    selection.clear();
                    cleared.push(other.clone());
                }
            }
        }
        self.slots[index].1 = value.to_string();

        if !cleared.is_empty() {
            debug!(scope = %self.scope, slot, value, ?cleared, "cleared competing selections");
        }
        Ok(cleared)
    }

    pub fn clear(&mut self, slot: &str) -> AuditResult<()> {
        self.assign(slot, "").map(|_| ())
    }

    /// Current selection, `None` when unresolved or unknown
    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Every required slot resolves to a non-empty value
    pub fn is_ready(&self) -> bool {
        self.slots.iter().all(|(_, v)| !v.is_empty())
    }

    pub fn unresolved(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(s, _)| s.as_str())
            .collect()
    }

    /// (slot, selection) pairs in declaration order, unresolved as ""
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots.iter().map(|(s, v)| (s.as_str(), v.as_str()))
    }

    /// Snapshot suitable for `bootstrap(Some(..))`
    pub fn selections(&self) -> BTreeMap<String, String> {
        self.slots.iter().cloned().collect()
    }

    pub fn required(&self) -> Vec<String> {
        self.slots.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn slot_index(&self, slot: &str) -> AuditResult<usize> {
        self.slots
            .iter()
            .position(|(s, _)| s == slot)
            .ok_or_else(|| AuditError::UnknownSlot {
                scope: self.scope.clone(),
                slot: slot.to_string(),
            })
    }
}
