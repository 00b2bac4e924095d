//! Per-workflow session state
//!
//! A `Session` owns everything one audit run needs: the uploaded workbooks,
//! the schema (which grows conditional fields as uploads arrive), the rule
//! registry, sheet and field mappings and the introspection cache. Nothing is
//! shared between sessions.

use super::builder::build_table;
use super::rules::{Registry, RuleContext};
use super::runner::{self, RunReport};
use super::Suite;
use crate::config::{MappingOverrides, RuleParameters};
use crate::error::{AuditError, AuditResult};
use crate::excel::{Introspector, WorkbookHandle};
use crate::mapping::{
    is_supported_workbook_name, Blocker, FieldMapping, Readiness, Schema, SheetMapping, TableKey,
};
use crate::types::Table;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    schema: Schema,
    registry: Registry,
    params: RuleParameters,
    uploads: BTreeMap<String, WorkbookHandle>,
    sheet_mappings: BTreeMap<String, SheetMapping>,
    field_mappings: BTreeMap<TableKey, FieldMapping>,
    introspector: Introspector,
}

impl Session {
    pub fn new(suite: Suite) -> Self {
        Self::with_schema(suite.schema(), suite.registry())
    }

    pub fn with_schema(schema: Schema, registry: Registry) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, schema = schema.name(), "session created");
        Self {
            id,
            schema,
            registry,
            params: RuleParameters::default(),
            uploads: BTreeMap::new(),
            sheet_mappings: BTreeMap::new(),
            field_mappings: BTreeMap::new(),
            introspector: Introspector::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// For registering additional rules
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn params(&self) -> &RuleParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: RuleParameters) {
        self.params = params;
    }

    //--------------------------------------------------------------------------
    // Uploads
    //--------------------------------------------------------------------------

    /// Attach a workbook to a category, or to a shared fallback source such
    /// as MASTER. Mappings of every category reading that workbook are reset.
    pub fn upload(&mut self, category: &str, workbook: WorkbookHandle) -> AuditResult<()> {
        let known = self.schema.category(category).is_some()
            || self
                .schema
                .categories()
                .iter()
                .any(|c| c.fallback_source.as_deref() == Some(category));
        if !known {
            return Err(AuditError::Mapping(format!(
                "Unknown category '{}' for schema '{}'",
                category,
                self.schema.name()
            )));
        }

        info!(session = %self.id, category, workbook = workbook.name(), digest = workbook.digest(), "workbook uploaded");
        self.uploads.insert(category.to_string(), workbook);
        self.reset_readers_of(category);
        Ok(())
    }

    pub fn remove_upload(&mut self, category: &str) -> Option<WorkbookHandle> {
        let removed = self.uploads.remove(category);
        if removed.is_some() {
            self.reset_readers_of(category);
        }
        removed
    }

    /// Categories and sources that have a workbook
    pub fn uploaded(&self) -> BTreeSet<String> {
        self.uploads.keys().cloned().collect()
    }

    /// The workbook a category reads: its own upload, else its fallback's
    pub fn workbook_for(&self, category: &str) -> Option<&WorkbookHandle> {
        if let Some(own) = self.uploads.get(category) {
            return Some(own);
        }
        let source = self.schema.category(category)?.fallback_source.as_deref()?;
        self.uploads.get(source)
    }

    fn reset_readers_of(&mut self, source: &str) {
        let affected: Vec<String> = self
            .schema
            .categories()
            .iter()
            .filter(|c| c.key == source || c.fallback_source.as_deref() == Some(source))
            .map(|c| c.key.clone())
            .collect();
        for category in affected {
            self.sheet_mappings.remove(&category);
            self.field_mappings.retain(|key, _| key.category != category);
        }
    }

    //--------------------------------------------------------------------------
    // Sheet mapping
    //--------------------------------------------------------------------------

    /// Read the category's workbook and (re)build its sheet mapping,
    /// restoring earlier selections that are still valid.
    pub fn prepare_sheet_mappings(&mut self, category: &str) -> AuditResult<Readiness> {
        let schema = self.schema.category_or_err(category)?;
        let required = schema.required_sheets();

        let Some(workbook) = self.workbook_for(category).cloned() else {
            self.sheet_mappings.remove(category);
            return Ok(Blocker::MissingWorkbook.into());
        };
        if !is_supported_workbook_name(workbook.name()) {
            self.sheet_mappings.remove(category);
            return Ok(Blocker::UnsupportedFormat(workbook.name().to_string()).into());
        }

        let sheets = self.introspector.list_sheets(&workbook);
        if sheets.is_empty() {
            self.sheet_mappings.remove(category);
            return Ok(Blocker::Unreadable.into());
        }
        if sheets.len() < required.len() {
            self.sheet_mappings.remove(category);
            return Ok(Blocker::InsufficientSheets {
                found: sheets.len(),
                required: required.len(),
            }
            .into());
        }

        let previous = self.sheet_mappings.get(category).map(SheetMapping::selections);
        let mut mapping = SheetMapping::for_sheets(category, required, sheets);
        mapping.bootstrap(previous.as_ref());
        self.sheet_mappings.insert(category.to_string(), mapping);
        Ok(self.sheet_readiness(category))
    }

    pub fn sheet_mapping(&self, category: &str) -> Option<&SheetMapping> {
        self.sheet_mappings.get(category)
    }

    /// User edit of one required sheet. The edited sheet's field mapping and
    /// those of any sheet cleared by the conflict rule are discarded.
    pub fn assign_sheet(&mut self, category: &str, required: &str, physical: &str) -> AuditResult<Vec<String>> {
        let mapping = self.sheet_mappings.get_mut(category).ok_or_else(|| {
            AuditError::Mapping(format!("Sheet mapping for '{category}' has not been prepared"))
        })?;
        let cleared = mapping.assign(required, physical)?;

        for sheet in cleared.iter().map(String::as_str).chain([required]) {
            self.field_mappings.remove(&TableKey::new(category, sheet));
        }
        debug!(session = %self.id, category, required, physical, "sheet assigned");
        Ok(cleared)
    }

    pub fn sheet_readiness(&self, category: &str) -> Readiness {
        match self.sheet_mappings.get(category) {
            Some(mapping) if mapping.is_ready() => Readiness::Ready,
            Some(mapping) => {
                Blocker::Unresolved(mapping.unresolved().into_iter().map(String::from).collect()).into()
            }
            None if self.workbook_for(category).is_none() => Blocker::MissingWorkbook.into(),
            None => Blocker::Unresolved(
                self.schema
                    .category(category)
                    .map(|c| c.required_sheets())
                    .unwrap_or_default(),
            )
            .into(),
        }
    }

    //--------------------------------------------------------------------------
    // Field mapping
    //--------------------------------------------------------------------------

    /// Build field mappings for every required sheet of `category`. The
    /// schema's conditional fields are applied first.
    pub fn prepare_field_mappings(&mut self, category: &str) -> AuditResult<BTreeMap<String, Readiness>> {
        let uploaded = self.uploaded();
        let changed = self.schema.apply_conditional_fields(&uploaded);
        if !changed.is_empty() {
            debug!(session = %self.id, ?changed, "conditional fields added");
        }

        let schema = self.schema.category_or_err(category)?.clone();
        let mut readiness = BTreeMap::new();
        for sheet in &schema.sheets {
            let key = TableKey::new(category, &sheet.name);
            let physical = self
                .sheet_mappings
                .get(category)
                .and_then(|m| m.get(&sheet.name))
                .map(str::to_string);
            let (Some(physical), Some(workbook)) = (physical, self.workbook_for(category).cloned()) else {
                self.field_mappings.remove(&key);
                readiness.insert(sheet.name.clone(), Blocker::SheetNotMapped(sheet.name.clone()).into());
                continue;
            };

            let columns = self.introspector.list_columns(&workbook, &physical, schema.header_row);
            if columns.is_empty() {
                self.field_mappings.remove(&key);
                readiness.insert(sheet.name.clone(), Blocker::NoColumns(physical).into());
                continue;
            }

            let previous = self.field_mappings.get(&key).map(FieldMapping::selections);
            let mut mapping = FieldMapping::for_fields(&key.to_string(), sheet.required_fields(), columns);
            mapping.bootstrap(previous.as_ref());
            self.field_mappings.insert(key, mapping);
            readiness.insert(sheet.name.clone(), self.field_readiness(category, &sheet.name));
        }
        Ok(readiness)
    }

    pub fn field_mapping(&self, category: &str, sheet: &str) -> Option<&FieldMapping> {
        self.field_mappings.get(&TableKey::new(category, sheet))
    }

    /// User edit of one required field
    pub fn assign_field(
        &mut self,
        category: &str,
        sheet: &str,
        field: &str,
        column: &str,
    ) -> AuditResult<Vec<String>> {
        let key = TableKey::new(category, sheet);
        let mapping = self.field_mappings.get_mut(&key).ok_or_else(|| {
            AuditError::Mapping(format!("Field mapping for '{key}' has not been prepared"))
        })?;
        let cleared = mapping.assign(field, column)?;
        debug!(session = %self.id, table = %key, field, column, "field assigned");
        Ok(cleared)
    }

    pub fn field_readiness(&self, category: &str, sheet: &str) -> Readiness {
        match self.field_mapping(category, sheet) {
            Some(mapping) if mapping.is_ready() => Readiness::Ready,
            Some(mapping) => {
                Blocker::Unresolved(mapping.unresolved().into_iter().map(String::from).collect()).into()
            }
            None => Blocker::SheetNotMapped(sheet.to_string()).into(),
        }
    }

    //--------------------------------------------------------------------------
    // Bulk operations
    //--------------------------------------------------------------------------

    /// Prepare sheet and field mappings for every category. Repeatable:
    /// selections that are still valid survive. Returns the readiness of
    /// every logical table.
    pub fn prepare_all(&mut self) -> AuditResult<BTreeMap<TableKey, Readiness>> {
        let mut readiness = BTreeMap::new();
        let categories: Vec<String> = self.schema.categories().iter().map(|c| c.key.clone()).collect();
        for category in categories {
            let sheets = self.prepare_sheet_mappings(&category)?;
            let per_sheet = match sheets {
                Readiness::Blocked(Blocker::Unresolved(_)) | Readiness::Ready => {
                    self.prepare_field_mappings(&category)?
                }
                Readiness::Blocked(blocker) => self
                    .schema
                    .category_or_err(&category)?
                    .required_sheets()
                    .into_iter()
                    .map(|s| (s, Readiness::Blocked(blocker.clone())))
                    .collect(),
            };
            for (sheet, state) in per_sheet {
                readiness.insert(TableKey::new(&category, sheet), state);
            }
        }
        Ok(readiness)
    }

    /// Apply saved choices as user edits, sheets first, then fields.
    /// Categories without a workbook are skipped.
    pub fn apply_overrides(&mut self, overrides: &MappingOverrides) -> AuditResult<()> {
        for (category, sheets) in &overrides.sheets {
            if self.sheet_mappings.get(category).is_none() {
                let state = self.prepare_sheet_mappings(category)?;
                if let Readiness::Blocked(blocker) = &state {
                    if !matches!(blocker, Blocker::Unresolved(_)) {
                        warn!(category, %blocker, "skipping sheet overrides");
                        continue;
                    }
                }
            }
            for (required, physical) in sheets {
                self.assign_sheet(category, required, physical)?;
            }
            // assign_sheet drops field mappings; rebuild them for the new sheets
            self.prepare_field_mappings(category)?;
        }

        for (category, sheets) in &overrides.fields {
            if self.workbook_for(category).is_none() {
                warn!(category, "skipping field overrides, no workbook");
                continue;
            }
            if self.sheet_mappings.get(category).is_none() {
                self.prepare_sheet_mappings(category)?;
            }
            self.prepare_field_mappings(category)?;
            for (sheet, fields) in sheets {
                for (field, column) in fields {
                    self.assign_field(category, sheet, field, column)?;
                }
            }
        }
        Ok(())
    }

    /// Current non-empty selections, in the override file layout
    pub fn mapping_snapshot(&self) -> MappingOverrides {
        let mut snapshot = MappingOverrides::default();
        for (category, mapping) in &self.sheet_mappings {
            let chosen: BTreeMap<String, String> = mapping
                .pairs()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            if !chosen.is_empty() {
                snapshot.sheets.insert(category.clone(), chosen);
            }
        }
        for (key, mapping) in &self.field_mappings {
            let chosen: BTreeMap<String, String> = mapping
                .pairs()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            if !chosen.is_empty() {
                snapshot
                    .fields
                    .entry(key.category.clone())
                    .or_default()
                    .insert(key.sheet.clone(), chosen);
            }
        }
        snapshot
    }

    //--------------------------------------------------------------------------
    // Build and run
    //--------------------------------------------------------------------------

    /// Canonical tables for every logical sheet whose mappings are ready
    pub fn build_tables(&self) -> BTreeMap<TableKey, Table> {
        let mut tables = BTreeMap::new();
        for category in self.schema.categories() {
            let Some(sheet_mapping) = self.sheet_mappings.get(&category.key) else {
                continue;
            };
            let workbook = self.workbook_for(&category.key);
            for sheet in &category.sheets {
                let key = TableKey::new(&category.key, &sheet.name);
                let table = build_table(
                    &self.introspector,
                    category,
                    sheet,
                    sheet_mapping,
                    self.field_mappings.get(&key),
                    workbook,
                );
                if let Some(table) = table {
                    tables.insert(key, table);
                }
            }
        }
        tables
    }

    /// Build the tables and run `selected` rules over them
    pub fn run<S: AsRef<str>>(&self, selected: &[S]) -> RunReport {
        let tables = self.build_tables();
        let ctx = RuleContext::new(self.params.clone());
        info!(session = %self.id, tables = tables.len(), selected = selected.len(), "run started");
        runner::run(selected, &tables, &self.registry, &ctx)
    }

    /// Run every registered rule
    pub fn run_all(&self) -> RunReport {
        let codes: Vec<String> = self.registry.codes().into_iter().map(String::from).collect();
        self.run(&codes)
    }
}
