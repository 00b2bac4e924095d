use crate::config::{MappingOverrides, RuleParameters};
use crate::core::{RunReport, RunStatus, Session, Suite};
use crate::error::{AuditError, AuditResult};
use crate::excel::{Introspector, ReportExporter, WorkbookHandle};
use crate::mapping::{Readiness, TableKey};
use chrono::NaiveDate;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Parse a `CATEGORY=PATH` upload argument
pub fn parse_input(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((category, path)) if !category.trim().is_empty() && !path.trim().is_empty() => {
            Ok((category.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected CATEGORY=PATH, got '{arg}'")),
    }
}

/// Workbooks and saved mappings that seed a session
#[derive(Debug, Clone)]
pub struct SessionArgs {
    pub suite: Suite,
    pub inputs: Vec<(String, PathBuf)>,
    pub mappings: Option<PathBuf>,
}

/// Everything the `run` command needs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub session: SessionArgs,
    pub config: Option<PathBuf>,
    pub as_of: Option<NaiveDate>,
    pub rules: Vec<String>,
    pub report: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Upload every input, prepare mappings and apply saved overrides
pub fn open_session(args: &SessionArgs) -> AuditResult<Session> {
    let mut session = Session::new(args.suite);
    for (category, path) in &args.inputs {
        session.upload(category, WorkbookHandle::from_path(path)?)?;
    }
    session.prepare_all()?;
    if let Some(path) = &args.mappings {
        let overrides = MappingOverrides::load(path)?;
        session.apply_overrides(&overrides)?;
    }
    Ok(session)
}

fn status_symbol(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Complete => "✅".normal(),
        RunStatus::Failed => "❌".normal(),
        RunStatus::Pending => "⏳".normal(),
    }
}

//==============================================================================
// sheets / columns
//==============================================================================

/// Execute the sheets command
pub fn sheets(workbook: PathBuf) -> AuditResult<()> {
    let handle = WorkbookHandle::from_path(&workbook)?;
    let names = Introspector::new().list_sheets(&handle);
    if names.is_empty() {
        return Err(AuditError::Workbook(format!(
            "No sheets could be read from {}",
            workbook.display()
        )));
    }

    println!("{}", "📒 Worksheets".bold().green());
    println!("   File: {}\n", workbook.display());
    for (i, name) in names.iter().enumerate() {
        println!("   {:>2}. {}", i + 1, name.cyan());
    }
    Ok(())
}

/// Execute the columns command
pub fn columns(workbook: PathBuf, sheet: String, header_row: u32) -> AuditResult<()> {
    let handle = WorkbookHandle::from_path(&workbook)?;
    let names = Introspector::new().list_columns(&handle, &sheet, header_row);
    if names.is_empty() {
        return Err(AuditError::Workbook(format!(
            "No columns found in sheet '{}' of {}",
            sheet,
            workbook.display()
        )));
    }

    println!("{}", "📋 Header columns".bold().green());
    println!("   File:  {}", workbook.display());
    println!("   Sheet: {} (header row {})\n", sheet.bright_yellow(), header_row);
    for name in &names {
        println!("   • {}", name);
    }
    Ok(())
}

//==============================================================================
// rules
//==============================================================================

#[derive(Serialize)]
struct RuleListing {
    code: String,
    title: String,
    group: String,
    inputs: Vec<TableKey>,
}

/// Execute the rules command
pub fn rules(suite: Suite, json: bool) -> AuditResult<()> {
    let registry = suite.registry();
    if json {
        let listing: Vec<RuleListing> = registry
            .rules()
            .map(|r| RuleListing {
                code: r.code().to_string(),
                title: r.title().to_string(),
                group: r.group().to_string(),
                inputs: r.inputs().iter().map(|i| i.key()).collect(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", format!("🤖 {} bots ({})", registry.len(), suite).bold().green());
    for group in registry.groups() {
        println!("\n{}", group.bold().cyan());
        for rule in registry.rules().filter(|r| r.group() == group) {
            let inputs: Vec<String> = rule.inputs().iter().map(|i| i.key().to_string()).collect();
            println!("   {:<42} {}", rule.code().bright_yellow(), rule.title());
            println!("   {:<42} {}", "", format!("reads: {}", inputs.join(", ")).dimmed());
        }
    }
    Ok(())
}

//==============================================================================
// map
//==============================================================================

fn print_readiness(readiness: &BTreeMap<TableKey, Readiness>) {
    for (key, state) in readiness {
        match state {
            Readiness::Ready => println!("   {} {}", "✅".normal(), key),
            Readiness::Blocked(blocker) => {
                println!("   {} {} - {}", "⏳".normal(), key, blocker.to_string().yellow())
            }
        }
    }
}

/// Execute the map command
pub fn map(args: SessionArgs, save: Option<PathBuf>, verbose: bool) -> AuditResult<()> {
    println!("{}", "🧭 Mapping workbooks".bold().green());
    println!("   Suite: {}", args.suite);
    for (category, path) in &args.inputs {
        println!("   {}: {}", category, path.display());
    }
    println!();

    let mut session = open_session(&args)?;
    let readiness = session.prepare_all()?;
    print_readiness(&readiness);

    if verbose {
        for category in session.schema().categories() {
            if let Some(mapping) = session.sheet_mapping(&category.key) {
                println!("\n{}", category.key.bold().cyan());
                for (required, physical) in mapping.pairs() {
                    println!("   {} → {}", required, or_unmapped(physical));
                }
            }
            for sheet in &category.sheets {
                if let Some(mapping) = session.field_mapping(&category.key, &sheet.name) {
                    println!("   {}", sheet.name.bright_yellow());
                    for (field, column) in mapping.pairs() {
                        println!("      {} → {}", field, or_unmapped(column));
                    }
                }
            }
        }
    }

    if let Some(path) = save {
        fs::write(&path, session.mapping_snapshot().to_yaml()?)?;
        println!("\n{}", "✅ Mappings saved".bold().green());
        println!("   File: {}", path.display());
    }
    Ok(())
}

fn or_unmapped(value: &str) -> colored::ColoredString {
    if value.is_empty() {
        "(unmapped)".red()
    } else {
        value.normal()
    }
}

//==============================================================================
// run
//==============================================================================

#[derive(Serialize)]
struct RuleSummary<'a> {
    code: &'a str,
    title: &'a str,
    group: &'a str,
    status: RunStatus,
    issues: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    session: String,
    suite: Suite,
    rules: Vec<RuleSummary<'a>>,
    categories: BTreeMap<String, String>,
}

/// Execute the run command
pub fn run(options: RunOptions) -> AuditResult<()> {
    let mut params = match &options.config {
        Some(path) => RuleParameters::load(path)?,
        None => RuleParameters::default(),
    };
    if options.as_of.is_some() {
        params.as_of = options.as_of;
    }

    let mut session = open_session(&options.session)?;
    session.set_params(params);

    let selected: Vec<String> = if options.rules.is_empty() {
        session.registry().codes().into_iter().map(String::from).collect()
    } else {
        options.rules.clone()
    };

    if !options.json {
        println!("{}", "🔎 Audit bots - Running checks".bold().green());
        println!("   Suite: {}", options.session.suite);
        println!("   Bots selected: {}\n", selected.len());
        if options.verbose {
            let readiness = session.prepare_all()?;
            print_readiness(&readiness);
            println!();
        }
    }

    let report = session.run(&selected);

    if options.json {
        print_json(&session, options.session.suite, &report)?;
    } else {
        print_report(&session, &report);
    }

    if let Some(path) = &options.report {
        let exporter = ReportExporter::new(&report, session.registry());
        exporter.export(path)?;
        if !options.json {
            println!("\n{}", "✅ Report written".bold().green());
            println!("   File: {} ({} sheets)", path.display(), exporter.sheet_count());
        }
    }
    Ok(())
}

fn print_report(session: &Session, report: &RunReport) {
    for outcome in report.outcomes() {
        let issues = match outcome.status {
            RunStatus::Complete if outcome.issues() == 0 => "no issues".green().to_string(),
            RunStatus::Complete => format!("{} issues", outcome.issues()).red().bold().to_string(),
            _ => outcome.error.clone().unwrap_or_default().yellow().to_string(),
        };
        println!(
            "   {} {:<42} {}",
            status_symbol(outcome.status),
            outcome.code.bright_yellow(),
            issues
        );
    }

    let registry = session.registry();
    println!("\n{}", "📊 Categories".bold().cyan());
    for group in registry.groups() {
        println!("   {:<12} {}", group, report.category_status(registry, group));
    }
    println!(
        "\n   Total issues: {}   Failed bots: {}",
        report.total_issues().to_string().bold(),
        report.failed().to_string().bold()
    );
}

fn print_json(session: &Session, suite: Suite, report: &RunReport) -> AuditResult<()> {
    let registry = session.registry();
    let summary = RunSummary {
        session: session.id().to_string(),
        suite,
        rules: report
            .outcomes()
            .iter()
            .map(|o| RuleSummary {
                code: &o.code,
                title: &o.title,
                group: &o.group,
                status: o.status,
                issues: o.issues(),
                error: o.error.as_deref(),
            })
            .collect(),
        categories: registry
            .groups()
            .into_iter()
            .map(|g| (g.to_string(), report.category_status(registry, g).to_string()))
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
