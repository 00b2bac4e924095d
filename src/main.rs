use anyhow::Result;
use audit_bots::cli::{self, RunOptions, SessionArgs};
use audit_bots::core::Suite;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audit-bots")]
#[command(about = "Map audit workbooks onto canonical fields and run exception-detection bots")]
#[command(long_about = "Audit Bots - rule-based exception detection for audit workbooks

Upload loan dumps, loan books, vendor masters or attendance registers, map
their sheets and columns onto canonical fields, then run a catalogue of
bots that flag exception rows.

COMMANDS:
  sheets   - List the worksheets of a workbook
  columns  - List the header columns of a worksheet
  rules    - List the bots of a suite
  map      - Resolve sheet and column mappings, optionally save them
  run      - Run bots and print or export the results

EXAMPLES:
  audit-bots sheets dump.xlsx
  audit-bots columns book.xlsx \"Loan Book\" --header-row 1
  audit-bots map --input Banking=dump.xlsx --save mappings.yaml
  audit-bots run --input Banking=dump.xlsx --mappings mappings.yaml --report out.xlsx
  audit-bots run --suite enterprise --input MASTER=master.xlsx --rules P2P1,H2R2

Set RUST_LOG=audit_bots=debug for detailed logs.")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionOpts {
    /// Rule suite: banking or enterprise
    #[arg(short, long, default_value = "banking")]
    suite: Suite,

    /// Workbook for a category, as CATEGORY=PATH (repeatable)
    #[arg(short, long = "input", value_parser = cli::parse_input)]
    inputs: Vec<(String, PathBuf)>,

    /// Saved sheet/field mappings (YAML)
    #[arg(short, long)]
    mappings: Option<PathBuf>,
}

impl From<SessionOpts> for SessionArgs {
    fn from(opts: SessionOpts) -> Self {
        SessionArgs {
            suite: opts.suite,
            inputs: opts.inputs,
            mappings: opts.mappings,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the worksheets of a workbook
    Sheets {
        /// Path to workbook (.xlsx, .xlsm, .xlsb, .xls, .ods)
        workbook: PathBuf,
    },

    /// List the header columns of a worksheet
    Columns {
        /// Path to workbook
        workbook: PathBuf,

        /// Worksheet name
        sheet: String,

        /// Zero-based row holding the header
        #[arg(long, default_value = "0")]
        header_row: u32,
    },

    /// List the bots of a suite
    Rules {
        /// Rule suite: banking or enterprise
        #[arg(short, long, default_value = "banking")]
        suite: Suite,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(long_about = "Resolve sheet and column mappings.

Sheets and columns are matched automatically by name (case, spacing and
punctuation are ignored). Saved choices given with --mappings are applied
on top as manual edits. Use --save to write the resulting mappings to a
YAML file that can be edited and passed back with --mappings.")]
    /// Resolve sheet and column mappings
    Map {
        #[command(flatten)]
        session: SessionOpts,

        /// Write the resolved mappings to this YAML file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    #[command(long_about = "Run bots over the mapped workbooks.

Every selected bot runs independently: a bot whose inputs are not mapped,
or that fails, is reported as Failed and the others still run.

THRESHOLDS:
  --config takes a YAML file of rule parameters, e.g.

  provision_threshold_pct: 15
  restructuring_window_days: 730
  as_of: 2025-03-31")]
    /// Run bots and report exceptions
    Run {
        #[command(flatten)]
        session: SessionOpts,

        /// Rule parameters (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reference date for rolling windows (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Comma-separated bot codes (default: all)
        #[arg(short, long, value_delimiter = ',')]
        rules: Vec<String>,

        /// Write an .xlsx report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "audit_bots=debug" } else { "audit_bots=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sheets { workbook } => cli::sheets(workbook)?,

        Commands::Columns {
            workbook,
            sheet,
            header_row,
        } => cli::columns(workbook, sheet, header_row)?,

        Commands::Rules { suite, json } => cli::rules(suite, json)?,

        Commands::Map { session, save } => cli::map(session.into(), save, cli.verbose)?,

        Commands::Run {
            session,
            config,
            as_of,
            rules,
            report,
            json,
        } => cli::run(RunOptions {
            session: session.into(),
            config,
            as_of,
            rules,
            report,
            json,
            verbose: cli.verbose,
        })?,
    }
    Ok(())
}
