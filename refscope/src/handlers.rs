use anyhow::{Context, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use refscope_core::analysis::{
    AnalysisContext, AnalysisOptions, AnalysisReport, execute_analysis, reset_admin_results,
    store_outcome,
};
use refscope_core::counter::RankBuckets;
use refscope_core::data::{Database, RunInfo};
use refscope_core::entities::EntityMap;
use refscope_core::export::{save_corpus_csv, save_policies_json};
use refscope_core::report::{
    ReportFormat, ReportOptions, gather_report_data, render_report, save_report,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const DATABASE_FILE: &str = "refscope.db";

/// Path of the database inside a (possibly `~`-prefixed) configuration directory.
pub fn config_db_path(config_dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(config_dir);
    Path::new(expanded.as_ref()).join(DATABASE_FILE)
}

/// Open an existing database; refuses to create one implicitly.
pub fn open_database(db_path: &Path) -> Result<Database, String> {
    if !Database::exists(db_path) {
        return Err(format!(
            "No database at {}. Run `refscope init` first",
            db_path.display()
        ));
    }
    Database::new(db_path).map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

pub fn parse_report_format(format: &str) -> Result<ReportFormat, String> {
    ReportFormat::from_str(format).ok_or_else(|| format!("Unknown report format '{}'", format))
}

pub fn rank_buckets(width: usize, count: usize) -> Result<RankBuckets, String> {
    if width == 0 || count == 0 {
        return Err("Rank buckets need a non-zero width and count".to_string());
    }
    Ok(RankBuckets::new(width, count))
}

pub fn load_entities(path: Option<&PathBuf>) -> Result<Option<EntityMap>, String> {
    let Some(path) = path else {
        return Ok(None);
    };
    let map = EntityMap::from_file(path)
        .map_err(|e| format!("Failed to load entity map {}: {}", path.display(), e))?;
    if map.is_empty() {
        return Err(format!("Entity map {} has no entries", path.display()));
    }
    Ok(Some(map))
}

/// Validate the analysis arguments and turn them into options.
pub fn analysis_options(
    data_root: &Path,
    workers: usize,
    min_pages: usize,
    tranco: Option<&PathBuf>,
    cmp_logs: Option<&PathBuf>,
    write_admin: bool,
) -> Result<AnalysisOptions, String> {
    if !data_root.is_dir() {
        return Err(format!("Data root {} is not a directory", data_root.display()));
    }
    if workers == 0 {
        return Err("--workers must be at least 1".to_string());
    }
    if let Some(path) = tranco
        && !path.is_file()
    {
        return Err(format!("Tranco list {} not found", path.display()));
    }
    if let Some(path) = cmp_logs
        && !path.is_dir()
    {
        return Err(format!("CMP log directory {} not found", path.display()));
    }

    let mut options = AnalysisOptions::new(data_root);
    options.workers = workers;
    options.min_pages = min_pages;
    options.tranco_file = tranco.cloned();
    options.cmp_log_dir = cmp_logs.cloned();
    options.write_admin = write_admin;
    Ok(options)
}

fn describe_options(options: &AnalysisOptions) -> String {
    serde_json::json!({
        "workers": options.workers,
        "min_pages": options.min_pages,
        "write_admin": options.write_admin,
        "tranco_file": options.tranco_file.as_ref().map(|p| p.display().to_string()),
        "cmp_log_dir": options.cmp_log_dir.as_ref().map(|p| p.display().to_string()),
    })
    .to_string()
}

/// Run a full analysis into `db`. Returns the run id and the run totals.
///
/// The run is marked completed on success and failed if the batch aborts.
pub async fn run_analysis(
    db: &Database,
    options: AnalysisOptions,
) -> anyhow::Result<(String, AnalysisReport)> {
    let context = AnalysisContext::load(&options).context("Failed to load analysis inputs")?;
    let run_id = db
        .create_run(
            &options.data_root.display().to_string(),
            Some(&describe_options(&options)),
        )
        .context("Failed to create analysis run")?;
    info!("Created analysis run {}", run_id);

    let progress_callback = Arc::new(|msg: String| {
        println!("{}", msg);
    });

    let result = execute_analysis(
        options,
        Arc::new(context),
        Some(progress_callback),
        |outcome| store_outcome(db, &run_id, outcome),
    )
    .await;

    match result {
        Ok(report) => {
            db.complete_run(&run_id)
                .context("Failed to mark run as completed")?;
            Ok((run_id, report))
        }
        Err(e) => {
            db.fail_run(&run_id).context("Failed to mark run as failed")?;
            Err(anyhow::Error::new(e).context(format!("Analysis run {} failed", run_id)))
        }
    }
}

/// Render the report of `run_id` (or the latest completed run).
pub fn run_report(
    db: &Database,
    run_id: Option<&str>,
    entities: Option<&EntityMap>,
    options: &ReportOptions,
    format: ReportFormat,
) -> anyhow::Result<String> {
    let report = gather_report_data(db, run_id, entities, options)
        .context("Failed to build report")?
        .ok_or_else(|| match run_id {
            Some(id) => anyhow!("No analysis run with id {}", id),
            None => anyhow!("No completed analysis run found"),
        })?;
    Ok(render_report(&report, format)?)
}

fn resolve_run(db: &Database, run_id: Option<&str>) -> anyhow::Result<RunInfo> {
    let run = match run_id {
        Some(id) => db.get_run(id)?,
        None => db.latest_run()?,
    };
    run.ok_or_else(|| anyhow!("No analysis run found"))
}

/// Write the requested exports. Returns the number of corpus rows exported.
pub fn run_export(
    db: &Database,
    run_id: Option<&str>,
    csv: Option<&Path>,
    policies: Option<&Path>,
) -> anyhow::Result<usize> {
    if csv.is_none() && policies.is_none() {
        return Err(anyhow!("Nothing to export: pass --csv and/or --policies"));
    }

    let run = resolve_run(db, run_id)?;
    let summaries = db
        .get_domain_summaries(&run.id)
        .with_context(|| format!("Failed to load corpus rows of run {}", run.id))?;

    if let Some(path) = csv {
        save_corpus_csv(path, &summaries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = policies {
        save_policies_json(path, &summaries)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(summaries.len())
}

/// Clear admin results under `data_root` and every stored run.
/// Returns (admin files cleared, runs removed).
pub fn run_reset(db: &Database, data_root: &Path) -> anyhow::Result<(usize, usize)> {
    let cleared = reset_admin_results(data_root)
        .with_context(|| format!("Failed to reset admin files under {}", data_root.display()))?;
    let runs = db.clear_results().context("Failed to clear stored results")?;
    Ok((cleared, runs))
}

/// Every stored run with the number of its pages that leaked the page URL.
pub fn run_listing(db: &Database) -> anyhow::Result<Vec<(RunInfo, i64)>> {
    db.list_runs()
        .context("Failed to list runs")?
        .into_iter()
        .map(|run| {
            let leaking = db
                .count_leaking_pages(&run.id)
                .with_context(|| format!("Failed to count pages of run {}", run.id))?;
            Ok((run, leaking))
        })
        .collect()
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> String {
    print!("{} ", msg.bright_cyan().bold());
    let _ = io::stdout().flush();
    let mut response = String::new();
    if io::stdin().read_line(&mut response).is_err() {
        return String::new();
    }
    response.trim().to_lowercase()
}

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "✗".red().bold(), message);
    std::process::exit(1);
}

fn database_from_args(args: &ArgMatches) -> Database {
    let config_dir = args
        .get_one::<String>("db")
        .map(String::as_str)
        .unwrap_or("~/.config/refscope/");
    open_database(&config_db_path(config_dir)).unwrap_or_else(|e| exit_with(e))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .try_init();
}

pub fn handle_init(args: &ArgMatches) {
    print_divider();
    println!("{}", "  REFSCOPE INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or("~/.config/refscope/");
    let force = args.get_flag("force");
    let db_loc = config_db_path(config_dir);
    let db_path = db_loc.as_path();
    let Some(refscope_config_dir) = db_path.parent() else {
        exit_with("Invalid database path");
    };

    println!(
        "{} Target: {}",
        "→".blue(),
        refscope_config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:");
            println!();

            if response != "y" && response != "yes" {
                println!("{} Keeping existing database", "→".blue());
                return;
            }
        } else {
            println!(
                "{} Deleting existing database (force mode)",
                "→".yellow().bold()
            );
        }

        if let Err(e) = Database::drop(db_path) {
            exit_with(format!("Failed to remove {}: {}", db_path.display(), e));
        }
        println!("{} Existing database removed", "✓".green().bold());
        println!();
    }

    println!("{} Creating directory structure...", "→".blue());
    if let Err(e) = fs::create_dir_all(refscope_config_dir) {
        exit_with(format!(
            "Failed to create config directory {}: {}",
            refscope_config_dir.display(),
            e
        ));
    }

    println!("{} Creating database...", "→".blue());
    if let Err(e) = Database::new(db_path) {
        exit_with(format!("Failed to create database: {}", e));
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config directory: {}",
        "✓".green().bold(),
        refscope_config_dir.display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
}

pub async fn handle_analyze(args: &ArgMatches) {
    init_tracing();

    let Some(data_root) = args.get_one::<PathBuf>("DATA_ROOT") else {
        exit_with("DATA_ROOT is required");
    };
    let workers = *args.get_one::<usize>("workers").unwrap_or(&4);
    let min_pages = *args.get_one::<usize>("min-pages").unwrap_or(&2);

    let mut options = analysis_options(
        data_root,
        workers,
        min_pages,
        args.get_one::<PathBuf>("tranco"),
        args.get_one::<PathBuf>("cmp-logs"),
        args.get_flag("write-admin"),
    )
    .unwrap_or_else(|e| exit_with(e));
    options.show_progress_bars = true;

    let db = database_from_args(args);

    println!("\n🔎 Analyzing {}", data_root.display());
    println!("Workers: {}", options.workers);
    println!("Minimum pages per site: {}", options.min_pages);
    println!(
        "Admin files: {}\n",
        if options.write_admin { "updated" } else { "untouched" }
    );

    let (run_id, report) = match run_analysis(&db, options).await {
        Ok(result) => result,
        Err(e) => exit_with(format!("Analysis failed: {:#}", e)),
    };

    println!("\n{} Analysis complete!\n", "✓".green().bold());
    print_divider();
    println!("{}", "  SANITY CHECKS".bright_white().bold());
    print_divider();
    println!("{}", report.ledger);

    if !report.failed_directories.is_empty() {
        println!("{}", "⚠ Directories that failed".yellow().bold());
        for (dir, error) in &report.failed_directories {
            println!("  {} {}: {}", "•".yellow(), dir.display(), error);
        }
        println!();
    }

    println!(
        "{} Run {}: {} sites, {} pages stored",
        "✓".green().bold(),
        run_id.bright_white(),
        report.domains.to_string().cyan(),
        report.pages.to_string().cyan()
    );
}

pub fn handle_report(args: &ArgMatches) {
    let format = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = parse_report_format(format).unwrap_or_else(|e| exit_with(e));
    let buckets = rank_buckets(
        *args.get_one::<usize>("bucket-width").unwrap_or(&12000),
        *args.get_one::<usize>("buckets").unwrap_or(&5),
    )
    .unwrap_or_else(|e| exit_with(e));
    let options = ReportOptions {
        top: *args.get_one::<usize>("top").unwrap_or(&10),
        buckets,
    };
    let entities = load_entities(args.get_one::<PathBuf>("entities")).unwrap_or_else(|e| exit_with(e));
    let run_id = args.get_one::<String>("run").map(String::as_str);

    let db = database_from_args(args);
    let report = run_report(&db, run_id, entities.as_ref(), &options, format)
        .unwrap_or_else(|e| exit_with(format!("{:#}", e)));

    match args.get_one::<PathBuf>("output") {
        Some(path) => match save_report(&report, path) {
            Ok(()) => println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            ),
            Err(e) => exit_with(format!("Failed to save report: {}", e)),
        },
        None => print!("{}", report),
    }
}

pub fn handle_export(args: &ArgMatches) {
    let run_id = args.get_one::<String>("run").map(String::as_str);
    let csv = args.get_one::<PathBuf>("csv");
    let policies = args.get_one::<PathBuf>("policies");

    let db = database_from_args(args);
    let rows = run_export(&db, run_id, csv.map(PathBuf::as_path), policies.map(PathBuf::as_path))
        .unwrap_or_else(|e| exit_with(format!("{:#}", e)));

    println!("{} Exported {} sites", "✓".green().bold(), rows.to_string().cyan());
    for path in csv.into_iter().chain(policies) {
        println!("  {} {}", "•".blue(), path.display().to_string().bright_white());
    }
}

pub fn handle_runs(args: &ArgMatches) {
    let db = database_from_args(args);
    let runs = run_listing(&db).unwrap_or_else(|e| exit_with(format!("{:#}", e)));

    if runs.is_empty() {
        println!("No analysis runs stored");
        return;
    }
    for (run, leaking) in runs {
        let status = match run.status.as_str() {
            "completed" => run.status.green(),
            "failed" => run.status.red(),
            _ => run.status.yellow(),
        };
        println!(
            "{}  {:<10} {:>6} leaking pages  {}",
            run.id.bright_white(),
            status,
            leaking,
            run.data_root
        );
    }
}

pub fn handle_reset(args: &ArgMatches) {
    let Some(data_root) = args.get_one::<PathBuf>("DATA_ROOT") else {
        exit_with("DATA_ROOT is required");
    };

    if !args.get_flag("force") {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("This clears the results of every admin file under:");
        println!(
            "  {} {}",
            "•".yellow(),
            data_root.display().to_string().bright_white()
        );
        println!("and removes every stored analysis run.");
        println!();

        let response = print_prompt("Do you want to continue? [y/N]:");
        if response != "y" && response != "yes" {
            println!("{} Reset cancelled.", "✗".red().bold());
            return;
        }
    }

    let db = database_from_args(args);
    let (cleared, runs) = run_reset(&db, data_root).unwrap_or_else(|e| exit_with(format!("{:#}", e)));

    println!(
        "{} Cleared {} admin files and {} stored runs",
        "✓".green().bold(),
        cleared.to_string().cyan(),
        runs.to_string().cyan()
    );
}
