use crate::admin;
use crate::cmp::CmpLookup;
use crate::data::Database;
use crate::error::AnalysisError;
use crate::ranking::TrancoRanking;
use crate::sanity::SanityLedger;
use crate::summary::DomainSummary;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use refscope_scanner::{PageRecord, PageVisit, analyze_page};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prefix of crawl output directories: `data.<domain>`.
pub const DATA_DIR_PREFIX: &str = "data.";

/// JSON files in a data directory that are not page records.
const NON_PAGE_PREFIXES: [&str; 3] = ["links", "admin", "metadata"];

/// Options for configuring an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub data_root: PathBuf,
    pub workers: usize,
    /// Directories with fewer page files are skipped.
    pub min_pages: usize,
    pub write_admin: bool,
    pub tranco_file: Option<PathBuf>,
    /// Where crawler `*.log` files live; defaults to the data root.
    pub cmp_log_dir: Option<PathBuf>,
    pub show_progress_bars: bool,
}

impl AnalysisOptions {
    pub fn new(data_root: &Path) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            workers: 4,
            min_pages: 2,
            write_admin: false,
            tranco_file: None,
            cmp_log_dir: None,
            show_progress_bars: false,
        }
    }
}

/// Read-only lookups shared by all directory tasks.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub ranking: Option<TrancoRanking>,
    pub cmp: CmpLookup,
}

impl AnalysisContext {
    pub fn load(options: &AnalysisOptions) -> Result<Self, AnalysisError> {
        let ranking = options
            .tranco_file
            .as_deref()
            .map(TrancoRanking::from_file)
            .transpose()?;
        let log_dir = options.cmp_log_dir.as_deref().unwrap_or(&options.data_root);
        let cmp = CmpLookup::from_log_dir(log_dir)?;

        Ok(Self { ranking, cmp })
    }

    pub fn rank(&self, domain: &str) -> Option<usize> {
        self.ranking.as_ref().and_then(|r| r.rank(domain))
    }
}

/// Files found in one data directory.
#[derive(Debug, Clone, Default)]
pub struct DataFiles {
    pub pages: Vec<PathBuf>,
    pub skipped: usize,
    pub admin: Option<PathBuf>,
}

/// Result of analyzing one data directory.
#[derive(Debug, Clone)]
pub struct DirectoryOutcome {
    pub domain: String,
    /// `None` when the directory held too few pages to be analyzed.
    pub summary: Option<DomainSummary>,
    pub records: Vec<PageRecord>,
    pub ledger: SanityLedger,
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub ledger: SanityLedger,
    pub domains: usize,
    pub pages: usize,
    pub failed_directories: Vec<(PathBuf, String)>,
}

/// Callback for reporting analysis progress
pub type AnalysisProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

pub fn domain_of_dir(dir: &Path) -> Option<String> {
    dir.file_name()?
        .to_str()?
        .strip_prefix(DATA_DIR_PREFIX)
        .filter(|domain| !domain.is_empty())
        .map(str::to_string)
}

/// All `data.<domain>` directories directly under `root`, sorted by name.
pub fn discover_data_dirs(root: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    if !root.is_dir() {
        return Err(AnalysisError::MissingDataRoot(root.to_path_buf()));
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && domain_of_dir(path).is_some())
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub fn list_data_files(dir: &Path) -> Result<DataFiles, AnalysisError> {
    let mut files = DataFiles::default();

    let mut json_files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    json_files.sort();

    for path in json_files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if NON_PAGE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            files.skipped += 1;
            if files.admin.is_none() && name.starts_with("admin.") {
                files.admin = Some(path);
            }
        } else {
            files.pages.push(path);
        }
    }

    Ok(files)
}

/// Analyze every page of one data directory. Blocking; runs on its own task.
pub fn analyze_directory(
    dir: &Path,
    context: &AnalysisContext,
    options: &AnalysisOptions,
) -> Result<DirectoryOutcome, AnalysisError> {
    let domain = domain_of_dir(dir).unwrap_or_default();
    let mut ledger = SanityLedger::new();
    ledger.directories += 1;

    let files = list_data_files(dir)?;
    ledger.skipped_files += files.skipped as u64;

    if files.pages.len() < options.min_pages {
        debug!("Skipping {}: {} page files", dir.display(), files.pages.len());
        ledger.invalid_directories += 1;
        return Ok(DirectoryOutcome {
            domain,
            summary: None,
            records: Vec::new(),
            ledger,
        });
    }
    ledger.record_page_count(files.pages.len());

    if let Some(admin_file) = &files.admin {
        let visited = admin::visited_count(admin_file)?;
        ledger.record_results_ratio(files.pages.len(), visited);
    }

    let mut summary = DomainSummary::new(&domain, context.rank(&domain));
    let mut records = Vec::new();

    for path in &files.pages {
        ledger.files += 1;

        let visit = match PageVisit::from_file(path) {
            Ok(visit) => visit,
            Err(e) => {
                warn!("Skipping malformed page file {}: {}", path.display(), e);
                ledger.malformed_files += 1;
                continue;
            }
        };

        if let Err(rejection) = visit.validate() {
            debug!("Rejected {} ({})", path.display(), rejection);
            ledger.record_rejection(rejection);
            continue;
        }

        let analysis = analyze_page(&visit, context.cmp.lookup(&visit.final_url));
        summary.add_page(&analysis);
        records.push(analysis.to_record());
    }

    if options.write_admin {
        let admin_file = files
            .admin
            .as_deref()
            .ok_or_else(|| AnalysisError::MissingAdminFile(dir.to_path_buf()))?;
        admin::append_results(admin_file, &records)?;
    }

    Ok(DirectoryOutcome {
        domain,
        summary: Some(summary),
        records,
        ledger,
    })
}

/// Store one directory's results under `run_id`.
pub fn store_outcome(db: &Database, run_id: &str, outcome: &DirectoryOutcome) -> Result<(), AnalysisError> {
    let Some(summary) = &outcome.summary else {
        return Ok(());
    };

    db.insert_domain_summary(run_id, summary)?;
    for record in &outcome.records {
        db.insert_page_record(run_id, &outcome.domain, record)?;
    }
    Ok(())
}

/// Execute an analysis run over every data directory under the data root.
///
/// Directories are analyzed on at most `workers` blocking tasks. Their
/// outcomes are folded in arrival order by this task alone, which hands each
/// to `collect` (typically [`store_outcome`]). A directory that fails is
/// logged and listed in the report; the run continues.
///
/// An error from `collect` aborts the run. Directories not yet started are
/// skipped, and the tasks already running are awaited before the error is
/// returned, so no admin file is written after this function returns.
pub async fn execute_analysis<F>(
    options: AnalysisOptions,
    context: Arc<AnalysisContext>,
    progress_callback: Option<AnalysisProgressCallback>,
    mut collect: F,
) -> Result<AnalysisReport, AnalysisError>
where
    F: FnMut(&DirectoryOutcome) -> Result<(), AnalysisError>,
{
    let dirs = discover_data_dirs(&options.data_root)?;
    let total = dirs.len();
    info!("Analyzing {} data directories under {}", total, options.data_root.display());

    let progress_bar = options.show_progress_bars.then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting analysis...");
        pb
    });

    let workers = options.workers.max(1);
    let options = Arc::new(options);
    let aborted = Arc::new(AtomicBool::new(false));
    let mut outcomes = stream::iter(dirs.into_iter().map(|dir| {
        let context = Arc::clone(&context);
        let options = Arc::clone(&options);
        let aborted = Arc::clone(&aborted);
        tokio::task::spawn_blocking(move || {
            if aborted.load(Ordering::SeqCst) {
                return (dir, None);
            }
            let outcome = analyze_directory(&dir, &context, &options);
            (dir, Some(outcome))
        })
    }))
    .buffer_unordered(workers);

    let mut report = AnalysisReport::default();
    let mut processed = 0;
    let mut collect_error = None;

    while let Some(joined) = outcomes.next().await {
        processed += 1;
        if let Some(pb) = &progress_bar {
            pb.set_message(format!("Analyzing... {}/{} directories", processed, total));
        }

        let (dir, outcome) = match joined {
            Ok((dir, Some(outcome))) => (dir, outcome),
            Ok((dir, None)) => {
                debug!("Skipped {} after abort", dir.display());
                continue;
            }
            Err(e) => {
                warn!("Analysis task failed: {}", e);
                report
                    .failed_directories
                    .push((PathBuf::new(), e.to_string()));
                continue;
            }
        };

        match outcome {
            Ok(outcome) => {
                if collect_error.is_some() {
                    continue;
                }
                report.ledger.merge(&outcome.ledger);
                if outcome.summary.is_some() {
                    report.domains += 1;
                    report.pages += outcome.records.len();
                }
                if let Err(e) = collect(&outcome) {
                    warn!("Aborting analysis: {}", e);
                    aborted.store(true, Ordering::SeqCst);
                    collect_error = Some(e);
                }
            }
            Err(e) => {
                warn!("Failed to analyze {}: {}", dir.display(), e);
                if let Some(ref callback) = progress_callback {
                    callback(format!("[!]  Failed to analyze {}: {}", dir.display(), e));
                }
                report.failed_directories.push((dir, e.to_string()));
            }
        }
    }

    if let Some(e) = collect_error {
        if let Some(pb) = &progress_bar {
            pb.abandon_with_message("Analysis aborted");
        }
        return Err(e);
    }

    if let Some(pb) = &progress_bar {
        pb.finish_with_message(format!(
            "Analysis complete! {} domains, {} pages",
            report.domains, report.pages
        ));
    }

    Ok(report)
}

/// Empty the `results` array of every admin file under `root`.
/// Returns the number of admin files cleared.
pub fn reset_admin_results(root: &Path) -> Result<usize, AnalysisError> {
    let mut cleared = 0;
    for dir in discover_data_dirs(root)? {
        match admin::find_admin_file(&dir)? {
            Some(path) => {
                admin::clear_results(&path)?;
                cleared += 1;
            }
            None => debug!("No admin file in {}", dir.display()),
        }
    }
    Ok(cleared)
}
