// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the handler helpers that do not need parsed arguments
pub use handlers::{
    DATABASE_FILE, analysis_options, config_db_path, load_entities, open_database,
    parse_report_format, rank_buckets, run_analysis, run_export, run_listing, run_report,
    run_reset,
};
