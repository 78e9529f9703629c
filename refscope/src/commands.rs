use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

fn database_arg() -> clap::Arg {
    arg!(-d --"db" <PATH>)
        .required(false)
        .help("Configuration directory holding refscope.db")
        .default_value("~/.config/refscope/")
}

fn run_arg() -> clap::Arg {
    arg!(-r --"run" <RUN_ID>)
        .required(false)
        .help("Analysis run to use (default: latest completed run)")
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("refscope")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("refscope")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the refscope database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the refscope database")
                        .default_value("~/.config/refscope/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("analyze")
                .about(
                    "Analyze a crawl corpus for referrer leakage. Stores one row per crawled \
                site in the database.",
                )
                .arg(
                    arg!(<DATA_ROOT>)
                        .help("Directory holding the data.<domain> crawl directories")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(database_arg())
                .arg(
                    arg!(-t --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Number of directories analyzed concurrently")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(--"min-pages" <COUNT>)
                        .required(false)
                        .help("Skip directories with fewer page files")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"tranco" <PATH>)
                        .required(false)
                        .help("Tranco list used to rank sites (rank,domain lines)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"cmp-logs" <PATH>)
                        .required(false)
                        .help("Directory of crawler *.log files (default: DATA_ROOT)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"write-admin")
                        .required(false)
                        .help("Append per-page results to each directory's admin file")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("report")
                .about("Render the aggregate report of an analysis run")
                .arg(database_arg())
                .arg(run_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv")
                        .value_parser(["text", "json", "csv"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"top" <N>)
                        .required(false)
                        .help("Entries kept per table")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"bucket-width" <RANKS>)
                        .required(false)
                        .help("Width of each rank bucket")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("12000"),
                )
                .arg(
                    arg!(--"buckets" <COUNT>)
                        .required(false)
                        .help("Number of rank buckets")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(-e --"entities" <PATH>)
                        .required(false)
                        .help("Entity map used to group domains into organizations")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("export")
                .about("Export the corpus rows and policy summaries of an analysis run")
                .arg(database_arg())
                .arg(run_arg())
                .arg(
                    arg!(--"csv" <PATH>)
                        .required(false)
                        .help("Write corpus rows as CSV")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"policies" <PATH>)
                        .required(false)
                        .help("Write per-site referrer-policy summaries as JSON")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("runs")
                .about("List analysis runs stored in the database")
                .arg(database_arg()),
        )
        .subcommand(
            command!("reset")
                .about("Clear admin-file results under DATA_ROOT and all stored runs")
                .arg(
                    arg!(<DATA_ROOT>)
                        .help("Directory holding the data.<domain> crawl directories")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(database_arg())
                .arg(
                    arg!(-f --"force")
                        .required(false)
                        .help("Do not ask for confirmation")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
