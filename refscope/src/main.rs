use commands::command_argument_builder;
use refscope::handlers::{
    handle_analyze, handle_export, handle_init, handle_report, handle_reset, handle_runs,
};
use refscope_core::print_banner;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        None => {}
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("analyze", primary_command)) => handle_analyze(primary_command).await,
        Some(("report", primary_command)) => handle_report(primary_command),
        Some(("export", primary_command)) => handle_export(primary_command),
        Some(("runs", primary_command)) => handle_runs(primary_command),
        Some(("reset", primary_command)) => handle_reset(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
