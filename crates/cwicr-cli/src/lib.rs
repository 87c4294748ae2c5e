//! Shared CLI definitions for cwicr.
//!
//! Used by the binary, the build script (manpage) and the gen_docs binary
//! (options table in markdown).

use clap::{CommandFactory, Parser};
use std::path::PathBuf;

/// Command-line arguments for cwicr
#[derive(Clone, Parser, Debug)]
#[command(
    name = "cwicr",
    version,
    about = "Construction cost browser for the terminal",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    /// Region key to open (e.g. DE_BERLIN). Defaults to [display] default_region
    #[arg(value_name = "REGION")]
    pub region: Option<String>,

    /// Use this directory instead of the platform config directory
    #[arg(long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Free-text filter, e.g. "cost > 100, category concrete"
    #[arg(long = "query", short = 'q', value_name = "TEXT")]
    pub query: Option<String>,

    /// Case-insensitive search over description, code and category
    #[arg(long = "search", short = 's', value_name = "TEXT")]
    pub search: Option<String>,

    /// Sort by a field, optionally descending: cost, total:desc
    #[arg(long = "sort", value_name = "FIELD[:desc]")]
    pub sort: Option<String>,

    /// Run the query without the terminal UI and print the result as JSON
    #[arg(long = "json", action)]
    pub json: bool,

    /// Maximum number of rows printed with --json (the total is always reported)
    #[arg(long = "limit", value_name = "N", requires = "json")]
    pub limit: Option<usize>,

    /// Enable debug mode: verbose log and an info line in the UI
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Clear all cache data and exit
    #[arg(long = "clear-cache", action)]
    pub clear_cache: bool,

    /// Write the default configuration file to the config directory and exit
    #[arg(long = "write-default-config", action)]
    pub write_default_config: bool,

    /// Overwrite an existing config file when using --write-default-config
    #[arg(long = "force", requires = "write_default_config", action)]
    pub force: bool,

    /// Print the configured regions and exit
    #[arg(long = "list-regions", action)]
    pub list_regions: bool,
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn placeholder(arg: &clap::Arg) -> Option<String> {
    let names = arg.get_value_names()?;
    let parts: Vec<String> = names.iter().map(|n| format!("<{}>", n.as_str())).collect();
    Some(parts.join(" "))
}

/// `[<REGION>]` for positionals, `-q, --query <TEXT>` for options.
fn option_label(arg: &clap::Arg) -> String {
    if arg.is_positional() {
        let name = placeholder(arg).unwrap_or_default();
        return if arg.is_required_set() {
            name
        } else {
            format!("[{}]", name)
        };
    }
    let flags: Vec<String> = arg
        .get_short()
        .map(|c| format!("-{}", c))
        .into_iter()
        .chain(arg.get_long().map(|l| format!("--{}", l)))
        .collect();
    let flags = flags.join(", ");
    match placeholder(arg).filter(|_| arg.get_action().takes_values()) {
        Some(value) if !value.is_empty() => format!("{} {}", flags, value),
        _ => flags,
    }
}

/// Usage line plus an options table, for the docs generator.
pub fn render_options_markdown() -> String {
    use std::fmt::Write;

    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::new();
    let _ = writeln!(out, "# cwicr options\n");
    let _ = writeln!(out, "```\n{}\n```\n", cmd.render_usage());
    let _ = writeln!(out, "| Option | Description |");
    let _ = writeln!(out, "|--------|-------------|");
    for arg in cmd
        .get_arguments()
        .filter(|a| !matches!(a.get_id().as_str(), "help" | "version"))
    {
        let help = arg
            .get_help()
            .map(|h| table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "| `{}` | {} |", option_label(arg), help);
    }
    out
}
