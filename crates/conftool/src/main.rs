use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use conftool_core::api::Client;
use conftool_core::config::{self, Config};
use conftool_core::locator;
use conftool_core::page::{Markup, Page};
use conftool_core::report::{Report, ReportFormat};
use conftool_core::tidy::{RuleSet, macro_names};
use conftool_core::walker::{Order, walk};

#[derive(Debug, Parser)]
#[command(
    name = "conftool",
    version,
    about = "Automate Confluence maintenance tasks from the command line"
)]
struct Cli {
    #[arg(short, long, global = true, help = "Be quiet (show only warnings and errors)")]
    quiet: bool,
    #[arg(short, long, global = true, help = "Create extra verbose output")]
    verbose: bool,
    #[arg(long, global = true, value_name = "FILE", help = "Load the given configuration file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Tidy pages after cut&paste migration from other wikis")]
    Tidy(TidyArgs),
    #[command(about = "Print page content markup")]
    Pretty(PrettyArgs),
    #[command(about = "Create status reports (or data exports)")]
    Stats(StatsArgs),
    #[command(name = "rm", about = "Remove contents")]
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
struct TidyArgs {
    #[arg(short = 'R', long, help = "Handle all descendants")]
    recursive: bool,
    #[arg(long, help = "Show the diff but write nothing back")]
    diff_only: bool,
    #[arg(required = true, value_name = "PAGE_URL")]
    pages: Vec<String>,
}

#[derive(Debug, Args)]
struct PrettyArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "FORMAT",
        default_value = "view",
        help = "Markup format (view|editor|storage|export|anon)"
    )]
    format: String,
    #[arg(short = 'R', long, help = "Handle all descendants")]
    recursive: bool,
    #[arg(required = true, value_name = "PAGE_URL")]
    pages: Vec<String>,
}

#[derive(Debug, Args)]
struct StatsArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "FORMAT",
        help = "Output format (defaults to extension of OUTFILE)"
    )]
    format: Option<String>,
    #[arg(short = 'o', long, value_name = "OUTFILE")]
    outfile: Option<PathBuf>,
    #[command(subcommand)]
    command: StatsSubcommand,
}

#[derive(Debug, Subcommand)]
enum StatsSubcommand {
    #[command(about = "Report a page tree as depth/id/title/version rows")]
    Tree {
        #[arg(long, help = "Traverse depth-first instead of breadth-first")]
        dfs: bool,
        #[arg(long, value_name = "N", help = "Fetch at most N children per page")]
        limit: Option<usize>,
        #[arg(value_name = "PAGE_URL")]
        page: String,
    },
    #[command(about = "Report on usage of different entities (macros, ...)")]
    Usage {
        #[arg(long, value_name = "N", default_value_t = 0, help = "Show top N ranked entities")]
        top: usize,
        #[arg(required = true, value_name = "PAGE_URL")]
        pages: Vec<String>,
    },
}

#[derive(Debug, Args)]
struct RemoveArgs {
    #[command(subcommand)]
    command: RemoveSubcommand,
}

#[derive(Debug, Subcommand)]
enum RemoveSubcommand {
    #[command(about = "Remove page(s) including their descendants")]
    Tree {
        #[arg(long, help = "Actually delete; without this flag only report")]
        force: bool,
        #[arg(required = true, value_name = "PAGE_URL")]
        pages: Vec<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let Some(command) = cli.command else {
        let mut root = Cli::command();
        root.print_help()?;
        println!();
        return Ok(());
    };

    let config = load_runtime_config(cli.config.as_deref())?;
    let client = Client::from_config(&config)?;

    match command {
        Commands::Tidy(args) => run_tidy(&client, &args),
        Commands::Pretty(args) => run_pretty(&client, &args),
        Commands::Stats(args) => match &args.command {
            StatsSubcommand::Tree { dfs, limit, page } => {
                run_stats_tree(&client, &args, *dfs, *limit, page)
            }
            StatsSubcommand::Usage { top, pages } => run_stats_usage(&client, &args, *top, pages),
        },
        Commands::Remove(RemoveArgs {
            command: RemoveSubcommand::Tree { force, pages },
        }) => run_remove_tree(&client, force, &pages),
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "conftool={default_level},conftool_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_runtime_config(override_path: Option<&std::path::Path>) -> Result<Config> {
    if let Some(path) = override_path {
        return config::load_config(path);
    }
    match config::default_config_path() {
        Some(path) => config::load_config(&path),
        None => Ok(Config::default()),
    }
}

fn run_tidy(client: &Client, args: &TidyArgs) -> Result<()> {
    let rules = RuleSet::standard();
    for reference in &args.pages {
        let url = locator::resolve(client, reference)?;
        for target in collect_targets(client, &url, args.recursive)? {
            // One broken page must not stop a batch run.
            if let Err(cause) = tidy_one(client, &rules, &target, args.diff_only) {
                error!("API ERROR: {cause:#}");
            }
        }
    }
    Ok(())
}

fn tidy_one(client: &Client, rules: &RuleSet, url: &str, diff_only: bool) -> Result<()> {
    let mut page = Page::load(client, url, Markup::Storage)?;
    let outcome = rules.apply(page.body());
    if !outcome.changed(page.body()) {
        println!("No changes to \"{}\"", page.title());
        return Ok(());
    }
    print!("{}", page.diff(&outcome.body));
    if diff_only {
        return Ok(());
    }
    page.update(client, &outcome.body)?;
    println!("Updated \"{}\" to v. {}", page.title(), page.version());
    Ok(())
}

fn run_pretty(client: &Client, args: &PrettyArgs) -> Result<()> {
    let markup = Markup::parse(&args.format)?;
    for reference in &args.pages {
        let url = locator::resolve(client, reference)?;
        for target in collect_targets(client, &url, args.recursive)? {
            match Page::load(client, &target, markup) {
                Ok(page) => {
                    info!("\"{}\" ({})", page.title(), target);
                    println!("{}", page.body());
                }
                Err(cause) => error!("API ERROR: {cause:#}"),
            }
        }
    }
    Ok(())
}

fn run_stats_tree(
    client: &Client,
    stats: &StatsArgs,
    dfs: bool,
    limit: Option<usize>,
    page: &str,
) -> Result<()> {
    let url = locator::resolve(client, page)?;
    let order = if dfs {
        Order::DepthFirst
    } else {
        Order::BreadthFirst
    };
    let params = vec![("expand".to_string(), "version".to_string())];

    let mut report = Report::new(&["depth", "id", "title", "version"]);
    for item in walk(client, &url, &params, order, limit) {
        let (depth, node) = item?;
        report.push(vec![
            json!(depth),
            json!(node.id().unwrap_or("")),
            json!(node.title().unwrap_or("")),
            json!(node.version().unwrap_or(0)),
        ]);
    }
    write_report(&report, stats)
}

fn run_stats_usage(
    client: &Client,
    stats: &StatsArgs,
    top: usize,
    pages: &[String],
) -> Result<()> {
    let params = vec![("expand".to_string(), "body.storage".to_string())];
    let mut counts = HashMap::<String, usize>::new();
    for reference in pages {
        let url = locator::resolve(client, reference)?;
        for item in walk(client, &url, &params, Order::BreadthFirst, None) {
            let (_, node) = item?;
            let Some(body) = node.body("storage") else {
                continue;
            };
            for name in macro_names(body) {
                *counts.entry(name).or_default() += 1;
            }
        }
    }

    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if top > 0 {
        ranked.truncate(top);
    }

    let mut report = Report::new(&["entity", "count"]);
    for (name, count) in ranked {
        report.push(vec![json!(format!("macro:{name}")), json!(count)]);
    }
    write_report(&report, stats)
}

fn run_remove_tree(client: &Client, force: bool, pages: &[String]) -> Result<()> {
    for reference in pages {
        let url = locator::resolve(client, reference)?;
        let mut collected = Vec::new();
        for item in walk(client, &url, &[], Order::BreadthFirst, None) {
            collected.push(item?);
        }
        // Children go before their parents.
        collected.sort_by(|a, b| b.0.cmp(&a.0));

        if !force {
            println!(
                "Would delete {} page(s) under {url} (pass --force to delete):",
                collected.len()
            );
            for (depth, node) in &collected {
                println!(
                    "  depth {depth}: \"{}\" ({})",
                    node.title().unwrap_or("<untitled>"),
                    node.id().unwrap_or("?")
                );
            }
            continue;
        }

        for (_, node) in &collected {
            let link = node
                .self_link()
                .context("page document is missing _links.self")?;
            client.delete(link)?;
            println!(
                "Deleted \"{}\" ({})",
                node.title().unwrap_or("<untitled>"),
                node.id().unwrap_or("?")
            );
        }
    }
    Ok(())
}

fn collect_targets(client: &Client, url: &str, recursive: bool) -> Result<Vec<String>> {
    if !recursive {
        return Ok(vec![url.to_string()]);
    }
    let mut targets = Vec::new();
    for item in walk(client, url, &[], Order::BreadthFirst, None) {
        let (_, node) = item?;
        let link = node
            .self_link()
            .context("page document is missing _links.self")?;
        targets.push(link.to_string());
    }
    Ok(targets)
}

fn write_report(report: &Report, stats: &StatsArgs) -> Result<()> {
    let format = match &stats.format {
        Some(name) => ReportFormat::parse(name)?,
        None => stats
            .outfile
            .as_deref()
            .and_then(ReportFormat::from_path)
            .unwrap_or_default(),
    };
    match &stats.outfile {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            report.write(&mut file, format)?;
            file.flush()?;
            info!("wrote {} row(s) to {}", report.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            report.write(&mut handle, format)?;
        }
    }
    Ok(())
}
