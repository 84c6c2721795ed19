use chrono::{DateTime, Utc};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use webstash_archiver::archiver::{ArchiveConfig, Archiver};
use webstash_archiver::store::SnapshotStore;
use webstash_core::index::ArchiveIndex;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        webstash_core::print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    match chosen_command.subcommand() {
        Some(("archive", primary_command)) => handle_archive(primary_command).await,
        Some(("domains", primary_command)) => handle_domains(primary_command).await,
        Some(("captures", primary_command)) => handle_captures(primary_command).await,
        Some(("show", primary_command)) => handle_show(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

/// Build a store rooted at the --root argument, with ~ expanded.
fn store_from_args(args: &ArgMatches) -> SnapshotStore {
    let root = args.get_one::<String>("root").unwrap();
    let expanded = shellexpand::tilde(root);
    SnapshotStore::new(PathBuf::from(expanded.as_ref()))
}

fn format_capture_time(capture_id: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(capture_id)
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| capture_id.to_string())
}

async fn handle_archive(args: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let url = args.get_one::<Url>("url").unwrap();
    let workers = *args.get_one::<usize>("workers").unwrap_or(&5);
    let depth = *args.get_one::<usize>("depth").unwrap_or(&3);
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&10);
    let format = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let store = store_from_args(args);

    let config = ArchiveConfig {
        max_concurrency: workers,
        max_depth: depth,
        request_timeout: Duration::from_secs(timeout),
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Capturing {url}..."));

    // Counter for tracking fetched URLs
    let fetched_count = Arc::new(AtomicUsize::new(0));

    let spinner_clone = spinner.clone();
    let count_clone = fetched_count.clone();
    let progress_callback = Arc::new(move |_worker_id: usize, url: String| {
        let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
        let path = Url::parse(&url)
            .map(|u| u.path().to_string())
            .unwrap_or(url);
        spinner_clone.set_message(format!("Capturing... {count} URLs fetched ({path})"));
        spinner_clone.tick();
    });

    let archiver =
        Archiver::with_config(store, config).with_progress_callback(progress_callback);

    match archiver.archive(url.as_str()).await {
        Ok(metadata) => {
            let total = fetched_count.load(Ordering::Relaxed);
            spinner.finish_with_message(format!("Capture complete! {total} URLs fetched"));

            if format == "json" {
                match serde_json::to_string_pretty(&metadata) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Failed to encode metadata: {e}"),
                }
                return;
            }

            println!();
            println!("  Domain:    {}", metadata.domain);
            println!(
                "  Capture:   {} ({})",
                metadata.capture_id,
                format_capture_time(metadata.capture_id)
            );
            println!("  Location:  {}", metadata.root_path.display());
            println!("  Pages:     {}", metadata.pages.len());
            println!("  Assets:    {}", metadata.assets.len());
            if metadata.errors.is_empty() {
                println!("  Errors:    0");
            } else {
                println!(
                    "  Errors:    {}",
                    metadata.errors.len().to_string().yellow()
                );
                for error in &metadata.errors {
                    println!("    {} {}: {}", "!".red(), error.url, error.message);
                }
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("{} Capture failed: {e}", "✗".red());
            std::process::exit(1);
        }
    }
}

async fn handle_domains(args: &ArgMatches) {
    let store = store_from_args(args);
    let index = ArchiveIndex::new(store);

    match index.list_domains().await {
        Ok(domains) if domains.is_empty() => println!("No snapshots yet."),
        Ok(domains) => {
            for domain in domains {
                println!("{domain}");
            }
        }
        Err(e) => {
            eprintln!("{} Failed to list domains: {e}", "✗".red());
            std::process::exit(1);
        }
    }
}

async fn handle_captures(args: &ArgMatches) {
    let domain = args.get_one::<String>("domain").unwrap();
    let format = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let store = store_from_args(args);
    let index = ArchiveIndex::new(store);

    let captures = match index.list_captures(domain).await {
        Ok(captures) => captures,
        Err(e) => {
            eprintln!("{} Failed to list captures for {domain}: {e}", "✗".red());
            std::process::exit(1);
        }
    };

    if format == "json" {
        match serde_json::to_string_pretty(&captures) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to encode captures: {e}"),
        }
        return;
    }

    if captures.is_empty() {
        println!("No snapshots for {domain}.");
        return;
    }

    println!("{}", domain.bold());
    for capture in captures {
        let change = if capture.changed {
            format!("{:.1}% changed", capture.percent_difference)
                .yellow()
                .to_string()
        } else {
            "unchanged".green().to_string()
        };
        println!(
            "  {}  {}  {}",
            capture.capture_id,
            format_capture_time(capture.capture_id),
            change
        );
    }
}

async fn handle_show(args: &ArgMatches) {
    let domain = args.get_one::<String>("domain").unwrap();
    let capture_id = *args.get_one::<i64>("capture").unwrap();
    let store = store_from_args(args);
    let index = ArchiveIndex::new(store);

    match index.get_capture(domain, capture_id).await {
        Ok(Some(capture)) => {
            println!(
                "{}  {}",
                capture.relative_path,
                format_capture_time(capture.capture_id)
            );
            println!(
                "{}",
                index
                    .store()
                    .capture_root(domain, capture_id)
                    .display()
            );
        }
        Ok(None) => {
            eprintln!("Capture {capture_id} not found for {domain}.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} Failed to read capture: {e}", "✗".red());
            std::process::exit(1);
        }
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
