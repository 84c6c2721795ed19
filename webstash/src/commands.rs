use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("webstash")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("webstash")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("archive")
                .about(
                    "Capture a website as a self-contained, browsable offline snapshot, \
                starting from one URL.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start archiving from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-r --"root" <PATH>)
                        .required(false)
                        .help("Directory that holds all snapshots")
                        .default_value("~/.webstash/archives"),
                )
                .arg(
                    arg!(-t --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async fetch workers in the worker pool.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum crawl depth from the start page")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("domains")
                .about("List domains that have at least one snapshot")
                .arg(
                    arg!(-r --"root" <PATH>)
                        .required(false)
                        .help("Directory that holds all snapshots")
                        .default_value("~/.webstash/archives"),
                ),
        )
        .subcommand(
            command!("captures")
                .about(
                    "List a domain's snapshots, newest first, with the change percentage \
                against each one's predecessor.",
                )
                .arg(
                    arg!(-d --"domain" <DOMAIN>)
                        .required(true)
                        .help("The archived domain label, e.g. example.com"),
                )
                .arg(
                    arg!(-r --"root" <PATH>)
                        .required(false)
                        .help("Directory that holds all snapshots")
                        .default_value("~/.webstash/archives"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("show")
                .about("Show where a single snapshot lives on disk")
                .arg(
                    arg!(-d --"domain" <DOMAIN>)
                        .required(true)
                        .help("The archived domain label, e.g. example.com"),
                )
                .arg(
                    arg!(-c --"capture" <CAPTURE_ID>)
                        .required(true)
                        .help("The capture timestamp in milliseconds")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    arg!(-r --"root" <PATH>)
                        .required(false)
                        .help("Directory that holds all snapshots")
                        .default_value("~/.webstash/archives"),
                ),
        )
}
