//! `stampweave` command-line tool
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use stampweave_core::logging::{self, LoggingConfig};
use stampweave_core::{Weaver, WeaverConfig};
use std::path::PathBuf;

fn cli() -> Command {
    let artifact = Arg::new("artifact")
        .value_name("ARTIFACT")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Compiled module to process");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print the report as JSON and log as JSON");
    let config = Arg::new("config")
        .long("config")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file");

    Command::new("stampweave")
        .version(stampweave_core::VERSION)
        .about("Rewrites timestamp-with-offset properties into persisted string columns")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("weave")
                .about("Rewrite the artifact in place, keeping a .bak copy")
                .arg(artifact.clone())
                .arg(config.clone())
                .arg(
                    Arg::new("search-dir")
                        .long("search-dir")
                        .value_name("DIR")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Extra directory searched for referenced libraries"),
                )
                .arg(
                    Arg::new("no-symbols")
                        .long("no-symbols")
                        .action(ArgAction::SetTrue)
                        .help("Ignore the debugging-symbol companion"),
                )
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("inspect")
                .about("List flagged properties without changing anything")
                .arg(artifact)
                .arg(config)
                .arg(json),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<WeaverConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => WeaverConfig::load(path)?,
        None => WeaverConfig::new(),
    };
    if let Ok(Some(dirs)) = args.try_get_many::<PathBuf>("search-dir") {
        config.search_dirs.extend(dirs.cloned());
    }
    if args.try_get_one::<bool>("no-symbols").ok().flatten().copied().unwrap_or(false) {
        config.read_symbols = false;
    }
    Ok(config)
}

fn artifact(args: &ArgMatches) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>("artifact")
        .cloned()
        .context("missing ARTIFACT argument")
}

fn weave(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = artifact(args)?;
    let weaver = Weaver::new(load_config(args)?)?;
    if !args.get_flag("json") {
        return Ok(weaver.execute(&path));
    }
    match weaver.run(&path) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
        Err(e) => {
            let failure = serde_json::json!({
                "success": false,
                "category": e.category(),
                "artifact_untouched": e.artifact_untouched(),
                "message": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&failure)?);
            Ok(false)
        }
    }
}

fn inspect(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = artifact(args)?;
    let weaver = Weaver::new(load_config(args)?)?;
    let flagged = weaver
        .inspect(&path)
        .with_context(|| format!("inspecting {}", path.display()))?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&flagged)?);
        return Ok(true);
    }
    if flagged.is_empty() {
        println!("{}: no flagged properties", path.display());
    }
    for property in &flagged {
        println!(
            "{}::{}  format={:?}  keep_original={}",
            property.type_name, property.property, property.options.format, property.options.keep_original
        );
    }
    Ok(true)
}

fn run(matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("weave", args)) => weave(args),
        Some(("inspect", args)) => inspect(args),
        _ => Ok(false),
    }
}

fn main() {
    let matches = cli().get_matches();
    let json_logs = matches
        .subcommand()
        .is_some_and(|(_, args)| args.get_flag("json"));
    if let Err(e) = logging::init(&LoggingConfig::default().with_json_logs(json_logs)) {
        eprintln!("warning: logging unavailable: {e}");
    }

    let code = match run(&matches) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}
