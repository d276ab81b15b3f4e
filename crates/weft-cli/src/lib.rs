//! Weft CLI - command-line front end for the weft instrumentation engine
//!
//! `weft inject` and `weft remove` mirror a source tree into an output tree,
//! `weft list` shows the registered transformers and `weft toolexec` wraps
//! the tools of a `go build -toolexec` invocation.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use weft_core::config::PRESETS;
use weft_core::pipeline::{Injector, RemoveOptions};
use weft_core::toolexec::{ToolInvocation, Toolexec};
use weft_core::{Registry, Report, WeftConfig, Workspace};

/// Environment variable naming the configuration file when `--config` is
/// not given. Useful under `go build -toolexec`.
pub const CONFIG_ENV: &str = "WEFT_CONFIG";

pub fn command() -> Command {
    let tree_args = |cmd: Command| {
        cmd.arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Source tree")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Output tree, must differ from the source")
                .required(true)
                .index(2),
        )
    };

    Command::new("weft")
        .version(weft_core::VERSION)
        .about("Reversible tracing instrumentation for Go programs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("YAML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the report as JSON")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("enable")
                .long("enable")
                .value_name("NAMES")
                .help("Only run these transformers or presets (comma separated)")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("disable")
                .long("disable")
                .value_name("NAMES")
                .help("Skip these transformers or presets (comma separated)")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("no-error-tracing")
                .long("no-error-tracing")
                .help("Do not add error reports to error guards")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(tree_args(Command::new("inject").about("Instrument a source tree")))
        .subcommand(
            tree_args(Command::new("remove").about("Strip generated instrumentation from a tree")).arg(
                Arg::new("strict")
                    .long("strict")
                    .help("Also remove hand-written tracing calls where safe")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(Command::new("list").about("List transformers and presets"))
        .subcommand(
            Command::new("toolexec")
                .about("Wrap a Go build tool: go build -toolexec 'weft toolexec --'")
                .arg(
                    Arg::new("tool")
                        .value_name("TOOL")
                        .help("Tool path followed by its arguments")
                        .required(true)
                        .num_args(1..)
                        .trailing_var_arg(true)
                        .allow_hyphen_values(true),
                ),
        )
}

/// Configuration file plus command-line overrides. Takes the subcommand's
/// matches, which carry the global flags.
pub fn load_config(matches: &ArgMatches) -> Result<WeftConfig> {
    let path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = match path {
        Some(path) => WeftConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
        None => WeftConfig::default(),
    };
    if let Some(names) = matches.get_many::<String>("enable") {
        config.instrumentation.enabled = Some(names.cloned().collect());
    }
    if let Some(names) = matches.get_many::<String>("disable") {
        config.instrumentation.disabled.extend(names.cloned());
    }
    if matches.get_flag("no-error-tracing") {
        config.instrumentation.error_tracing = false;
    }
    Ok(config)
}

fn print_report(report: &Report, json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        writeln!(out, "{}", report.to_json()?)?;
    } else {
        write!(out, "{}", report.render_text())?;
    }
    Ok(())
}

fn list(registry: &Registry, json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        let transformers: Vec<_> = registry
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "family": t.family,
                    "description": t.description,
                    "libraries": t.library_paths(),
                })
            })
            .collect();
        let presets: serde_json::Map<_, _> = PRESETS
            .iter()
            .map(|(name, members)| (name.to_string(), serde_json::json!(members)))
            .collect();
        let value = serde_json::json!({ "transformers": transformers, "presets": presets });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }
    writeln!(out, "Transformers:")?;
    for t in registry.iter() {
        writeln!(out, "  {:<14} {}", t.name, t.description)?;
        for path in t.library_paths() {
            writeln!(out, "  {:<14}   {path}", "")?;
        }
    }
    writeln!(out, "Presets:")?;
    for (name, members) in PRESETS {
        writeln!(out, "  {:<14} {}", name, members.join(", "))?;
    }
    writeln!(out, "  {:<14} every transformer", "all")?;
    Ok(())
}

/// Execute the parsed command line. Returns the process exit code.
pub fn run(matches: &ArgMatches, out: &mut dyn Write) -> Result<i32> {
    let registry = Registry::builtin();
    match matches.subcommand() {
        Some(("list", sub)) => {
            list(&registry, sub.get_flag("json"), out)?;
            Ok(0)
        }
        Some((mode @ ("inject" | "remove"), sub)) => {
            let config = load_config(sub)?;
            let source = sub.get_one::<String>("source").context("missing source")?;
            let output = sub.get_one::<String>("output").context("missing output")?;
            let workspace = Workspace::new(source, output, &registry, &config)?;
            let report = if mode == "inject" {
                workspace.inject()?
            } else {
                workspace.remove(RemoveOptions {
                    strict: sub.get_flag("strict"),
                })?
            };
            print_report(&report, sub.get_flag("json"), out)?;
            Ok(if report.has_errors() { 1 } else { 0 })
        }
        Some(("toolexec", sub)) => {
            let config = load_config(sub)?;
            let args: Vec<String> = sub
                .get_many::<String>("tool")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            let invocation = ToolInvocation::from_args(args)?;
            let injector = Injector::new(&registry, config.inject_options(&registry)?).with_rules(&config.rules);
            Ok(Toolexec::new(injector).run(&invocation)?)
        }
        _ => {
            write!(out, "{}", command().render_help())?;
            Ok(2)
        }
    }
}
