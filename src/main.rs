// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! ep-scan command line.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use ep_scan::analyse::{load_behavior, PermComparer, WorkloadPermAnalyser};
use ep_scan::config::Config;
use ep_scan::issue::ScanReport;
use ep_scan::project::{ProjectFolder, FILENAME_CALLSITES, FILENAME_ISSUES, FILENAME_MATCHED_PODS};
use ep_scan::{logging, PolicyContext, RecordStore};

fn print_help() {
    eprintln!(r#"ep-scan: excessive-permission scanner for Kubernetes workloads

USAGE:
    ep-scan [COMMAND] [OPTIONS]

COMMANDS:
    scan <ROOT> [PROJECT] [--config PATH]   Scan every project under ROOT (or just PROJECT)
    perms <CONF_DIR> [--config PATH]        Print the permissions each workload is granted
    help                                    Show this help message
    version                                 Show version info

PROJECT LAYOUT:
    <ROOT>/<PROJECT>/conf/                  Kubernetes manifests (*.yaml, *.yml)
    <ROOT>/<PROJECT>/cache/codeql.csv       Observed API call sites
    <ROOT>/<PROJECT>/cache/matched_pod.json Workload to entrypoint matches
    <ROOT>/<PROJECT>/result/issues.json     Written by `scan`

LOGGING:
    RUST_LOG overrides [general].log_level from the config file.
"#);
}

fn print_version() {
    eprintln!("ep-scan v{}", env!("CARGO_PKG_VERSION"));
}

/// Split `--config PATH` out of the argument list.
fn take_config_flag(args: &[String]) -> Result<(Option<PathBuf>, Vec<String>)> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            }
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((config, rest))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let subcommand = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest_args: Vec<String> = args.iter().skip(2).cloned().collect();

    match subcommand {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            print_version();
            Ok(())
        }
        "scan" => {
            let (config_path, positional) = take_config_flag(&rest_args)?;
            let config = Config::load_or_default(config_path.as_deref())?;
            logging::init(&config.general.log_level);
            let Some(root) = positional.first() else {
                print_help();
                bail!("scan: missing project root");
            };
            run_scan(Path::new(root), positional.get(1).map(String::as_str), &config)
        }
        "perms" => {
            let (config_path, positional) = take_config_flag(&rest_args)?;
            let config = Config::load_or_default(config_path.as_deref())?;
            logging::init(&config.general.log_level);
            let Some(conf_dir) = positional.first() else {
                print_help();
                bail!("perms: missing configuration directory");
            };
            run_perms(Path::new(conf_dir), &config)
        }
        other => {
            print_help();
            bail!("unknown command: {}", other)
        }
    }
}

fn run_scan(root: &Path, only: Option<&str>, config: &Config) -> Result<()> {
    let ctx = PolicyContext::from_config(&config.catalog)?;
    let folder = ProjectFolder::new(root);

    let projects = match only {
        Some(name) => vec![name.to_string()],
        None => folder.projects()?,
    };

    let mut failed = 0;
    for project in &projects {
        let span = tracing::info_span!("project", name = %project);
        let _enter = span.enter();
        match scan_project(&folder, project, &ctx, config) {
            Ok(count) => tracing::info!(issues = count, "project scanned"),
            Err(e) => {
                failed += 1;
                tracing::error!(error = %format!("{:#}", e), "project scan failed");
            }
        }
    }

    eprintln!("Scanned {} project(s), {} failed", projects.len(), failed);
    Ok(())
}

/// Scan one project. No report is written unless both sides could be built.
fn scan_project(folder: &ProjectFolder, project: &str, ctx: &PolicyContext, config: &Config) -> Result<usize> {
    let store = RecordStore::from_config_dir(&folder.conf(project)?)?;

    let right = load_behavior(
        &store,
        &folder.cache(project, FILENAME_CALLSITES)?,
        &folder.cache(project, FILENAME_MATCHED_PODS)?,
    )
    .context("Failed to load behavior results, cannot diff permissions")?;

    let left = WorkloadPermAnalyser::new(ctx).analyse(&store);

    let issues = PermComparer::new(&left, &right, &ctx.sensitive).scan_ep();
    for issue in &issues {
        println!("{}", issue);
    }

    let count = issues.len();
    let out = folder.result(project, FILENAME_ISSUES)?;
    ScanReport::new(project, left.len(), issues)
        .with_files(store.loaded_files())
        .write(&out, config.output.pretty)
        .with_context(|| format!("Failed to save issues for {}", project))?;
    Ok(count)
}

fn run_perms(conf_dir: &Path, config: &Config) -> Result<()> {
    let ctx = PolicyContext::from_config(&config.catalog)?;
    let store = RecordStore::from_config_dir(conf_dir)?;

    for result in WorkloadPermAnalyser::new(&ctx).analyse(&store) {
        println!(
            "{} (serviceAccount: {})",
            result.workload.id(),
            result.workload.service_account_name()
        );
        for perm in &result.perms {
            println!("    {}", perm);
        }
    }
    Ok(())
}
