//! press – command-line front end for the template compilation pipeline.
//!
//! Usage:
//!   press compile [project_root] [--templates-dir DIR] [--inline]
//!   press watch   [project_root] [--templates-dir DIR] [--inline]
//!
//! `compile` runs one full pass; `watch` keeps recompiling on change.

use std::{env, path::PathBuf, process};

use pdf_press::{config, watch, Pipeline, ProjectConfig};

fn main() {
    env_logger::Builder::new()
        .filter_level(if config::debug_enabled() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let args: Vec<String> = env::args().collect();

    let mut command: Option<String> = None;
    let mut project_root: Option<PathBuf> = None;
    let mut templates_dir: Option<PathBuf> = None;
    let mut inline = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--templates-dir" | "-d" => match iter.next() {
                Some(v) => templates_dir = Some(PathBuf::from(v)),
                None => {
                    eprintln!("--templates-dir requires a value");
                    process::exit(1);
                }
            },
            "--inline" | "-i" => inline = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            value => {
                if positional == 0 {
                    command = Some(value.to_string());
                } else if positional == 1 {
                    project_root = Some(PathBuf::from(value));
                } else {
                    eprintln!("Unexpected argument: {value}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let command = match command {
        Some(c) => c,
        None => {
            eprintln!("Error: no command specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let root = project_root.unwrap_or_else(|| PathBuf::from("."));
    let mut config = ProjectConfig::new(root);
    if let Some(dir) = templates_dir {
        config = config.with_templates_dir(dir);
    }
    let pipeline = Pipeline::new(config).with_inline_bundles(inline);

    match command.as_str() {
        "compile" => run_compile(pipeline),
        "watch" => {
            if let Err(e) = watch::watch(pipeline) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(&args[0]);
            process::exit(1);
        }
    }
}

fn run_compile(mut pipeline: Pipeline) {
    match pipeline.compile_all() {
        Ok(summary) => {
            eprintln!(
                "Compiled {} template{} ({} class{}, {} bytes of css)",
                summary.templates,
                if summary.templates == 1 { "" } else { "s" },
                summary.classes,
                if summary.classes == 1 { "" } else { "es" },
                summary.css_bytes
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("press – template compilation pipeline (pdf-press)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} compile [project_root] [--templates-dir DIR] [--inline]");
    eprintln!("  {prog} watch   [project_root] [--templates-dir DIR] [--inline]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compile        Run one full pre-compilation pass");
    eprintln!("  watch          Recompile whenever templates change");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --templates-dir, -d   Templates directory (default: <root>/templates)");
    eprintln!("  --inline, -i          Embed bundle code in the manifest (serverless)");
    eprintln!("  --help                Print this message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {}=0     Disable pre-compilation", config::PRECOMPILE_ENV);
    eprintln!("  {}=1          Verbose pipeline logging", config::DEBUG_ENV);
}
