// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! braid CLI - runs the bundled channel demos.

mod demos;
mod output;

use std::env;
use std::process;

use braid_rt::{Builder, RuntimeConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Options accepted by `braid run`.
#[derive(Debug, Default)]
struct RunOptions {
    seed: Option<u64>,
    config: Option<String>,
    max_routines: Option<usize>,
    quiet: bool,
}

fn main() {
    output::init();
    init_tracing();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "list" => cmd_list(),
        "run" => {
            if args.len() < 3 {
                eprintln!("Usage: braid run <demo> [--seed N] [--config FILE] [--max-routines N]");
                process::exit(1);
            }
            let opts = parse_run_options(&args[3..]);
            cmd_run(&args[2], &opts);
        }
        "all" => {
            let opts = parse_run_options(&args[2..]);
            for (name, _) in demos::DEMOS {
                cmd_run(name, &opts);
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "version" | "--version" | "-V" => {
            println!("braid {}", env!("CARGO_PKG_VERSION"));
        }
        other => {
            // Treat as a demo name
            if demos::exists(other) {
                let opts = parse_run_options(&args[2..]);
                cmd_run(other, &opts);
            } else {
                eprintln!("Unknown command: {}", other);
                print_usage();
                process::exit(1);
            }
        }
    }
}

/// Log filter from `BRAID_LOG`, default `warn`. Logs go to stderr so demo
/// output stays clean.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("BRAID_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn print_usage() {
    println!("braid {} - cooperative routines, channels and select", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: braid <command> [args]");
    println!();
    println!("Commands:");
    println!("  list              List the bundled demos");
    println!("  run <demo>        Run one demo");
    println!("  all               Run every demo in turn");
    println!("  help              Show this help");
    println!("  version           Show version");
    println!();
    println!("Options for run/all:");
    println!("  --seed N          Seed select's random choice");
    println!("  --config FILE     Load runtime settings from a TOML file");
    println!("  --max-routines N  Cap the number of live routines");
    println!("  --quiet           Skip the result banner");
    println!();
    println!("Set BRAID_LOG (e.g. BRAID_LOG=braid_rt=trace) to see runtime logs.");
}

fn parse_run_options(args: &[String]) -> RunOptions {
    let mut opts = RunOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                opts.seed = Some(parse_value(args, i, "--seed"));
                i += 2;
            }
            "--max-routines" => {
                opts.max_routines = Some(parse_value(args, i, "--max-routines"));
                i += 2;
            }
            "--config" => {
                let Some(path) = args.get(i + 1) else {
                    eprintln!("{}: --config needs a file path", output::error_label());
                    process::exit(1);
                };
                opts.config = Some(path.clone());
                i += 2;
            }
            "--quiet" | "-q" => {
                opts.quiet = true;
                i += 1;
            }
            other => {
                eprintln!("{}: unknown option {}", output::error_label(), other);
                process::exit(1);
            }
        }
    }
    opts
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|s| s.parse::<T>()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("{}: {} needs a number", output::error_label(), flag);
            process::exit(1);
        }
    }
}

fn cmd_list() {
    for (name, about) in demos::DEMOS {
        println!("  {:<14} {}", output::demo_name(name), output::dimmed(about));
    }
}

fn cmd_run(name: &str, opts: &RunOptions) {
    if !demos::exists(name) {
        eprintln!("{}: no demo named '{}'", output::error_label(), name);
        eprintln!("Run 'braid list' to see the available demos.");
        process::exit(1);
    }

    let mut config = match &opts.config {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}: {}", output::error_label(), e);
                process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };
    if let Some(seed) = opts.seed {
        config.seed = Some(seed);
    }
    if let Some(limit) = opts.max_routines {
        config.max_routines = Some(limit);
    }

    let runtime = match Builder::from_config(config).build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };

    tracing::debug!(demo = name, config = ?runtime.config(), "running demo");
    if !opts.quiet {
        println!("{}", output::dimmed(&format!("--- {} ---", name)));
    }
    match runtime.block_on(demos::run(name)) {
        Ok(Ok(())) => {
            if !opts.quiet {
                println!("{}", output::banner_ok(name));
            }
        }
        Ok(Err(e)) | Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            eprintln!("{}", output::banner_fail(name));
            process::exit(1);
        }
    }
}
