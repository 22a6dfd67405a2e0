use iomanager::cli::{self, Args, Command};
use iomanager::config::{self, PathConfig, Settings};
use iomanager::core::session::{Session, SyncOutcome, SyncPolicy};
use iomanager::core::{ManifestStatus, RowEdit};
use iomanager::publish::{LedgerTracker, ToolTranscoder};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use serde::Serialize;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    // Ensure directories exist
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    let mut settings = Settings::load(&settings_path)?;
    if let Some(root) = &args.project_root {
        settings.project_root = Some(root.clone());
    }
    if let Some(project) = &args.project {
        settings.project = Some(project.clone());
    }
    debug!("Settings: {:?}", settings);

    run(&args, settings, &path_config, &settings_path)
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        // File logging with specified verbosity level
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("calamine", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("calamine", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn run(
    args: &Args,
    settings: Settings,
    path_config: &PathConfig,
    settings_path: &std::path::Path,
) -> Result<ExitCode> {
    let json = args.json;

    if let Command::Config { init } = &args.command {
        if *init {
            settings.save(settings_path)?;
            println!("Wrote {}", settings_path.display());
        }
        println!("# {}", settings_path.display());
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(ExitCode::SUCCESS);
    }

    let ledger_path = config::data_file(&settings.ledger_file, path_config);
    let session = Session::from_settings(settings);

    match &args.command {
        Command::Latest { dir } => match session.latest(dir)? {
            Some(entry) if json => emit(&entry.path)?,
            Some(entry) => println!("{} ({})", entry.path.display(), entry.version),
            None => {
                println!("No catalog in {}", dir.display());
                return Ok(ExitCode::from(3));
            }
        },
        Command::Next { dir } => {
            let path = session.next_catalog_path(dir)?;
            if json {
                emit(&path)?;
            } else {
                println!("{}", path.display());
            }
        }
        Command::Scan { dir } => {
            let sequences = session.scan(dir)?;
            if json {
                emit(&sequences)?;
            } else {
                for seq in &sequences {
                    println!("{}\t{}\t{}", seq.kind, seq.directory.display(), seq);
                }
                println!("{} sequence(s)", sequences.len());
            }
        }
        Command::Status { dir } => {
            let status = session.status(dir)?;
            if json {
                emit(&status)?;
            } else {
                match &status.latest {
                    Some(path) => println!("Latest: {}", path.display()),
                    None => println!("Latest: none"),
                }
                println!("Next:   {}", status.next);
                print_manifest(&status.manifest);
            }
        }
        Command::Sync { dir, regenerate } => {
            let policy = if *regenerate {
                SyncPolicy::Regenerate
            } else {
                SyncPolicy::Report
            };
            let outcome = session.sync(dir, policy)?;
            if json {
                emit(&outcome)?;
            } else {
                print_sync(&outcome);
            }
            if matches!(outcome, SyncOutcome::Stale { .. }) {
                return Ok(ExitCode::from(3));
            }
        }
        Command::Edit { dir, sets } => {
            let edits = cli::row_edits(sets);
            return save(&session, dir, &edits, json);
        }
        Command::Select { dir, rows, uncheck } => {
            let edits: Vec<RowEdit> = rows
                .iter()
                .map(|&row| RowEdit {
                    row,
                    check: Some(!*uncheck),
                    ..Default::default()
                })
                .collect();
            return save(&session, dir, &edits, json);
        }
        Command::Publish { dir, rows, dry_run } => {
            let tools = &session.settings().tools;
            let transcoder = ToolTranscoder {
                ffmpeg: tools.ffmpeg.clone(),
                oiiotool: tools.oiiotool.clone(),
                convert: tools.convert.clone(),
                color_in: session.settings().color_in.clone(),
                color_out: session.settings().color_out.clone(),
            };
            let mut tracker = LedgerTracker::open(&ledger_path)?;
            let report = session.publish(dir, rows, &transcoder, &mut tracker, *dry_run)?;

            if json {
                emit(&report)?;
            } else {
                for p in &report.published {
                    let tag = if *dry_run { "planned" } else { "published" };
                    println!("row {}: {} {} {} -> {}", p.row, tag, p.shot, p.version, p.org_dir.display());
                }
                for f in &report.failed {
                    println!("row {}: FAILED {}: {}", f.row, f.shot, f.error);
                }
                for s in &report.skipped {
                    println!("row {}: skipped: {}", s.row, s.reason);
                }
                if !*dry_run {
                    println!("Tracker ledger: {}", tracker.path().display());
                }
            }
            if !report.failed.is_empty() || !report.skipped.is_empty() {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Config { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn save(session: &Session, dir: &std::path::Path, edits: &[RowEdit], json: bool) -> Result<ExitCode> {
    let outcome = session.save_edits(dir, edits)?;
    if json {
        emit(&outcome)?;
    } else {
        println!("Saved {} ({})", outcome.path.display(), outcome.version);
        for e in &outcome.rejected {
            println!("  check refused: {}", e);
        }
    }
    Ok(if outcome.rejected.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn emit<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_manifest(status: &ManifestStatus) {
    match status {
        ManifestStatus::InSync => println!("Status: in sync"),
        ManifestStatus::NoShots => println!("Status: No Shots"),
        ManifestStatus::Changed { added, removed } => {
            println!("Status: changed");
            for dir in added {
                println!("  + {}", dir);
            }
            for dir in removed {
                println!("  - {}", dir);
            }
        }
    }
}

fn print_sync(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Created { path, records, skipped } => {
            println!("Created {} ({} rows)", path.display(), records);
            for s in skipped {
                println!("  skipped {}: {}", s.scan_name, s.reason);
            }
        }
        SyncOutcome::InSync { path } => println!("Up to date: {}", path.display()),
        SyncOutcome::Stale { path, added, removed } => {
            println!("Out of date: {}", path.display());
            print_manifest(&ManifestStatus::Changed {
                added: added.clone(),
                removed: removed.clone(),
            });
            println!("Run with --regenerate to write a new version");
        }
        SyncOutcome::Regenerated {
            previous,
            path,
            records,
            skipped,
            ..
        } => {
            println!(
                "Regenerated {} -> {} ({} rows)",
                previous.display(),
                path.display(),
                records
            );
            for s in skipped {
                println!("  skipped {}: {}", s.scan_name, s.reason);
            }
        }
    }
}
