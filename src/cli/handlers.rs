use super::MatrixCli;
use crate::compiler::Compiler;
use crate::error::{CompilerError, Result};
use crate::stats::CompilerStats;
use crate::CompilerOptions;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::{self, Write};
use std::sync::mpsc::channel;
use tokio::runtime::Runtime;

fn runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

// --- BUILD ---
pub fn handle_build_command(cli: &MatrixCli, matches: &clap::ArgMatches) -> Result<bool> {
    let options = cli.build_compiler_options(matches);
    let show_stats = matches.get_flag("stats");

    if matches.get_flag("watch") {
        return watch_and_build(options, show_stats);
    }

    println!(
        "Building {} -> {}",
        options.entry_dir().display(),
        options.output_dir().display()
    );
    let mut compiler = Compiler::with_default_plugins(options);
    log::debug!("plugins: {}", compiler.plugin_names().join(", "));
    let stats = runtime()?.block_on(compiler.run())?;
    report(&mut io::stdout(), &stats, show_stats)?;
    Ok(!stats.has_failures())
}

fn report(out: &mut impl Write, stats: &CompilerStats, show_stats: bool) -> Result<()> {
    if stats.has_failures() {
        writeln!(out, "Build finished with failures")?;
    } else {
        writeln!(out, "Build successful")?;
    }
    writeln!(out, "{}", stats.summary())?;
    if show_stats {
        let json = serde_json::to_string_pretty(stats)
            .map_err(|e| CompilerError::transform("stats", e.to_string()))?;
        writeln!(out, "{}", json)?;
    }
    Ok(())
}

/// Reporting problems must not stop the watcher.
fn report_and_continue(out: &mut impl Write, stats: &CompilerStats, show_stats: bool) {
    if let Err(e) = report(out, stats, show_stats) {
        log::error!("cannot report build results: {}", e);
    }
}

fn watch_and_build(options: CompilerOptions, show_stats: bool) -> Result<bool> {
    let entry_dir = options.entry_dir();
    let output_dir = options.output_dir();
    println!("Watching {} for changes...", entry_dir.display());

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Err(e) = tx.send(event) {
                    eprintln!("Watch error: {}", e);
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| {
        CompilerError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("Failed to create file watcher: {}", e),
        ))
    })?;

    watcher
        .watch(&entry_dir, RecursiveMode::Recursive)
        .map_err(|e| {
            CompilerError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to watch {}: {}", entry_dir.display(), e),
            ))
        })?;

    let runtime = runtime()?;
    let mut compiler = Compiler::with_default_plugins(options);
    match runtime.block_on(compiler.run()) {
        Ok(stats) => report_and_continue(&mut io::stdout(), &stats, show_stats),
        Err(e) => eprintln!("Initial build failed: {}", e),
    }

    loop {
        match rx.recv() {
            Ok(event) => {
                if event.paths.iter().all(|path| path.starts_with(&output_dir)) {
                    continue;
                }
                // Editors emit bursts of events per save.
                while rx.try_recv().is_ok() {}
                println!("File changed, rebuilding...");
                match runtime.block_on(compiler.rebuild()) {
                    Ok(stats) => report_and_continue(&mut io::stdout(), &stats, show_stats),
                    Err(e) => eprintln!("Rebuild failed: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Watch error: {}", e);
                break;
            }
        }
    }

    Ok(true)
}

// --- CHECK ---
pub fn handle_check_command(cli: &MatrixCli, matches: &clap::ArgMatches) -> Result<bool> {
    let options = CompilerOptions {
        write_assets: false,
        ..cli.build_compiler_options(matches)
    };
    println!("Checking {}", options.entry_dir().display());

    let mut compiler = Compiler::with_default_plugins(options);
    let stats = runtime()?.block_on(compiler.run())?;

    for failure in &stats.failed {
        println!(
            "  {} failed in {}: {}",
            failure.module, failure.stage, failure.message
        );
    }
    for diagnostic in &stats.diagnostics {
        println!("  warning: {}", diagnostic.message);
    }
    println!(
        "{} modules checked, {} failed, {} warnings",
        stats.module_count,
        stats.failed.len(),
        stats.diagnostics.len()
    );
    Ok(!stats.has_failures())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_report_failure_is_returned() {
        let stats = CompilerStats::default();
        let err = report(&mut ClosedPipe, &stats, true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn test_watch_reporting_survives_write_errors() {
        let stats = CompilerStats::default();
        report_and_continue(&mut ClosedPipe, &stats, true);

        let mut out = Vec::new();
        report_and_continue(&mut out, &stats, true);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Build successful"));
        assert!(text.contains("\"succeeded\""));
    }
}
