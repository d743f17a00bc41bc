//! Command-line interface

mod config;
mod handlers;

use crate::error::Result;
use crate::CompilerOptions;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub use config::ConfigFile;

pub struct MatrixCli {
    config: ConfigFile,
}

impl Default for MatrixCli {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixCli {
    pub fn new() -> Self {
        Self {
            config: ConfigFile::default(),
        }
    }

    /// Parses the process arguments and runs the chosen command.
    ///
    /// Returns whether every module compiled.
    pub fn run(&mut self) -> Result<bool> {
        let matches = self.build_cli().get_matches();

        if let Some(config_path) = matches.get_one::<String>("config") {
            self.config = config::load(config_path)?;
        }

        self.setup_logging(matches.get_count("verbose"));

        match matches.subcommand() {
            Some(("build", sub_matches)) => handlers::handle_build_command(self, sub_matches),
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(true)
            }
        }
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (.json or .toml)")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count),
            )
            .subcommand(
                project_args(Command::new("build").about("Compile every component under the entry directory"))
                    .arg(Arg::new("watch").short('w').long("watch").help("Watch the entry directory and rebuild on changes").action(ArgAction::SetTrue))
                    .arg(Arg::new("stats").long("stats").help("Print run statistics as JSON").action(ArgAction::SetTrue))
                    .arg(Arg::new("dry-run").long("dry-run").help("Compile without writing any output").action(ArgAction::SetTrue)),
            )
            .subcommand(project_args(
                Command::new("check").about("Compile every component and report problems without writing output"),
            ))
    }

    fn setup_logging(&self, verbose_count: u8) {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
    }

    /// Command-line values win over the config file, which wins over the defaults.
    pub fn build_compiler_options(&self, matches: &ArgMatches) -> CompilerOptions {
        let defaults = CompilerOptions::default();
        let root = matches
            .get_one::<String>("root")
            .cloned()
            .or_else(|| self.config.root.clone())
            .map(PathBuf::from)
            .unwrap_or(defaults.root);
        let entry = matches
            .get_one::<String>("entry")
            .cloned()
            .or_else(|| self.config.entry.clone())
            .unwrap_or(defaults.entry);
        let outdir = matches
            .get_one::<String>("outdir")
            .cloned()
            .or_else(|| self.config.outdir.clone())
            .map(PathBuf::from)
            .unwrap_or(defaults.outdir);
        let library = matches
            .try_get_one::<bool>("library")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
            || self.config.library.unwrap_or(defaults.library);
        let conditions = self.config.conditions.clone().unwrap_or(defaults.conditions);
        let dry_run = matches
            .try_get_one::<bool>("dry-run")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false);

        CompilerOptions {
            root,
            entry,
            outdir,
            write_assets: !dry_run && self.config.write_assets.unwrap_or(defaults.write_assets),
            library,
            conditions,
        }
    }
}

fn project_args(command: Command) -> Command {
    command
        .arg(Arg::new("root").help("Project root").index(1))
        .arg(Arg::new("entry").short('e').long("entry").value_name("DIR").help("Entry directory, relative to the root"))
        .arg(Arg::new("outdir").short('o').long("outdir").value_name("DIR").help("Output directory"))
        .arg(Arg::new("library").long("library").help("Compile loose scripts, styles and companion scripts without markup").action(ArgAction::SetTrue))
}
