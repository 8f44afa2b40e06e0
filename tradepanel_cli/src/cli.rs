use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{error, info, warn};
use spinners::{Spinner, Spinners};
use tradepanel::{config::Config, TradePanel};

use crate::display::{display_period_summaries, display_written_datasets};
use crate::error::{TradePanelCliError, TradePanelCliResult};

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const COLLECTING_EXPORTS_STRING: &str = "Collecting export data";
const BUILDING_DISASTERS_STRING: &str = "Building disaster panels";
const PREPARING_DATASETS_STRING: &str = "Preparing econometric datasets";

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(spinner: Option<Spinner>) {
    if let Some(mut s) = spinner {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING)
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    fn run(&self, config: Config) -> TradePanelCliResult<()>;
}

/// The `exports` command collects, validates and caches the export tables.
#[derive(Args, Debug)]
pub struct ExportsCommand {
    #[arg(long, default_value_t = false, help = "Clear cached export tables first")]
    clear_cache: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Refetch missing years from the remote trade source"
    )]
    fetch_missing: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ExportsCommand {
    fn run(&self, config: Config) -> TradePanelCliResult<()> {
        info!("Running `exports` subcommand");
        if self.fetch_missing {
            // Remote fetching needs the trade-data collaborator, which this
            // binary does not ship
            warn!("--fetch-missing requested but no remote fetcher is configured; using local files only");
        }
        let sp = start_spinner(self.quiet, COLLECTING_EXPORTS_STRING);
        let pipeline = TradePanel::new_with_config(config);
        let results = pipeline.collect_exports(self.clear_cache)?;
        stop_spinner(sp);
        display_period_summaries("Exports", &results);
        if results.is_empty() {
            error!("No period could be processed");
            return Err(TradePanelCliError::NoPeriodsProcessed);
        }
        Ok(())
    }
}

/// The `disasters` command builds and caches the per-period disaster panels.
#[derive(Args, Debug)]
pub struct DisastersCommand {
    #[arg(long, default_value_t = false, help = "Clear cached disaster panels first")]
    clear_cache: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DisastersCommand {
    fn run(&self, config: Config) -> TradePanelCliResult<()> {
        info!("Running `disasters` subcommand");
        let sp = start_spinner(self.quiet, BUILDING_DISASTERS_STRING);
        let pipeline = TradePanel::new_with_config(config);
        let results = pipeline.build_disasters(self.clear_cache)?;
        stop_spinner(sp);
        display_period_summaries("Disaster panels", &results);
        if results.is_empty() {
            error!("No period could be processed");
            return Err(TradePanelCliError::NoPeriodsProcessed);
        }
        Ok(())
    }
}

/// The `datasets` command joins the cached tables and writes the final CSVs.
#[derive(Args, Debug)]
pub struct DatasetsCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DatasetsCommand {
    fn run(&self, config: Config) -> TradePanelCliResult<()> {
        info!("Running `datasets` subcommand");
        let sp = start_spinner(self.quiet, PREPARING_DATASETS_STRING);
        let pipeline = TradePanel::new_with_config(config);
        let written = pipeline.emit_datasets()?;
        stop_spinner(sp);
        display_written_datasets(&written);
        if written.is_empty() {
            error!("No period could be processed");
            return Err(TradePanelCliError::NoPeriodsProcessed);
        }
        Ok(())
    }
}

/// The `run` command executes the three data stages in sequence.
#[derive(Args, Debug)]
pub struct RunAllCommand {
    #[arg(long, default_value_t = false, help = "Clear every cached table first")]
    clear_cache: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Refetch missing years from the remote trade source"
    )]
    fetch_missing: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunAllCommand {
    fn run(&self, config: Config) -> TradePanelCliResult<()> {
        info!("Running `run` subcommand");
        // Any stage with zero successfully processed periods fails the run
        ExportsCommand {
            clear_cache: self.clear_cache,
            fetch_missing: self.fetch_missing,
            quiet: self.quiet,
        }
        .run(config.clone())?;
        DisastersCommand {
            clear_cache: self.clear_cache,
            quiet: self.quiet,
        }
        .run(config.clone())?;
        DatasetsCommand { quiet: self.quiet }.run(config)
    }
}

#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Collect and cache export data for every configured period
    Exports(ExportsCommand),
    /// Build and cache the disaster panels
    Disasters(DisastersCommand),
    /// Emit the per-period econometric dataset CSVs
    Datasets(DatasetsCommand),
    /// Run the full pipeline (exports, disasters, datasets)
    Run(RunAllCommand),
}

#[derive(Parser, Debug)]
#[command(version, about = "Country-product-year disaster/trade panel builder", name = "tradepanel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(short, long, global = true, help = "Path to a TOML config file")]
    pub config: Option<std::path::PathBuf>,
    #[arg(short, long, global = true, default_value_t = false, help = "Do not show progress spinners")]
    pub quiet: bool,
}
