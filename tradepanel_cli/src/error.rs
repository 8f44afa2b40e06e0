use polars::error::PolarsError;
use tradepanel::error::PanelError;

#[derive(thiserror::Error, Debug)]
pub enum TradePanelCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error("tradepanel error")]
    PanelError(#[from] PanelError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
    #[error("No period produced a non-empty result")]
    NoPeriodsProcessed,
}

pub type TradePanelCliResult<T> = Result<T, TradePanelCliError>;
