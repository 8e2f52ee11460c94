use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid financial year start month {0}: must be between 1 and 12")]
    InvalidStartMonth(u32),

    #[error("Financial year {0} runs past the last representable year")]
    InvalidFinancialYear(i32),

    #[error("Invalid comparison count {requested}: at most {max} previous periods can be selected")]
    InvalidComparisonCount { requested: usize, max: usize },

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("No ledger row with id {0}")]
    UnknownRow(i64),

    #[error("Duplicate ledger row id {0} in snapshot")]
    DuplicateRowId(i64),

    #[error("Row {id} exists in the {present_in} snapshot only")]
    SnapshotMismatch { id: i64, present_in: &'static str },

    #[error("Ledger data has not been loaded for this session")]
    NotLoaded,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("No data retrieved from the ledger service")]
    EmptyLedger,

    #[error("Failed to fetch ledger rows: {0}")]
    FetchFailed(String),

    #[error("Ledger service error: {0}")]
    Remote(String),

    #[error("Amount overflow while summing {0}")]
    AmountOverflow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),


    #[cfg(feature = "remote")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
