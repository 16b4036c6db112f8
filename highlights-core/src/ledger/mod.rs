pub mod error;
pub mod models;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use models::{LedgerEntry, LegacyDetail};
pub use store::{ImportReport, SqliteLedger, SqliteLedgerBuilder};
