//! Rendering of match reports

pub mod formatter;
pub mod report;

pub use formatter::{formatter_for, save_csv_companion, save_report, ConsoleFormatter, CsvFormatter, JsonFormatter, OutputFormat, OutputFormatter};
pub use report::MatchDocument;
