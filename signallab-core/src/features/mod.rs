//! Rolling feature/label windows and their history collaborator.

pub mod day_table;
pub mod history;
pub mod sample_store;

pub use day_table::DayTable;
pub use history::{validate_history, HistoryError, HistoryProvider};
pub use sample_store::{BarOutcome, SampleStore, TrainingSet, WarmUpOutcome};
