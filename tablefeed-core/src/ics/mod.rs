//! Reading and writing the iCalendar wire format.

pub mod generate;
pub mod parse;

pub use generate::event_block;
pub use parse::parse_document;

use thiserror::Error;

/// Errors from rendering an event into its wire-format block.
#[derive(Error, Debug)]
pub enum IcsError {
    #[error("rendered calendar is missing its VEVENT block")]
    MissingEventBlock,
}
