//! Editor helpers that work on raw XML text.
//!
//! None of these need a stylesheet to be valid, or even well-formed, to be
//! useful: parameter discovery and tag closing degrade to "nothing found",
//! while locating and pretty printing report why they couldn't do their job.

mod markup;
mod params;
mod pretty;
mod tag_closer;
mod xpath_locator;

pub use params::extract_parameters;
pub use pretty::{pretty_print, PrettyPrintError};
pub use tag_closer::closing_tag;
pub use xpath_locator::{locate, offset_of, LocateError};
