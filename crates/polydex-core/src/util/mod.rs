//! Identity and key utilities.
//!
//! - [`ids`]: partition ids and the global document id codec
//! - [`packing`]: packed numeric approximations of string sort keys

pub mod ids;
pub mod packing;
