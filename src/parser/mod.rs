//! Header value parsing.

pub mod date;
