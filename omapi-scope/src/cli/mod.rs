//! Command-line interface of the observer binary

pub mod args;

pub use args::Args;
