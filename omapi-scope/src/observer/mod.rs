//! # Observer Side
//!
//! The consumer process: accepts records from any number of instrumented
//! processes, keeps the most recent ones in a [`RecordStore`](crate::store::RecordStore),
//! prints them and exports them on request.
//!
//! ```text
//! producer ─┐                       ┌──▶ RecordStore (snapshot / export)
//! producer ─┼─▶ Unix socket ─▶ Receiver
//! producer ─┘   (JSON lines)        └──▶ live feed (display)
//! ```

pub mod display;
pub mod export;
pub mod receiver;

pub use display::{format_record, print_record, print_statistics, print_summary};
pub use export::{export_records, export_to_file};
pub use receiver::{decode_line, Receiver, ReceiverStats};
