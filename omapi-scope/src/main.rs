//! # omapi-scope - Observer Entry Point
//!
//! Listens on the observer socket for records from instrumented processes,
//! prints them as they arrive and, on exit, optionally exports what was kept:
//! - **Live** (default): one block per record on stdout
//! - **Headless** (`--headless --export calls.json`): periodic statistics only

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};

use omapi_scope::cli::Args;
use omapi_scope::observer::{
    export_to_file, print_record, print_statistics, print_summary, Receiver,
};
use omapi_scope::store::RecordStore;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

/// Records buffered between the receiver and the console
const LIVE_FEED_CAPACITY: usize = 1000;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let store = Arc::new(RecordStore::with_capacity(args.capacity));
    let receiver = Receiver::bind(&args.socket, Arc::clone(&store))
        .context("Failed to start observer")?;

    let (receiver, live_rx) = if args.headless {
        (receiver, None)
    } else {
        let (live_tx, live_rx) = bounded(LIVE_FEED_CAPACITY);
        (receiver.with_live_feed(live_tx), Some(live_rx))
    };
    let stats = receiver.stats();

    if !quiet {
        println!("omapi-scope v{}", env!("CARGO_PKG_VERSION"));
        println!("socket: {}", args.socket.display());
        println!("capacity: {}", store.capacity());
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    let receiver_task = tokio::spawn(receiver.run());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let mut stats_timer = Instant::now();
    let mut last_status_time = Instant::now();
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if started.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        if let Some(ref live_rx) = live_rx {
            for record in live_rx.try_iter() {
                print_record(&record, args.verbose);
            }
        }

        if stats.received() == 0 && last_status_time.elapsed() > Duration::from_secs(10) {
            info!("Still waiting for records... (no producer has delivered yet)");
            last_status_time = Instant::now();
        }

        if args.headless && stats_timer.elapsed() > Duration::from_secs(10) {
            print_statistics(store.len(), &stats);
            stats_timer = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // Dropping the receiver removes the socket file
    receiver_task.abort();
    let _ = receiver_task.await;

    if let Some(ref live_rx) = live_rx {
        for record in live_rx.try_iter() {
            print_record(&record, args.verbose);
        }
    }

    if !quiet || args.headless {
        print_summary(exit_reason, started.elapsed(), store.len(), &stats);
    }

    if let Some(export_path) = args.export {
        export_to_file(&store.snapshot(), &export_path)
            .with_context(|| format!("Failed to export records to {}", export_path.display()))?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
