//! # omapi-scope - OMAPI Call Capture and Telemetry
//!
//! omapi-scope observes calls an application makes to the Open Mobile API
//! (the secure-element API: sessions, channels, APDU transmits) from inside the
//! application's own process, without changing what those calls do. Each call
//! becomes a structured [`CallRecord`](record::CallRecord) that is kept in a
//! bounded local store and shipped, best-effort, to a separate observer process.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Instrumented Process (any thread)               │
//! │        interception host: before(call) / after(call)            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ raw arguments / results
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         hooks                                   │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Correlator  │   │    Codec     │   │   Channel    │         │
//! │  │ (entry/exit) │   │  (APDU hex)  │   │  Registry    │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │                         │                                       │
//! │                         ▼                                       │
//! │                  Telemetry::emit                                │
//! │             ┌───────────┴───────────┐                           │
//! │             ▼                       ▼                           │
//! │      ┌──────────────┐       ┌──────────────┐                    │
//! │      │ RecordStore  │       │  Transport   │── worker thread ──┐│
//! │      └──────────────┘       └──────────────┘                   ││
//! │  StackTraceFilter: hides these frames from the app's own       ││
//! │  stack queries                                                 ││
//! └────────────────────────────────────────────────────────────────┼┘
//!                                     JSON lines over Unix socket  │
//!                         ┌────────────────────────────────────────┘
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Observer Process (`omapi-scope` binary)            │
//! │       Receiver ──▶ RecordStore ──▶ display / JSON export        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Instrumented side
//!
//! - [`hooks`]: adapters the interception host calls on entry and exit
//! - [`capture`]: per-invocation correlation, channel registry, stack capture
//!   and filtering, and the panic boundary every hook runs inside
//! - [`codec`]: APDU command/response segmentation
//! - [`record`]: the immutable call record and its builder
//! - [`telemetry`]: record assembly and fan-out to sinks
//! - [`transport`]: non-blocking delivery to the observer
//! - [`config`]: source identity, socket path, verbosity toggle
//!
//! ### Observer side
//!
//! - [`observer`]: socket receiver, console display, JSON export
//! - [`cli`]: command-line arguments of the observer binary
//!
//! ### Shared
//!
//! - [`store`]: bounded, thread-safe record ring
//! - [`domain`]: newtypes (Pid, Tid, `CallSiteId`) and error types
//!
//! ## Guarantees
//!
//! - Nothing raised inside a hook reaches the observed call. Faults become
//!   error-tagged records or are dropped.
//! - Delivery is at-most-once. An unreachable observer means dropped records,
//!   never a blocked caller.
//! - The store holds at most its capacity; the oldest record is evicted first.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Start the observer, then launch the instrumented application
//! omapi-scope --export calls.json
//!
//! # Instrumented side: reduced payloads only
//! OMAPI_SCOPE_REDUCED=1 <instrumented app>
//! ```

pub mod capture;
pub mod cli;
pub mod codec;
pub mod config;
pub mod domain;
pub mod hooks;
pub mod observer;
pub mod record;
pub mod store;
pub mod telemetry;
pub mod transport;
