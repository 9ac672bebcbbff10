//! `ctm-dispatch` — discrete-event scheduling for the fluid traffic kernel.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                  |
//! |----------------|-----------------------------------------------------------|
//! | [`event`]      | `Action`, `EventKind`, `Recipient`, `Event`, priorities   |
//! | [`dispatcher`] | `Dispatcher` (`BTreeMap<EventKey, Action>`), `EventHandler` |
//!
//! # Execution model (summary)
//!
//! ```text
//! while !stopped:
//!   pop the minimum (timestamp, priority, sequence) event
//!   current_time = event.timestamp
//!   handler.handle(event, &mut dispatcher)   // may schedule / cancel / stop
//! ```
//!
//! Events run to completion; only not-yet-popped events can be cancelled.
//! Recurring activity (the fluid model's two update chains, periodic
//! controllers) is expressed by the handler re-scheduling its own
//! continuation; nothing repeats implicitly.

pub mod dispatcher;
pub mod event;


pub use dispatcher::{Dispatcher, EventHandler};
pub use event::{Action, Event, EventKind, Recipient, priority};
