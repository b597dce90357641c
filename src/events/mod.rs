//! # Events Module
//!
//! Progress reporting from the core workflows to whatever presents them.
//!
//! ## Design
//! Workflows emit events through a channel; the CLI drains them on its own
//! thread to drive a progress bar. Without a listener the events are dropped.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Tile(TileEvent::Progress(p)) = event {
//!             println!("{}/{} {}", p.completed, p.total, p.label);
//!         }
//!     }
//! });
//!
//! validator.run_with_events(&location, &mut sink, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;
