//! # Event Bus Module
//!
//! Fan-out of events from the protocol engine, calibration router and work
//! process to every connected observer.
//!
//! ## Overview
//!
//! - [`Event`] is the tagged record every component produces
//! - [`Broadcaster`] keeps the observer registry and prunes dead observers
//! - [`EventSink`] / [`EventBridge`] move events from any thread onto the
//!   async runtime, preserving order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use megg_core::event_bus::{Broadcaster, Event, EventBridge};
//! use std::sync::Arc;
//!
//! let broadcaster = Arc::new(Broadcaster::new());
//! let (observer, mut inbox) = broadcaster.register();
//! let (sink, _bridge) = EventBridge::spawn(broadcaster.clone());
//!
//! // From any thread
//! sink.emit(Event::pong());
//!
//! // In the observer's writer task
//! while let Some(json) = inbox.recv().await {
//!     socket.send(json).await?;
//! }
//! broadcaster.unregister(observer);
//! ```

mod bridge;
mod bus;
mod events;

pub use bridge::*;
pub use bus::*;
pub use events::*;
