// src/lib.rs

#![doc = r#"
# udpt

udpt renders a text template once per eligible network interface and
broadcasts the result as a UDP datagram, either periodically or when a
trigger variable is written. Its configuration lives in named, typed
variables that other processes can change at any time.

## Modules

- [`config`]: Configuration loading and merging from CLI, file, and environment.
- [`error`]: Error taxonomy.
- [`event`]: The events the dispatcher reacts to.
- [`store`]: Variable store boundary, in-memory store, and the engine's local cache.
- [`timer`]: The periodic broadcast timer.
- [`interfaces`]: Interface discovery and allow-list filtering.
- [`network`]: UDP broadcast sends.
- [`template`]: Template rendering into a bounded payload.
- [`stats`]: Transmit/error counters and the metrics report.
- [`cycle`]: One render-and-send pass over every eligible interface.
- [`dispatcher`]: The single-threaded event loop.
- [`web`]: HTTP control surface over the variable store.
"#]

pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod interfaces;
pub mod network;
pub mod stats;
pub mod store;
pub mod template;
pub mod timer;
pub mod web;
