//! Client-facing TCP service.
//!
//! The protocol has no request: a client connects, reads one line holding a
//! decimal ID (or `-1` once issuance has stopped) and the server closes the
//! connection.
//!
//! ## Structure
//!
//! - [`listener`] - Accept loop and connection draining (`serve`).
//! - [`handler`] - Writes one response per connection.
//! - [`rollover`] - Persists the reserved seed on every counter rollover.

pub mod handler;
pub mod listener;
pub mod rollover;
