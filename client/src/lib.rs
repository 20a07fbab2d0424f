//! # SA-MP RCON Client Library
//!
//! Client-side implementation of the SA-MP remote-console query protocol:
//! authenticate with a shared password, send a console command over UDP,
//! and collect whatever lines the server streams back.
//!
//! The protocol gives no delivery guarantees. A response is zero or more
//! datagrams, each carrying one line of console text behind an echo of the
//! request header, and the only way to know the server is done talking is
//! that it stops. The client therefore runs every exchange against an
//! inactivity timer: each validated fragment re-arms the timer, and when
//! it fires the exchange is complete. Datagrams whose header does not
//! byte-match the request are foreign or spoofed and are dropped without
//! touching the timer, so a flood of junk cannot keep an exchange alive.
//!
//! ## Module Organization
//!
//! ### Channel Module (`channel`)
//! Owns the UDP socket and one resolved server endpoint, and performs one
//! logical exchange at a time: encode and send the request, then race the
//! socket against the inactivity deadline, accumulating validated
//! fragments in arrival order.
//!
//! ### Session Module (`session`)
//! Drives the channel in one-shot mode (one command, print, exit) or
//! interactive mode (prompt, read a line, exchange, print, repeat until
//! EOF), and decides which failures are fatal in each mode.

pub mod channel;
pub mod session;
