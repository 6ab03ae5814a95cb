//! bulk-relay — chat-operated bulk messaging service.
//!
//! A user authenticates in a conversation, supplies recipient numbers
//! (typed or uploaded) and one or more message bodies, then triggers a
//! throttled broadcast over the messaging gateway. A secondary bulk-mail
//! channel and a REST surface ride alongside.

pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod phone;
pub mod session;
pub mod transport;
