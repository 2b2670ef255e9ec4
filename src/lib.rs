//! Session core for the UNIMIND peer-support chat: anonymous matching, the
//! chat session store, and the HTTP/SSE surface a front end drives it through.

pub mod api;
pub mod auth;
pub mod bus;
pub mod chat;
pub mod config;
pub mod counterpart;
pub mod entity;
pub mod error;
pub mod latency;
pub mod manager;
pub mod matching;
pub mod moderation;
pub mod store;
