//! Reverse Turing Server - authoritative vote-elimination game server
//!
//! Players share a tank of fish, some driven by humans and some by AI, and
//! vote out the fish they believe are AI. Each match is owned by a single
//! task that serializes every vote; clients talk to it over WebSocket.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
