//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own board state, fan-out and persistence so route handlers
//! can stay focused on protocol translation.

pub mod board;
pub mod eviction;
pub mod hub;
pub mod persistence;
pub mod review;
pub mod store;
