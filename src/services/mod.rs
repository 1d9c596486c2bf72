//! Domain services used by the websocket gateway and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and auth plumbing.

pub mod engine;
pub mod session;
pub mod store;
pub mod sweeper;
