//! WebSocket module for client relay sessions

mod connection;

pub use connection::ws_handler;
