pub mod chat;
pub mod employee;
pub mod websocket;
