//! Chatosi chat server library.
//! This crate exposes internal modules for integration testing and for the
//! headless client in [`client`]. The binary entry point is in main.rs.

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod media;
pub mod proto;
pub mod routes;
pub mod state;
pub mod ws;
