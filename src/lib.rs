//! BLE session library
//! A Bluetooth Low Energy central that scans for, connects to and mirrors the
//! characteristics of peripherals exposing a configured set of services.

pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
