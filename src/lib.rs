//! Karmabot — karma ledger engine for team chat.

pub mod bot;
pub mod config;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod reactji;
pub mod reply;
pub mod rules;
pub mod transport;
pub mod web;
