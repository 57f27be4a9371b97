//! nomad-notifier: republishes Nomad deployment and allocation events to Slack
//! and Discord, editing one message per entity as its state changes.

pub mod app;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod core;
pub mod dispatcher;
pub mod formatting;
pub mod internal_metrics;
pub mod network;
pub mod notification;
pub mod tracker;
