//! HTTP request handlers.

pub mod admin;
pub mod credits;
pub mod health;
pub mod keys;
pub mod reports;
pub mod widget;
