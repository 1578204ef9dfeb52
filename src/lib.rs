//! Quiet Hours - Study session scheduling with email reminders
//!
//! Users book non-overlapping study sessions; a periodic scan mails each
//! owner a reminder shortly before their session starts.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
