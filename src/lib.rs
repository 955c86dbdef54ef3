pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod index;
pub mod layout;
pub mod output;
pub mod store;
pub mod tui;
