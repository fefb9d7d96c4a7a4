pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod output;
pub mod provider;
pub mod store;
pub mod webdriver;
