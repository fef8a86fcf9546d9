pub mod build;
pub mod config;
pub mod dev;
pub mod serve;
