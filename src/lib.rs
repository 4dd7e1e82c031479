pub mod classify;
pub mod cli;
pub mod config;
pub mod job;
pub mod message;
pub mod pool;
pub mod report;
pub mod runner;
pub mod shutdown;
pub mod store;
pub mod util;
