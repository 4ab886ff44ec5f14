pub mod cache;
pub mod check;
pub mod compress;
pub mod config;
pub mod distributor;
pub mod error;
pub mod job;
pub mod math;
pub mod paths;
pub mod progress;
pub mod worker;
