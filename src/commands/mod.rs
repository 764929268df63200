pub mod clear;
pub mod config;
pub mod logs;
pub mod serve;
pub mod things;
