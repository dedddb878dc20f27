pub mod cli;
pub mod cmake;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod matrix;
pub mod options;
pub mod packager;
pub mod pipelines;
pub mod releases;
pub mod runner;
