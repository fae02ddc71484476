#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod handlers;
pub mod host_directory;
pub mod logging;
pub mod observer;
pub mod paths;
pub mod relation;
pub mod state;
pub mod system;
pub mod topology;

#[cfg(test)]
mod testing;
