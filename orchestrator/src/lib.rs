//! kindops Library
//!
//! Template rendering and deployment orchestration for Kubernetes
//! applications: parameter validation, a Go-template style renderer, kubectl
//! and helm backed deployment strategies, and a tracked task pipeline.

pub mod app;
pub mod command;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod params;
pub mod registry;
pub mod render;
pub mod storage;
pub mod tasks;
pub mod utils;
