pub mod accumulator;
pub mod agent;
pub mod config;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod sandbox;
pub mod swarm;
