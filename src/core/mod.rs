// Core modules implementing resolution, extraction, cleanup, and error modeling.
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod extract;
pub mod platform;
pub mod resolver;
pub mod resource;
pub mod version;
