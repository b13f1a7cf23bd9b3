pub mod adapters;
pub mod cleaner;
pub mod config;
pub mod export;
pub mod fetch;
pub mod harness;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod store;
