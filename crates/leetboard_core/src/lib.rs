pub mod config;
pub mod export;
pub mod fetch;
pub mod filesystem;
pub mod merge;
pub mod pins;
pub mod pipeline;
pub mod record;
pub mod roster;
pub mod runtime;
pub mod scheduler;
pub mod snapshot;
