pub mod analyzers;
pub mod classify;
pub mod config;
pub mod error;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod report;
pub mod sources;
pub mod summary;
