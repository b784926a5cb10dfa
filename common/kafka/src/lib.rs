pub mod config;
pub mod consumer;
pub mod context;
pub mod producer;
pub mod test;
