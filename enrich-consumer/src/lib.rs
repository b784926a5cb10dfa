pub mod config;
pub mod dead_letter;
pub mod error;
pub mod lookup;
pub mod metrics_consts;
pub mod pipeline;
pub mod source;
pub mod validator;
