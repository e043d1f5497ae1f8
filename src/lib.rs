pub mod acquire;
pub mod config;
pub mod digest;
pub mod error;
pub mod http;
pub mod input;
pub mod json;
pub mod key;
pub mod observability;
pub mod pipeline;
pub mod qiniu;
pub mod transcode;
