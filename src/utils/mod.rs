pub mod config;
pub mod mime;
pub mod naming;
pub mod digest;
