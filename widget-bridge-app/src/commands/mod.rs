pub mod check;
pub mod default_config;
