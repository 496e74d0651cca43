pub mod load_config;
pub mod shutdown;
pub mod time_range;
