pub mod http;
pub mod models;
pub mod source;

#[cfg(test)]
pub mod testing;
