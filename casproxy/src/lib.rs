pub mod auth;
pub mod config;
pub mod error;
pub mod proxy;
pub mod ssl_server;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
