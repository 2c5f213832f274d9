pub mod backfill;
pub mod client;
pub mod collectors;
pub mod config;
pub mod driver;
pub mod errors;
pub mod exporter;
pub mod server;

#[cfg(test)]
mod test_support;
