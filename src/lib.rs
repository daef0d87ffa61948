pub mod config;
pub mod entities;
pub mod http;
pub mod models;
pub mod polls;
pub mod state;

#[cfg(test)]
mod testing;
