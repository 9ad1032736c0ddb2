pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod feeds;
pub mod output;
pub mod proxy;
pub mod state;
pub mod views;

#[cfg(test)]
mod tests;
