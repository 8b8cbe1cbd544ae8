pub mod config;

pub use config::ReelConfig;
