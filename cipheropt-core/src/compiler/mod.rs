pub mod analysis;
pub mod bet;
pub mod config;
pub mod error;
pub mod ir;
pub mod pipeline;
