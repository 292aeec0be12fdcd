pub mod client;
pub mod hamster;
pub mod simulator;
