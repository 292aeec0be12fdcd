pub mod catalog;
pub mod scheduler;
pub mod selector;
