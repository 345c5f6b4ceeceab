pub mod autoscaler;
pub mod config;
pub mod event;
pub mod meta;
pub mod pod;
pub mod quantity;
pub mod scale;
pub mod selector;
pub mod validate;
