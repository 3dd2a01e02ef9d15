pub mod config;
pub mod control;
pub mod hw;
pub mod lidar;
pub mod messages;
pub mod motion;
pub mod runtime;
pub mod rx;
