pub mod engine;
pub mod logs;
pub mod status;
pub mod trigger;
