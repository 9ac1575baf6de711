pub mod claimable;
pub mod engine;
pub mod fund;
pub mod logs;
pub mod run_once;
pub mod serve;
pub mod status;
