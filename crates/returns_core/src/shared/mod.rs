pub mod clock;
pub mod config;
pub mod debounce;
pub mod storage;
