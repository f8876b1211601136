//! Encoding modules for the dailies tool

pub mod daily;

pub use daily::{
    build_daily_command, run_daily, spawn_run, EncoderProgram, RunError, RunEvent, RunHandle,
    RunRequest, RunResult, RunState, DEFAULT_ENCODER,
};
