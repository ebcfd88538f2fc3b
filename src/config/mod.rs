// src/config/mod.rs
//! Pipeline configuration: TOML file with serde defaults, env overrides on top.

pub mod pipeline;

pub use pipeline::{
    demo_mode_from_env, parse_flag, CacheConfig, CallLogConfig, NotifyConfig, PipelineConfig,
    RetryConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH,
};
