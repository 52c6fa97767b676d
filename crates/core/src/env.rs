//! Small env-var parsing helpers shared by every binary's `Config::from_env`.
//!
//! Mirrors the style of the original codebase's `AppConfig::from_env` (read var, fall
//! back to a named default, validate) instead of scattering
//! `std::env::var(...).unwrap_or(...)` calls ad hoc through the codebase.

use crate::error::CoreError;
use std::str::FromStr;

pub fn env_string(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_required(key: &'static str) -> Result<String, CoreError> {
    std::env::var(key).map_err(|_| CoreError::MissingEnv(key))
}

pub fn env_parsed<T>(key: &'static str, default: T) -> Result<T, CoreError>
where
    T: FromStr + Clone,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<T>().map_err(|e| CoreError::InvalidEnv {
            name: key,
            value: v,
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

pub fn env_bool(key: &'static str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                default
            } else {
                matches!(v, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
            }
        }
        Err(_) => default,
    }
}

pub fn env_list(key: &'static str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
