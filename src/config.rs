//! Runtime configuration, assembled once at startup from the environment.
//!
//! Mirrors the teacher's `Config::from_env`: every knob has a sane default
//! and can be overridden by an environment variable, with `.env` loaded
//! first via `dotenvy` so local development doesn't require exporting vars
//! by hand.

use std::env;

/// Process-wide configuration for a Foam session.
#[derive(Debug, Clone)]
pub struct FoamConfig {
    /// Base URL of the CORS-bridging relay used for smart-HTTP git clone.
    pub git_cors_relay: String,
    /// npm registry base URL.
    pub npm_registry: String,
    /// ESM CDN fallback used if a tarball fetch fails.
    pub npm_cdn_fallback: String,
    /// Seed value for `Environment`'s `USER` before a session overrides it.
    pub default_user: String,
    /// Seed value for `Environment`'s `HOME` before a session overrides it.
    pub default_home: String,
    /// Maximum number of lines kept in the shell's history buffer.
    pub shell_history_limit: usize,
    /// Iteration cap applied to `while`/`until` loops (§5 "no preemption").
    pub while_loop_cap: u64,
}

impl Default for FoamConfig {
    fn default() -> Self {
        Self {
            git_cors_relay: "https://cors.isomorphic-git.org".to_string(),
            npm_registry: "https://registry.npmjs.org".to_string(),
            npm_cdn_fallback: "https://esm.sh".to_string(),
            default_user: "foam".to_string(),
            default_home: "/home/foam".to_string(),
            shell_history_limit: 1000,
            while_loop_cap: 10_000,
        }
    }
}

impl FoamConfig {
    /// Build configuration from `.env` (if present) and process environment
    /// variables, falling back to [`FoamConfig::default`] values.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            git_cors_relay: env::var("FOAM_GIT_RELAY").unwrap_or(defaults.git_cors_relay),
            npm_registry: env::var("FOAM_NPM_REGISTRY").unwrap_or(defaults.npm_registry),
            npm_cdn_fallback: env::var("FOAM_NPM_CDN").unwrap_or(defaults.npm_cdn_fallback),
            default_user: env::var("FOAM_USER").unwrap_or(defaults.default_user),
            default_home: env::var("FOAM_HOME").unwrap_or(defaults.default_home),
            shell_history_limit: env::var("FOAM_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shell_history_limit),
            while_loop_cap: env::var("FOAM_WHILE_LOOP_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.while_loop_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = FoamConfig::default();
        assert!(cfg.git_cors_relay.starts_with("https://"));
        assert!(cfg.while_loop_cap > 0);
    }
}
