// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Named timeout-profile presets: `default`, `strict` (halved deadlines,
/// closed CORS), `relaxed` (deadlines scaled ~10x, for development).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "lowercase")]
pub enum TimeoutProfile {
    #[default]
    Default,
    Strict,
    Relaxed,
}

impl TimeoutProfile {
    fn scale(&self) -> f64 {
        match self {
            Self::Default => 1.0,
            Self::Strict => 0.5,
            Self::Relaxed => 10.0,
        }
    }

    pub fn table(&self) -> TimeoutTable {
        let scale = self.scale();
        let scaled = |base_ms: u64| Duration::from_millis(((base_ms as f64) * scale) as u64);
        TimeoutTable {
            mount: scaled(5_000),
            event: scaled(3_000),
            render: scaled(2_000),
            publish: scaled(1_000),
            websocket_read: scaled(60_000),
            websocket_write: scaled(10_000),
        }
    }
}

/// Per-operation deadlines, scaled from a [`TimeoutProfile`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutTable {
    pub mount: Duration,
    pub event: Duration,
    pub render: Duration,
    pub publish: Duration,
    pub websocket_read: Duration,
    pub websocket_write: Duration,
}

/// The process configuration surface, parsed from CLI flags with
/// `LUMEN_*` environment fallbacks.
#[derive(Debug, Clone, Parser)]
#[command(name = "lumen-server", about = "A server-side real-time UI runtime")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "LUMEN_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 4000, env = "LUMEN_PORT")]
    pub port: u16,

    /// Timeout profile: default, strict, or relaxed.
    #[arg(long, value_enum, default_value_t = TimeoutProfile::Default, env = "LUMEN_TIMEOUT_PROFILE")]
    pub timeout_profile: TimeoutProfile,

    /// Overall per-request deadline, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "LUMEN_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Session idle eviction TTL, in seconds.
    #[arg(long, default_value_t = 1_800, env = "LUMEN_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Session table eviction sweep interval, in seconds.
    #[arg(long, default_value_t = 60, env = "LUMEN_SESSION_CLEANUP_SECS")]
    pub session_cleanup_secs: u64,

    /// Graceful shutdown drain deadline, in seconds.
    #[arg(long, default_value_t = 10, env = "LUMEN_GRACEFUL_SHUTDOWN_SECS")]
    pub graceful_shutdown_secs: u64,

    /// Maximum inbound WebSocket message size, in bytes.
    #[arg(long, default_value_t = 512 * 1024, env = "LUMEN_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,

    /// Maximum concurrently live sessions before oldest-activity eviction.
    #[arg(long, default_value_t = 10_000, env = "LUMEN_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Maximum subscriptions per pub/sub topic.
    #[arg(long, default_value_t = 10_000, env = "LUMEN_MAX_SUBSCRIPTIONS")]
    pub max_subscriptions: usize,

    /// Allowed WebSocket/SSE origins. A single `*` allows all (dev only).
    #[arg(long, env = "LUMEN_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Disable Origin header verification entirely. Development only.
    #[arg(long, default_value_t = false, env = "LUMEN_INSECURE_DEV_MODE")]
    pub insecure_dev_mode: bool,

    /// Per-IP rate limit, requests per second (0 disables).
    #[arg(long, default_value_t = 0, env = "LUMEN_RATE_LIMIT_PER_SECOND")]
    pub rate_limit_per_second: u32,

    /// Maximum concurrent connections from a single IP (0 disables).
    #[arg(long, default_value_t = 0, env = "LUMEN_MAX_CONNECTIONS_PER_IP")]
    pub max_connections_per_ip: u32,

    /// HMAC secret for signed long-poll client ids and recovery tokens.
    #[arg(long, env = "LUMEN_HMAC_SECRET")]
    pub hmac_secret: Option<String>,

    /// Recovery token time-to-live, in seconds.
    #[arg(long, default_value_t = 300, env = "LUMEN_RECOVERY_TTL_SECS")]
    pub recovery_ttl_secs: u64,

    /// Long-poll pending-outbound-queue cap.
    #[arg(long, default_value_t = 1_000, env = "LUMEN_LONG_POLL_QUEUE_CAP")]
    pub long_poll_queue_cap: usize,

    /// Path to a JSON file overlaying additional configuration.
    #[arg(long, env = "LUMEN_CONFIG_FILE")]
    pub config_file: Option<std::path::PathBuf>,

    /// Whether upstream CSRF middleware is expected to have validated this
    /// request before it reaches the core. CSRF/security-header enforcement
    /// is out of scope for this crate (spec.md §1: "the core consumes a
    /// pre-authenticated request") — these three fields are recognized so
    /// the same config file/flags can drive an external CSRF layer mounted
    /// in front of the upgrade endpoint, not acted on here.
    #[arg(long, default_value_t = false, env = "LUMEN_CSRF_ENABLED")]
    pub csrf_enabled: bool,

    /// Secret for the external CSRF layer's token signing. Unused by this
    /// crate directly; see `csrf_enabled`.
    #[arg(long, env = "LUMEN_CSRF_SECRET")]
    pub csrf_secret: Option<String>,

    /// CSRF token expiry, in seconds, for the external CSRF layer.
    #[arg(long, default_value_t = 3_600, env = "LUMEN_CSRF_TOKEN_EXPIRY_SECS")]
    pub csrf_token_expiry_secs: u64,
}

impl Config {
    pub fn timeouts(&self) -> TimeoutTable {
        self.timeout_profile.table()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_secs)
    }

    pub fn graceful_shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }

    pub fn recovery_ttl(&self) -> Duration {
        Duration::from_secs(self.recovery_ttl_secs)
    }

    /// Resolve the HMAC secret, falling back to a process-local random key
    /// (fine for a single-node dev run; multi-node deployments must set
    /// `LUMEN_HMAC_SECRET` explicitly so recovery tokens survive restarts).
    pub fn resolve_hmac_secret(&self) -> Vec<u8> {
        match &self.hmac_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!("no LUMEN_HMAC_SECRET set; using an ephemeral per-process key");
                let mut key = vec![0u8; 32];
                rand::Rng::fill(&mut rand::rng(), key.as_mut_slice());
                key
            }
        }
    }
}

/// Optional JSON-file overlay, mirroring the teacher's credential-config
/// file-loading pattern (`serde_json::from_str` over a path named by a CLI
/// flag).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ConfigOverlay {
    pub allowed_origins: Option<Vec<String>>,
    pub rate_limit_per_second: Option<u32>,
}

pub fn load_overlay(path: &std::path::Path) -> anyhow::Result<ConfigOverlay> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
