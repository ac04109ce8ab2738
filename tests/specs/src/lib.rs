// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `lumen-server` binary as a subprocess and exercises it
//! over HTTP, WebSocket, SSE, and long-poll transports.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `lumen-server` binary.
pub fn lumen_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("lumen-server")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `lumen-server` process that is killed on drop.
pub struct LumenProcess {
    child: Child,
    port: u16,
}

/// Builder for configuring the flags a [`LumenProcess`] is launched with.
pub struct LumenBuilder {
    insecure_dev_mode: bool,
    allowed_origins: Vec<String>,
    session_ttl_secs: Option<u64>,
}

impl Default for LumenBuilder {
    fn default() -> Self {
        Self { insecure_dev_mode: true, allowed_origins: Vec::new(), session_ttl_secs: None }
    }
}

impl LumenBuilder {
    /// Require Origin header verification (disabled by default in tests, to
    /// keep the happy-path scenarios free of header plumbing).
    pub fn enforce_origin(mut self, allowed: &[&str]) -> Self {
        self.insecure_dev_mode = false;
        self.allowed_origins = allowed.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Shorten the idle eviction TTL, for exercising the sweep.
    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.session_ttl_secs = Some(secs);
        self
    }

    /// Spawn `lumen-server` with the configured flags.
    pub fn spawn(self) -> anyhow::Result<LumenProcess> {
        ensure_crypto();
        let binary = lumen_binary();
        anyhow::ensure!(binary.exists(), "lumen-server binary not found at {}", binary.display());

        let port = free_port()?;

        let mut child = Command::new(&binary);
        child
            .env("LUMEN_HOST", "127.0.0.1")
            .env("LUMEN_PORT", port.to_string())
            .env("LUMEN_INSECURE_DEV_MODE", self.insecure_dev_mode.to_string())
            .env("LUMEN_ALLOWED_ORIGINS", self.allowed_origins.join(","))
            .env("LUMEN_HMAC_SECRET", "spec-harness-fixed-secret-do-not-use-in-prod")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(ttl) = self.session_ttl_secs {
            child.env("LUMEN_SESSION_TTL_SECS", ttl.to_string()).env("LUMEN_SESSION_CLEANUP_SECS", "1");
        }

        let child = child.spawn()?;

        Ok(LumenProcess { child, port })
    }
}

impl LumenProcess {
    /// Create a builder for custom launch flags.
    pub fn build() -> LumenBuilder {
        LumenBuilder::default()
    }

    /// Spawn with Origin verification disabled, the default for functional
    /// scenarios that don't exercise the upgrade-rejection path itself.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL for a given component name's primary transport.
    pub fn ws_url(&self, component: &str) -> String {
        format!("ws://127.0.0.1:{}/live/{component}/ws", self.port)
    }

    /// Poll the render endpoint until it answers, or time out.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/live/counter", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("lumen-server did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for LumenProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
