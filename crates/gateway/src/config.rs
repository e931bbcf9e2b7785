//! Configuration types for the gateway, plus loading and validation.
//!
//! Values are read from an optional TOML file overlaid with `GATEWAY_*`
//! environment variables. An absent sub-section means the corresponding
//! feature is disabled; nothing is defaulted to an active-but-empty state.
//! The one exception is `cors = true`, which maps to a fixed permissive
//! policy for backward compatibility.
//!
//! Extension hooks and the custom error formatter are code, not data; they
//! are attached programmatically by the embedding process and skipped during
//! deserialisation.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;

use common::{ExecutionContext, SchemaExecutor};

use crate::engine::format::ErrorFormatter;
use crate::engine::options::EngineOverrides;
use crate::engine::plugins::LandingPageSelection;

/// Default mount path for the GraphQL API.
pub const DEFAULT_GRAPHQL_PATH: &str = "/api/graphql";

/// Default per-file upload ceiling: 200 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Default JSON body limit: 100 KiB.
pub const DEFAULT_BODY_LIMIT: u64 = 100 * 1024;

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_body_limit() -> u64 {
    DEFAULT_BODY_LIMIT
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Validated gateway configuration, consumed once by
/// [`assemble`](crate::server::assemble::assemble).
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and middleware policy.
    pub http: HttpConfig,
    /// GraphQL mount and engine policy.
    pub graphql: GraphqlConfig,
    /// Named storage entries; `local` entries with a serve route are exposed
    /// over HTTP.
    pub storage: HashMap<String, StorageConfig>,
    /// Assembly-time extension hooks, attached programmatically.
    #[serde(skip)]
    pub hooks: ExtensionHooks,
}

impl GatewayConfig {
    /// Load configuration from an optional TOML file overlaid with
    /// `GATEWAY_*` environment variables, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read, a value cannot be
    /// deserialised, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GATEWAY").separator("__"),
        );

        let cfg = builder
            .build()
            .context("failed to build configuration from sources")?;

        let c: GatewayConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<()> {
        if self.http.host.parse::<IpAddr>().is_err() {
            anyhow::bail!("http.host is not a valid IP address: {}", self.http.host);
        }
        if self.http.max_file_size == 0 {
            anyhow::bail!("http.max_file_size must be > 0");
        }
        ensure_route_path(self.graphql.mount_path(), "graphql.path")?;
        if let Some(body_parser) = &self.graphql.body_parser {
            if body_parser.limit == 0 {
                anyhow::bail!("graphql.body_parser.limit must be > 0");
            }
        }
        for (name, storage) in &self.storage {
            if let Some(route) = &storage.serve {
                ensure_route_path(&route.path, &format!("storage.{name}.serve.path"))?;
            }
        }
        Ok(())
    }
}

fn ensure_route_path(path: &str, name: &str) -> Result<()> {
    if !path.starts_with('/') {
        anyhow::bail!("{name} must start with '/': {path}");
    }
    if path == "/" {
        anyhow::bail!("{name} must not be the bare root path");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP section
// ---------------------------------------------------------------------------

/// Listener address and middleware policy.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Interface the listener binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cross-origin policy. Absent or `false` disables CORS entirely.
    #[serde(default)]
    pub cors: Option<CorsSetting>,

    /// Deprecated health-check route. Absent disables it.
    #[serde(default)]
    pub health_check: Option<HealthCheckSetting>,

    /// Per-file upload ceiling in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: None,
            health_check: None,
            max_file_size: default_max_file_size(),
        }
    }
}

impl HttpConfig {
    /// The socket address the listener binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// CORS activation: a backward-compatible boolean or an explicit policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CorsSetting {
    /// `true` applies the fixed permissive default; `false` disables CORS.
    Flag(bool),
    /// An explicit policy, applied verbatim.
    Policy(CorsPolicy),
}

/// An explicit cross-origin policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsPolicy {
    /// Exact origins allowed to call the API.
    pub origins: Vec<String>,
    /// Allowed methods; defaults to `GET,HEAD,PUT,PATCH,POST,DELETE`.
    pub methods: Option<Vec<String>>,
    /// Allowed request headers; defaults to reflecting the preflight request.
    pub allowed_headers: Option<Vec<String>>,
    /// Whether responses may carry credentials.
    pub credentials: bool,
}

/// Health-check activation: a boolean or explicit options.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HealthCheckSetting {
    /// `true` serves the default payload at the default path.
    Flag(bool),
    /// Explicit path and body options.
    Options(HealthCheckOptions),
}

/// Produces the health-check response body on demand.
pub type HealthProducer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Explicit health-check options.
#[derive(Clone, Default, Deserialize)]
pub struct HealthCheckOptions {
    /// Route path; defaults to the well-known health path.
    #[serde(default)]
    pub path: Option<String>,

    /// Static response body, returned verbatim as JSON.
    #[serde(default)]
    pub data: Option<Value>,

    /// Response-body producer, invoked per request. Takes precedence over
    /// `data`. A panicking producer is an unguarded fault of that request.
    #[serde(skip)]
    pub producer: Option<HealthProducer>,
}

impl fmt::Debug for HealthCheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckOptions")
            .field("path", &self.path)
            .field("data", &self.data)
            .field("producer", &self.producer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GraphQL section
// ---------------------------------------------------------------------------

/// GraphQL mount and engine policy.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct GraphqlConfig {
    /// Error-debug visibility. Defaults to enabled outside production.
    pub debug: Option<bool>,

    /// Landing-page selection. Defaults to enabled outside production.
    pub playground: Option<PlaygroundSetting>,

    /// Mount path for the API. Defaults to [`DEFAULT_GRAPHQL_PATH`].
    pub path: Option<String>,

    /// JSON body decoding options for the mount path.
    pub body_parser: Option<BodyParserConfig>,

    /// Escape-hatch engine overrides, attached programmatically. Policy
    /// fields the gateway controls always win over these.
    #[serde(skip)]
    pub engine: Option<EngineOverrides>,

    /// Custom error formatter, invoked after built-in redaction.
    #[serde(skip)]
    pub format_error: Option<ErrorFormatter>,
}

impl GraphqlConfig {
    /// Resolved error-debug visibility.
    pub fn debug(&self, env: &Environment) -> bool {
        self.debug.unwrap_or(!env.production)
    }

    /// Resolved mount path.
    pub fn mount_path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_GRAPHQL_PATH)
    }

    /// Resolved JSON body limit in bytes.
    pub fn body_limit(&self) -> u64 {
        self.body_parser
            .as_ref()
            .map(|b| b.limit)
            .unwrap_or(DEFAULT_BODY_LIMIT)
    }

    /// Resolved landing-page selection.
    pub fn landing_page(&self, env: &Environment) -> LandingPageSelection {
        match self.playground {
            Some(PlaygroundSetting::Mode(PlaygroundMode::Passthrough)) => {
                LandingPageSelection::Passthrough
            }
            Some(PlaygroundSetting::Flag(true)) => LandingPageSelection::Interactive,
            Some(PlaygroundSetting::Flag(false)) => LandingPageSelection::Disabled,
            None if env.production => LandingPageSelection::Disabled,
            None => LandingPageSelection::Interactive,
        }
    }
}

impl fmt::Debug for GraphqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphqlConfig")
            .field("debug", &self.debug)
            .field("playground", &self.playground)
            .field("path", &self.path)
            .field("body_parser", &self.body_parser)
            .field("engine", &self.engine.as_ref().map(|_| "<overrides>"))
            .field("format_error", &self.format_error.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Landing-page configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PlaygroundSetting {
    /// Enable or disable the interactive landing page.
    Flag(bool),
    /// Hand landing-page control to the user's own plugins.
    Mode(PlaygroundMode),
}

/// Named landing-page modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaygroundMode {
    /// Use the user-supplied plugin list unmodified.
    Passthrough,
}

/// JSON body decoding options.
#[derive(Debug, Clone, Deserialize)]
pub struct BodyParserConfig {
    /// Maximum accepted JSON body size in bytes.
    #[serde(default = "default_body_limit")]
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Storage section
// ---------------------------------------------------------------------------

/// One named storage entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Which driver persists this entry's files.
    pub kind: StorageKind,

    /// Route descriptor. Only `local` entries with a route are served.
    #[serde(default)]
    pub serve: Option<ServeRoute>,

    /// Filesystem root for `local` entries.
    pub root: PathBuf,
}

/// Storage driver discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Files on the local filesystem; eligible for HTTP serving.
    Local,
    /// Files in an object store; never served by this layer.
    S3,
}

/// Where and how a storage entry is exposed over HTTP.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeRoute {
    /// Mount path for the entry's files.
    pub path: String,
    /// Whether responses are generic files or images.
    pub kind: AssetKind,
}

/// Served asset category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Generic files; responses force `application/octet-stream`.
    File,
    /// Images; responses keep the detected media type.
    Image,
}

// ---------------------------------------------------------------------------
// Extension hooks
// ---------------------------------------------------------------------------

/// Hook transforming the application router at assembly time.
pub type ExtendApp = Box<dyn FnOnce(Router, ExecutionContext) -> Router + Send>;

/// Hook observing the bound listener at assembly time.
pub type ExtendListener =
    Box<dyn FnOnce(&TcpListener, ExecutionContext, &Arc<dyn SchemaExecutor>) + Send>;

/// Assembly-time extension points, each invoked at a fixed position in the
/// registration order.
#[derive(Default)]
pub struct ExtensionHooks {
    /// Runs after the diagnostics route attaches; routes it adds share that
    /// precedence tier.
    pub extend_app: Option<ExtendApp>,
    /// Runs after the listener binds, before the engine starts.
    pub extend_listener: Option<ExtendListener>,
}

impl fmt::Debug for ExtensionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHooks")
            .field("extend_app", &self.extend_app.as_ref().map(|_| "<fn>"))
            .field("extend_listener", &self.extend_listener.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Explicit deployment environment, injected into the assembler instead of
/// being read ad hoc from process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Whether the process runs in production mode.
    pub production: bool,
}

impl Environment {
    /// A production environment.
    pub fn production() -> Self {
        Self { production: true }
    }

    /// A development environment.
    pub fn development() -> Self {
        Self { production: false }
    }

    /// Read the environment from the `GATEWAY_ENV` process variable.
    /// Anything other than `production` is treated as development.
    pub fn from_process() -> Self {
        let production = std::env::var("GATEWAY_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        Self { production }
    }
}
