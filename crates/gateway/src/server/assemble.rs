//! The pipeline assembler.
//!
//! Builds the listener and the composed router in one fixed registration
//! order, each step conditional on its own configuration:
//!
//! 1. cross-origin policy (outermost response layer)
//! 2. diagnostics endpoint
//! 3. `extend_app` hook
//! 4. listener bind, then the `extend_listener` hook
//! 5. static asset mounts
//! 6. engine construction with merged options
//! 7. landing-page plugin selection
//! 8. engine start (the API tier attaches only after this resolves)
//! 9. upload intake, scoped to the mount path
//! 10. the API mount and its JSON 404 fallback
//!
//! Path collisions across tiers resolve first-registered-wins: diagnostics
//! and hook routes, then static assets, then the API mount. The tiers are
//! chained through router fallbacks so the precedence is structural rather
//! than scattered across call sites.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};
use uuid::Uuid;

use common::{ContextSource, SchemaExecutor};

use crate::config::{Environment, GatewayConfig};
use crate::engine::format::ErrorFormatPolicy;
use crate::engine::options::{EngineOptions, EnginePolicy};
use crate::engine::{plugins, Engine, EngineError};

use super::cors::CorsError;
use super::state::ApiState;
use super::{assets, cors, diagnostics, handlers, uploads};

/// Errors that reject an assembly.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The configured host is not a usable address.
    #[error("invalid listener address: {0}")]
    Address(String),

    /// The listener could not bind.
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The configured CORS policy does not parse.
    #[error(transparent)]
    Cors(#[from] CorsError),

    /// The execution engine failed its readiness step.
    #[error("execution engine failed to start")]
    EngineStart(#[from] EngineError),
}

/// The long-lived handles produced by a successful assembly.
///
/// The caller owns lifecycle: nothing is served until [`serve`] (or an
/// equivalent driver) consumes the listener and router.
///
/// [`serve`]: AssembledServer::serve
pub struct AssembledServer {
    /// The bound, not yet serving, TCP listener.
    pub listener: TcpListener,
    /// The fully composed application router.
    pub router: Router,
    /// The started engine, shared with the router's API tier.
    pub engine: Arc<Engine>,
}

impl AssembledServer {
    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Drive the assembled listener until the connection loop ends.
    pub async fn serve(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}

/// Assemble the gateway from its configuration and collaborators.
///
/// # Errors
///
/// Returns [`AssembleError`] when the listener cannot bind, the CORS policy
/// is unusable, or the engine fails to start. Startup failures never leave a
/// partially routed server behind.
pub async fn assemble(
    env: &Environment,
    config: GatewayConfig,
    schema: Arc<dyn SchemaExecutor>,
    context: Arc<dyn ContextSource>,
) -> Result<AssembledServer, AssembleError> {
    let GatewayConfig { http, graphql, storage, hooks } = config;

    // 1. Access policy.
    let cors = cors::layer(http.cors.as_ref())?;

    // 2. Diagnostics.
    let mut primary = diagnostics::router(http.health_check.as_ref()).unwrap_or_default();

    // 3. Application extension hook; its routes share the primary tier.
    if let Some(extend_app) = hooks.extend_app {
        primary = extend_app(primary, context.shared());
    }

    // 4. Bind the listener, then let the listener hook observe it.
    let addr = http
        .socket_addr()
        .map_err(|error| AssembleError::Address(error.to_string()))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| AssembleError::Bind { addr, source })?;
    if let Some(extend_listener) = hooks.extend_listener {
        extend_listener(&listener, context.shared(), &schema);
    }

    // 5. Static asset bridge.
    let asset_tier = assets::router(&storage);

    // 6-7. Engine construction: gateway policy merged with embedder
    // overrides, plugin list computed from the landing-page selection.
    let debug = graphql.debug(env);
    let selection = graphql.landing_page(env);
    let mount_path = graphql.mount_path().to_owned();
    let body_limit = graphql.body_limit();
    let format = ErrorFormatPolicy { debug, custom: graphql.format_error.clone() };
    let mut overrides = graphql.engine.unwrap_or_default();
    let user_plugins = overrides.plugins.take().unwrap_or_default();
    let plugin_list = plugins::select(selection, &mount_path, user_plugins);
    let policy = EnginePolicy {
        schema: schema.clone(),
        format,
        include_stacktrace: debug,
        plugins: plugin_list,
    };
    let engine = Arc::new(Engine::new(EngineOptions::merge(policy, overrides)));

    // 8. Readiness gate. Requests can never reach a half-initialised engine
    // because the API tier is built strictly after this resolves.
    engine.start().await?;

    // 9-10. Upload intake and the API mount.
    let state = ApiState {
        engine: engine.clone(),
        context,
        max_file_size: http.max_file_size,
        body_limit,
    };
    let api_tier = api_router(state, &mount_path);

    // First registered wins across tiers.
    let router = primary
        .fallback_service(asset_tier.fallback_service(api_tier))
        .layer(TraceLayer::new_for_http().make_span_with(request_span));
    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    info!(addr = %addr, path = %mount_path, "gateway assembled");
    Ok(AssembledServer { listener, router, engine })
}

/// The API tier: the mount path with upload intake and unbounded transport
/// limits (body ceilings are enforced explicitly), ending in the JSON 404
/// fallback.
pub(crate) fn api_router(state: ApiState, mount_path: &str) -> Router {
    Router::new()
        .route(mount_path, get(handlers::graphql).post(handlers::graphql))
        .layer(middleware::from_fn_with_state(state.clone(), uploads::intake))
        .layer(DefaultBodyLimit::disable())
        .fallback(handlers::not_found)
        .with_state(state)
}

fn request_span(request: &axum::extract::Request) -> tracing::Span {
    info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %request.method(),
        uri = %request.uri(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AssetKind, CorsSetting, GraphqlConfig, HealthCheckOptions, HealthCheckSetting,
        HttpConfig, ServeRoute, StorageConfig, StorageKind,
    };
    use crate::engine::options::EngineOverrides;
    use crate::engine::plugins::EnginePlugin;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, request::Parts, Request, StatusCode};
    use common::{
        ExecutionContext, ExecutionFault, GraphQLRequest, GraphQLResponse,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct CaptureExecutor {
        upload_counts: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl common::SchemaExecutor for CaptureExecutor {
        async fn execute(
            &self,
            request: GraphQLRequest,
            _ctx: ExecutionContext,
        ) -> Result<GraphQLResponse, ExecutionFault> {
            self.upload_counts.lock().unwrap().push(request.uploads.len());
            Ok(GraphQLResponse::data(json!({"ok": true})))
        }
    }

    struct NullContext;

    #[async_trait]
    impl ContextSource for NullContext {
        fn shared(&self) -> ExecutionContext {
            Arc::new(())
        }

        async fn create(&self, _request: &Parts) -> ExecutionContext {
            Arc::new(())
        }
    }

    struct FailingPlugin;

    #[async_trait]
    impl EnginePlugin for FailingPlugin {
        async fn on_start(&self) -> anyhow::Result<()> {
            anyhow::bail!("subscription transport unavailable")
        }
    }

    fn local_http() -> HttpConfig {
        HttpConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..HttpConfig::default()
        }
    }

    fn schema() -> (Arc<dyn SchemaExecutor>, Arc<Mutex<Vec<usize>>>) {
        let upload_counts = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(CaptureExecutor { upload_counts: upload_counts.clone() });
        (executor, upload_counts)
    }

    async fn assembled(config: GatewayConfig) -> AssembledServer {
        let (executor, _) = schema();
        assemble(&Environment::development(), config, executor, Arc::new(NullContext))
            .await
            .unwrap()
    }

    async fn json_of(response: axum::http::Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn engine_start_failure_rejects_assembly() {
        let mut config = GatewayConfig { http: local_http(), ..GatewayConfig::default() };
        config.graphql = GraphqlConfig {
            engine: Some(EngineOverrides {
                plugins: Some(vec![Arc::new(FailingPlugin)]),
                ..EngineOverrides::default()
            }),
            ..GraphqlConfig::default()
        };

        let (executor, _) = schema();
        let result = assemble(
            &Environment::development(),
            config,
            executor,
            Arc::new(NullContext),
        )
        .await;
        assert!(matches!(result, Err(AssembleError::EngineStart(_))));
    }

    #[tokio::test]
    async fn default_mount_path_serves_the_engine() {
        let server = assembled(GatewayConfig {
            http: local_http(),
            ..GatewayConfig::default()
        })
        .await;
        let resp = server
            .router
            .oneshot(post_json("/api/graphql", r#"{"query": "{ ok }"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_of(resp).await["data"]["ok"], true);
    }

    #[tokio::test]
    async fn custom_mount_path_replaces_the_default() {
        let config = GatewayConfig {
            http: local_http(),
            graphql: GraphqlConfig {
                path: Some("/graphql".into()),
                ..GraphqlConfig::default()
            },
            ..GatewayConfig::default()
        };
        let server = assembled(config).await;
        let resp = server
            .router
            .clone()
            .oneshot(post_json("/graphql", r#"{"query": "{ ok }"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = server
            .router
            .oneshot(post_json("/api/graphql", r#"{"query": "{ ok }"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn diagnostics_beats_a_colliding_asset_route() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.txt"), b"quarterly numbers").unwrap();

        let mut storage = HashMap::new();
        storage.insert(
            "files".to_owned(),
            StorageConfig {
                kind: StorageKind::Local,
                serve: Some(ServeRoute { path: "/files".into(), kind: AssetKind::File }),
                root: dir.path().to_path_buf(),
            },
        );
        let config = GatewayConfig {
            http: HttpConfig {
                health_check: Some(HealthCheckSetting::Options(HealthCheckOptions {
                    path: Some("/files".into()),
                    ..HealthCheckOptions::default()
                })),
                ..local_http()
            },
            storage,
            ..GatewayConfig::default()
        };
        let server = assembled(config).await;

        // The collision path resolves to the diagnostics route.
        let resp = server
            .router
            .clone()
            .oneshot(Request::builder().uri("/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_of(resp).await["status"], "pass");

        // Deeper paths still reach the asset mount.
        let resp = server
            .router
            .oneshot(Request::builder().uri("/files/report.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"quarterly numbers");
    }

    #[tokio::test]
    async fn cors_headers_appear_on_every_tier_when_enabled() {
        let config = GatewayConfig {
            http: HttpConfig {
                cors: Some(CorsSetting::Flag(true)),
                health_check: Some(HealthCheckSetting::Flag(true)),
                ..local_http()
            },
            ..GatewayConfig::default()
        };
        let server = assembled(config).await;
        let req = Request::builder()
            .uri("/_healthcheck")
            .header("origin", "https://admin.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://admin.example.com"
        );
        assert_eq!(
            resp.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn no_cors_headers_without_configuration() {
        let server = assembled(GatewayConfig {
            http: local_http(),
            ..GatewayConfig::default()
        })
        .await;
        let req = post_json("/api/graphql", r#"{"query": "{ ok }"}"#);
        let req = {
            let (mut parts, body) = req.into_parts();
            parts.headers.insert("origin", "https://admin.example.com".parse().unwrap());
            Request::from_parts(parts, body)
        };
        let resp = server.router.oneshot(req).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn extension_hooks_run_and_their_routes_take_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.txt"), b"from storage").unwrap();
        std::fs::write(dir.path().join("other.txt"), b"other bytes").unwrap();

        let mut storage = HashMap::new();
        storage.insert(
            "files".to_owned(),
            StorageConfig {
                kind: StorageKind::Local,
                serve: Some(ServeRoute { path: "/files".into(), kind: AssetKind::File }),
                root: dir.path().to_path_buf(),
            },
        );

        let listener_seen = Arc::new(AtomicBool::new(false));
        let listener_flag = listener_seen.clone();

        let mut config = GatewayConfig {
            http: local_http(),
            storage,
            ..GatewayConfig::default()
        };
        config.hooks.extend_app = Some(Box::new(|router, _ctx| {
            router.route("/files/report.txt", get(|| async { "hooked" }))
        }));
        config.hooks.extend_listener = Some(Box::new(move |listener, _ctx, _schema| {
            listener_flag.store(listener.local_addr().is_ok(), Ordering::SeqCst);
        }));

        let server = assembled(config).await;
        assert!(listener_seen.load(Ordering::SeqCst));

        let resp = server
            .router
            .clone()
            .oneshot(Request::builder().uri("/files/report.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hooked");

        let resp = server
            .router
            .oneshot(Request::builder().uri("/files/other.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"other bytes");
    }

    const BOUNDARY: &str = "gateway-assemble-boundary";

    fn multipart_upload(path: &str, file: &[u8]) -> Request<Body> {
        let operations =
            r#"{"query":"mutation ($file: Upload!) { createAsset(file: $file) { id } }","variables":{"file":null}}"#;
        let mut body = Vec::new();
        for (name, content) in [("operations", operations.as_bytes()), ("map", br#"{"0":["variables.file"]}"# as &[u8])] {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"0\"; filename=\"a.bin\"\r\n\
              Content-Type: application/octet-stream\r\n\r\n",
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn uploads_within_the_ceiling_reach_the_engine() {
        let config = GatewayConfig {
            http: HttpConfig { max_file_size: 16, ..local_http() },
            ..GatewayConfig::default()
        };
        let (executor, upload_counts) = schema();
        let server = assemble(
            &Environment::development(),
            config,
            executor,
            Arc::new(NullContext),
        )
        .await
        .unwrap();

        let resp = server
            .router
            .oneshot(multipart_upload("/api/graphql", &[0u8; 16]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*upload_counts.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn oversize_uploads_are_rejected_before_the_engine() {
        let config = GatewayConfig {
            http: HttpConfig { max_file_size: 16, ..local_http() },
            ..GatewayConfig::default()
        };
        let (executor, upload_counts) = schema();
        let server = assemble(
            &Environment::development(),
            config,
            executor,
            Arc::new(NullContext),
        )
        .await
        .unwrap();

        let resp = server
            .router
            .oneshot(multipart_upload("/api/graphql", &[0u8; 17]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_of(resp).await;
        assert_eq!(body["errors"][0]["extensions"]["code"], "PAYLOAD_TOO_LARGE");
        assert!(upload_counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn production_default_disables_the_landing_page() {
        let (executor, _) = schema();
        let server = assemble(
            &Environment::production(),
            GatewayConfig { http: local_http(), ..GatewayConfig::default() },
            executor,
            Arc::new(NullContext),
        )
        .await
        .unwrap();
        let resp = server
            .router
            .oneshot(Request::builder().uri("/api/graphql").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
