//! The `costgate` binary: an `axum` HTTP surface (`serve`) around the
//! library's [`costgate::gateway::Gateway`], plus a one-shot `analyze`
//! subcommand useful for CI and local debugging without standing up a
//! server. A `clap` derive `Args`/`Subcommand` pair, one function per
//! command.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Json;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use clap::Parser;
use clap::Subcommand;
use prometheus::Encoder;
use prometheus::TextEncoder;

use costgate::config::Config;
use costgate::error::CostgateError;
use costgate::gateway::Gateway;
use costgate::gateway::GatewayResponse;
use costgate::gateway::RequestInput;
use costgate::ratelimit::CacheBackend;
use costgate::ratelimit::InMemoryCache;

#[derive(Parser)]
#[command(name = "costgate", about = "GraphQL query-cost rate limiter")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the HTTP gateway in front of a GraphQL endpoint.
    Serve {
        /// Path to the GraphQL schema SDL file.
        #[arg(long)]
        schema: PathBuf,
        /// Path to the YAML configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:4000")]
        listen: SocketAddr,
    },
    /// Analyzes one operation against a schema and prints its complexity
    /// and depth as JSON, without starting a server or enforcing a budget.
    Analyze {
        #[arg(long)]
        schema: PathBuf,
        /// Path to the operation document, or `-` for stdin.
        query: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        operation_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    match args.command {
        Command::Serve { schema, config, listen } => serve(schema, config, listen).await,
        Command::Analyze {
            schema,
            query,
            config,
            variables,
            operation_name,
        } => analyze_once(schema, query, config, variables, operation_name),
    }
}

fn read_to_string_or_stdin(path: &PathBuf) -> anyhow::Result<String> {
    if path == std::path::Path::new("-") {
        Ok(std::io::read_to_string(std::io::stdin())?)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_yaml(&fs::read_to_string(path)?)?),
        None => Ok(Config::default()),
    }
}

fn analyze_once(
    schema_path: PathBuf,
    query_path: PathBuf,
    config_path: Option<PathBuf>,
    variables: Option<String>,
    operation_name: Option<String>,
) -> anyhow::Result<()> {
    let schema_src = read_to_string_or_stdin(&schema_path)?;
    let query_src = read_to_string_or_stdin(&query_path)?;
    let config = load_config(config_path)?;

    let schema = apollo_compiler::Schema::parse_and_validate(&schema_src, schema_path.display().to_string())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let document =
        apollo_compiler::executable::ExecutableDocument::parse_and_validate(&schema, &query_src, query_path.display().to_string())
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let table = costgate::cost_model::build(
        &schema,
        &config.type_weights,
        costgate::cost_model::BuildOptions {
            strict_unbounded_lists: config.enforce_bounded_lists,
        },
    )?;

    let vars: HashMap<String, serde_json::Value> = match variables {
        Some(json) => serde_json::from_str(&json)?,
        None => HashMap::new(),
    };

    let outcome = costgate::analysis::analyze(&document, operation_name.as_deref(), &vars, &table)?;
    println!(
        "{}",
        serde_json::json!({ "complexity": outcome.complexity, "maxDepth": outcome.max_depth })
    );
    Ok(())
}

struct AppState {
    gateway: Gateway,
}

/// Picks the cache backend the running binary actually serves with:
/// in-process when `cache.urls` is empty, otherwise the first configured
/// URL against the `redis-cache`-gated [`costgate::ratelimit::RedisCache`].
/// Built with the feature off and a non-empty `urls` list, this is a
/// startup error rather than a silent fallback to the in-process cache.
#[cfg(feature = "redis-cache")]
async fn build_cache(config: &costgate::config::CacheConfig) -> anyhow::Result<Arc<dyn CacheBackend>> {
    if config.urls.is_empty() {
        return Ok(Arc::new(InMemoryCache::new()));
    }
    let redis_config = fred::prelude::Config::from_url(&config.urls[0]).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let cache = costgate::ratelimit::RedisCache::connect(redis_config).await?;
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis-cache"))]
async fn build_cache(config: &costgate::config::CacheConfig) -> anyhow::Result<Arc<dyn CacheBackend>> {
    if !config.urls.is_empty() {
        anyhow::bail!("config.cache.urls is set but costgate was built without the redis-cache feature");
    }
    Ok(Arc::new(InMemoryCache::new()))
}

async fn serve(schema_path: PathBuf, config_path: PathBuf, listen: SocketAddr) -> anyhow::Result<()> {
    let schema_src = fs::read_to_string(&schema_path)?;
    let schema = apollo_compiler::Schema::parse_and_validate(&schema_src, schema_path.display().to_string())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let config = Config::from_yaml(&fs::read_to_string(&config_path)?)?;

    let cache = build_cache(&config.cache).await?;
    let gateway = Gateway::build(schema, &config, cache)?;
    let state = Arc::new(AppState { gateway });

    let app = Router::new()
        .route("/graphql", post(handle_graphql))
        .route("/admin/reset", post(handle_reset))
        .route("/metrics", get(handle_metrics))
        .with_state(state);

    tracing::info!(%listen, "costgate gateway listening");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[derive(serde::Deserialize)]
struct GraphQlRequest {
    query: String,
    #[serde(default)]
    variables: HashMap<String, serde_json::Value>,
    #[serde(rename = "operationName", default)]
    operation_name: Option<String>,
}

/// Extracts the caller key: a trusted `x-forwarded-for` value if present,
/// otherwise the connection's peer address.
fn caller_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

async fn handle_graphql(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<GraphQlRequest>,
) -> impl IntoResponse {
    let caller_key = caller_key(&headers, peer);
    let result = state
        .gateway
        .handle_request(RequestInput {
            caller_key: &caller_key,
            operation_text: &body.query,
            operation_name: body.operation_name.as_deref(),
            variables: body.variables,
        })
        .await;

    match result {
        Ok(GatewayResponse::Forward(slot)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "timestamp": slot.timestamp_millis,
                "complexity": slot.complexity,
                "depth": slot.depth,
                "tokens": slot.tokens,
                "success": slot.success,
            })),
        )
            .into_response(),
        Ok(GatewayResponse::Reject { slot, retry_after_secs }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "timestamp": slot.timestamp_millis,
                "complexity": slot.complexity,
                "depth": slot.depth,
                "tokens": slot.tokens,
                "success": slot.success,
                "retryAfter": retry_after_secs,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn handle_reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.gateway.reset().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

/// Exposes [`costgate::metrics::Metrics`] for scraping, in the text
/// exposition format `prometheus::TextEncoder` writes.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.gateway.metrics().registry().gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [("content-type", encoder.format_type())],
        buffer,
    )
        .into_response()
}

fn error_response(err: CostgateError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
