//! Model server for the hosting container contract.
//!
//! The model is loaded before the listener is bound; a model that fails to
//! load means the server never starts. Requests are then handled by the
//! [`Pipeline`](crate::inference::Pipeline) on tokio's blocking pool.
//!
//! # Endpoints
//!
//! - `GET /ping`: liveness, `200` with an empty body
//! - `POST /invocations`: `text/csv` in, negotiated encoding out
//!
//! ```ignore
//! use boosters_serve::serve::{self, ServeArgs};
//!
//! serve::run(&ServeArgs::default()).await?;
//! ```

mod router;

pub use router::{create_router, status_for, AppState, ErrorResponse, DEFAULT_MAX_BODY_BYTES};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::inference::Pipeline;
use crate::model::{Model, ModelLoadError};

/// Default model file name inside the model directory.
pub const DEFAULT_MODEL_FILE: &str = "lightgbm-regression-model.txt";

/// Server options.
#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(short, long, env = "SAGEMAKER_BIND_TO_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory the platform provisions the model into.
    #[arg(long, env = "SM_MODEL_DIR", default_value = "/opt/ml/model")]
    pub model_dir: PathBuf,

    /// Model file name inside `--model-dir`.
    #[arg(long, default_value = DEFAULT_MODEL_FILE)]
    pub model_file: String,

    /// Largest accepted request body, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            model_dir: PathBuf::from("/opt/ml/model"),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServeArgs {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Load(#[from] ModelLoadError),

    #[error("invalid listen address {addr:?}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Load the model, bind, and serve until a shutdown signal arrives.
pub async fn run(args: &ServeArgs) -> Result<(), ServeError> {
    let model = Model::load(args.model_path())?;
    let router = create_router(AppState::new(Pipeline::new(Arc::new(model))), args.max_body_bytes);

    let addr_str = format!("{}:{}", args.host, args.port);
    let addr: SocketAddr = addr_str.parse().map_err(|source| ServeError::Address {
        addr: addr_str.clone(),
        source,
    })?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;

    serve(listener, router).await
}

/// Serve `router` on an already bound listener with graceful shutdown.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), ServeError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServeError::Server)?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
