//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; each connection runs on its own task.

use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{IdentityAuthority, JwtValidator};
use crate::board::PublicRequestBoard;
use crate::config::{Args, StoreKind};
use crate::db::{MongoClient, Stores};
use crate::files::{FileStore, LocalFileStore};
use crate::leaderboard::LeaderboardAggregator;
use crate::ledger::{FavorCatalog, ObligationLedger};
use crate::logging::AuditLogger;
use crate::routes::{self, error_response, ApiRequest, BoxBody};
use crate::types::{FavorrError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub stores: Stores,
    /// "mongo" or "memory"
    pub store_label: &'static str,
    pub identity: IdentityAuthority,
    pub ledger: ObligationLedger,
    pub board: PublicRequestBoard,
    pub leaderboard: LeaderboardAggregator,
    pub files: Arc<dyn FileStore>,
    pub audit: AuditLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the components over already opened stores
    pub fn new(
        args: Args,
        stores: Stores,
        store_label: &'static str,
        catalog: FavorCatalog,
        files: Arc<dyn FileStore>,
        audit: AuditLogger,
    ) -> Result<Self> {
        let jwt = JwtValidator::new(args.jwt_secret()?, args.jwt_expiry_seconds)?;
        let catalog = Arc::new(catalog);

        let identity = IdentityAuthority::new(stores.users.clone(), jwt);
        let leaderboard = LeaderboardAggregator::new(stores.clone(), audit.clone());
        let ledger = ObligationLedger::new(
            stores.users.clone(),
            stores.favors.clone(),
            catalog.clone(),
            leaderboard.clone(),
            audit.clone(),
        );
        let board = PublicRequestBoard::new(
            stores.users.clone(),
            stores.requests.clone(),
            stores.favors.clone(),
            catalog,
            leaderboard.clone(),
            audit.clone(),
        );

        Ok(Self {
            args,
            stores,
            store_label,
            identity,
            ledger,
            board,
            leaderboard,
            files,
            audit,
            started_at: Instant::now(),
        })
    }

    /// Open the configured store, catalog, upload directory and audit log
    pub async fn build(args: Args) -> Result<Self> {
        let (stores, store_label) = open_stores(&args).await?;
        let catalog = FavorCatalog::load(args.favor_catalog.as_deref())?;

        let files = LocalFileStore::new(args.upload_dir.clone(), args.max_upload_bytes);
        files.init().await?;

        let audit = AuditLogger::new();
        if let Some(path) = &args.audit_log {
            audit.init_file(path.clone()).await?;
        }

        Self::new(args, stores, store_label, catalog, Arc::new(files), audit)
    }

    /// Largest request body read off the wire
    fn body_limit(&self) -> usize {
        self.args.max_upload_bytes.max(routes::common::MAX_JSON_BYTES)
    }
}

async fn open_stores(args: &Args) -> Result<(Stores, &'static str)> {
    match args.store {
        StoreKind::Memory => {
            warn!("Using in-memory store - data is lost on restart");
            Ok((Stores::memory(), "memory"))
        }
        StoreKind::Mongo => match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(mongo) => Ok((Stores::mongo(&mongo).await?, "mongo")),
            Err(e) if args.dev_mode => {
                warn!("MongoDB unavailable in dev mode, falling back to memory: {}", e);
                Ok((Stores::memory(), "memory"))
            }
            Err(e) => Err(e),
        },
    }
}

/// Accept connections until the listener fails to bind
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Favorr listening on {} ({} store)",
        state.args.listen, state.store_label
    );
    if state.args.dev_mode {
        warn!("Development mode enabled - do not use in production");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the body (bounded) and hand the request to the router
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let (parts, body) = req.into_parts();
    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let body = match Limited::new(body, state.body_limit()).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(error_response(FavorrError::Validation(format!(
                "Could not read request body: {}",
                e
            ))))
        }
    };

    let request = ApiRequest::from_parts(parts, body, addr);
    Ok(routes::dispatch(&state, request).await)
}

/// Run the leaderboard reconciliation once and log the outcome
pub async fn reconcile_leaderboard(state: &AppState) -> Result<()> {
    let report = state.leaderboard.reconcile().await?;
    info!(
        "Startup reconciliation: {} users, {} counters corrected",
        report.users_checked, report.counters_corrected
    );
    Ok(())
}
