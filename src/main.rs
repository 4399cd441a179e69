use std::{future::IntoFuture, process, sync::Arc};

use schoolboard::{
    application::{
        blobs::BlobStore, cache::CacheStore, error::AppError, passwords::hash_password_blocking,
    },
    config,
    infra::{
        blobs::LocalBlobStore,
        cache::{MemoryCache, RedisCache},
        db::{self, PostgresRepositories, SeedAdmin},
        error::InfraError,
        http::{self, AppOptions, AppState, Repositories},
        notify::LogNotifier,
        telemetry,
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Seed(args) => run_seed(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let cache: Arc<dyn CacheStore> = match settings.cache.url.as_deref() {
        Some(url) => {
            let redis = RedisCache::connect(url).await.map_err(InfraError::from)?;
            info!(target: "schoolboard::cache", "using redis listing cache");
            Arc::new(redis)
        }
        None => {
            warn!(
                target: "schoolboard::cache",
                "no cache url configured; using in-process listing cache"
            );
            Arc::new(MemoryCache::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = Arc::new(
        LocalBlobStore::new(
            settings.uploads.directory.clone(),
            settings.uploads.public_base_url.clone(),
        )
        .map_err(InfraError::from)?,
    );

    let state = AppState::new(
        Repositories::postgres(repositories),
        cache,
        blobs,
        Arc::new(LogNotifier),
        AppOptions::from_settings(&settings),
    );

    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target: "schoolboard::migrate", "migrations applied");
    Ok(())
}

async fn run_seed(settings: config::Settings, args: config::SeedArgs) -> Result<(), AppError> {
    if args.admin_password.chars().count() < 8 {
        return Err(AppError::unexpected(
            "the administrator password must be at least 8 characters",
        ));
    }
    let repositories = init_repositories(&settings).await?;
    let password_hash = hash_password_blocking(args.admin_password.clone())
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    let report = db::seed(
        &repositories,
        &SeedAdmin {
            name: args.admin_name,
            email: args.admin_email,
            password_hash,
        },
    )
    .await?;

    info!(
        target: "schoolboard::seed",
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        admin_created = report.admin_created,
        "seed finished"
    );
    Ok(())
}

async fn init_repositories(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(PostgresRepositories::new(pool))
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target: "schoolboard::http", addr = %settings.server.addr, "listening");

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if stopping_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = deadline => {
            warn!(
                target: "schoolboard::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
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
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "schoolboard::http", "shutdown signal received");
}
