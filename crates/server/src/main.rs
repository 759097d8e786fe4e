//! Herald server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use herald_api::{AppState, router as api_router};
use herald_common::Config;
use herald_core::{
    CalendarWatchService, ChannelAdapter, ChatChannel, ClientCache, ConfigCredentialResolver,
    DeviceRegistry, Dispatcher, EmailChannel, FeedConnections, GoogleCalendarProvider, HistoryLog,
    PreferenceStore, PushDeliveryEngine, WebPushTransport, WebhookIngestion, load_vapid_keys,
};
use herald_db::repositories::{
    DeliveryPreferenceRepository, DeliveryRecordRepository, DeviceEndpointRepository,
    FeedConnectionRepository, WebhookSubscriptionRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod scheduler;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting herald server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = herald_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    herald_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Initialize repositories
    let device_repo = DeviceEndpointRepository::new(Arc::clone(&db));
    let preference_repo = DeliveryPreferenceRepository::new(Arc::clone(&db));
    let record_repo = DeliveryRecordRepository::new(Arc::clone(&db));
    let subscription_repo = WebhookSubscriptionRepository::new(Arc::clone(&db));
    let feed_repo = FeedConnectionRepository::new(Arc::clone(&db));

    // Credentials and push keys
    let credentials = Arc::new(ConfigCredentialResolver::new(&config));
    let vapid_keys = load_vapid_keys(credentials.as_ref()).await?;
    let push_transport = Arc::new(WebPushTransport::new(&vapid_keys, &config.push.subject)?);

    // Initialize services
    let devices = DeviceRegistry::new(device_repo);
    let preferences = PreferenceStore::new(preference_repo);
    let history = HistoryLog::new(record_repo);
    let push = PushDeliveryEngine::new(push_transport, devices.clone(), &config.push);

    let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
    if let Some(smtp) = &config.email {
        adapters.push(Arc::new(EmailChannel::new(smtp)?));
        info!(host = %smtp.host, "Email channel enabled");
    } else {
        info!("No SMTP configured, email channel disabled");
    }
    let chat_timeout = config
        .chat
        .as_ref()
        .map_or(config.dispatch.channel_timeout_secs, |c| c.timeout_secs);
    adapters.push(Arc::new(ChatChannel::new(
        credentials.clone(),
        ClientCache::new(),
        Duration::from_secs(chat_timeout),
    )));

    let dispatcher = Arc::new(Dispatcher::new(
        preferences.clone(),
        devices.clone(),
        push,
        adapters,
        history.clone(),
        &config.dispatch,
    ));

    let calendar_provider = Arc::new(GoogleCalendarProvider::new(
        &config.calendar,
        credentials.clone(),
        ClientCache::new(),
    ));
    let calendar = CalendarWatchService::new(
        calendar_provider.clone(),
        subscription_repo.clone(),
        &config.calendar,
    )?;
    let feeds = FeedConnections::new(feed_repo);
    let ingestion = Arc::new(WebhookIngestion::new(
        dispatcher.clone(),
        subscription_repo,
        feeds.clone(),
        calendar_provider,
        credentials,
        &config.calendar,
        &config.dispatch,
    )?);

    if config.calendar.webhook_address.is_none() {
        tracing::warn!("calendar.webhook_address is not set; calendar watches are unavailable");
    }

    let state = AppState {
        vapid_public_key: vapid_keys.public_key.clone(),
        devices,
        preferences,
        history,
        dispatcher,
        ingestion,
        calendar: calendar.clone(),
        feeds,
    };

    // Build router
    let app = api_router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start background jobs
    let renewal = scheduler::spawn_calendar_renewal(calendar, config.calendar.renewal_interval_secs);

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((ip, config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = renewal {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}
