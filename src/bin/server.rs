use std::{fs::OpenOptions, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use tresorier::{
    AppState, PasswordHash, bootstrap_admin, build_router, graceful_shutdown, logging_middleware,
};

/// The JSON API server for the association's treasury dashboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "TRESORIER_DB_PATH")]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, env = "TRESORIER_PORT", default_value_t = 3000)]
    port: u16,

    /// The canonical name of the association's timezone. Recurring charges
    /// fall due on dates in this timezone.
    #[arg(long, env = "TRESORIER_TIMEZONE", default_value = "Etc/UTC")]
    timezone: String,

    /// The secret used to encrypt session cookies.
    #[arg(long, env = "SECRET", hide_env_values = true)]
    secret: String,

    /// The email of the administrator created on first start.
    #[arg(long, env = "TRESORIER_ADMIN_EMAIL", default_value = "admin@csrp.fr")]
    admin_email: String,

    /// The password of the administrator created on first start. Ignored once
    /// the database has users.
    #[arg(long, env = "TRESORIER_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let conn = Connection::open(&args.db_path).expect("Could not open the database.");
    let state =
        AppState::new(conn, &args.secret, &args.timezone).expect("Could not create app state.");

    create_first_admin(&state, &args.admin_email, args.admin_password.as_deref());

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state).layer(middleware::from_fn(logging_middleware));
    let router = add_tracing_layer(router);

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("Server stopped with an error.");
}

fn create_first_admin(state: &AppState, email: &str, password: Option<&str>) {
    let connection = state
        .db_connection
        .lock()
        .expect("Could not acquire the database lock.");

    let Some(password) = password else {
        tracing::debug!("No administrator password given, skipping bootstrap.");
        return;
    };

    let password_hash = PasswordHash::from_raw_password(password, PasswordHash::DEFAULT_COST)
        .expect("The administrator password is not valid.");

    match bootstrap_admin(email, password_hash, &connection) {
        Ok(Some(admin)) => tracing::info!("Created administrator {}.", admin.email),
        Ok(None) => tracing::debug!("Users already exist, skipping bootstrap."),
        Err(error) => tracing::error!("Could not create the administrator: {error}"),
    }
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but errors are
        // already logged where they happen.
        .on_failure(());

    router.layer(tracing_layer)
}
