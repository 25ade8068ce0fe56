pub mod data;
pub mod error;
mod validate;

use std::net::TcpListener;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use hyper::header::{HeaderValue, CACHE_CONTROL};
use tracing::info;

use self::data::{CoursesQuery, CoursesResponse, PostResponse};
use self::error::Error;
use crate::app::App;
use crate::shutdown::Shutdown;

async fn get_courses(
    State(app): State<Arc<App>>,
    Query(query): Query<CoursesQuery>,
) -> Result<Json<CoursesResponse>, Error> {
    let scraper = query.scraper.ok_or(Error::MissingScraper)?;
    let since = match &query.since {
        None => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| Error::MalformedSince(raw.clone()))?,
        ),
    };
    if since.is_some() && query.current_term.is_none() {
        return Err(Error::MissingCurrentTerm);
    }

    let result = app.database.query(
        &scraper,
        since,
        query.current_term.as_deref(),
        query.requested_term.as_deref(),
    )?;

    Ok(Json(CoursesResponse {
        error: None,
        courses: result.diff.payload,
        until: result.diff.age,
        full: result.diff.full,
        term: result.term,
    }))
}

async fn post_courses(
    State(app): State<Arc<App>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<PostResponse>, Error> {
    let update = validate::check(&body)?;
    let age = app
        .database
        .ingest(&update.scraper, update.term, update.courses);
    info!(scraper = %update.scraper, age, "ingested course data");
    app.report_success().await;
    Ok(Json(PostResponse { error: None }))
}

async fn health() -> Result<(), Error> {
    Ok(())
}

// The API is polled; intermediaries must not serve stale envelopes.
async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// # Errors
///
/// Will return `Err` if the server cannot bind to the configured address.
pub async fn run(app: Arc<App>, shutdown: Shutdown) -> anyhow::Result<()> {
    let address = app.config.listen_address();
    info!("Will listen on {}", address);
    let listener = TcpListener::bind(address)?;

    bind_from_listener(app, listener, shutdown).await
}

/// # Errors
///
/// Will return `Err` if the provided `listener` cannot be registered with
/// the runtime or the server errors while serving.
pub async fn bind_from_listener(
    app: Arc<App>,
    listener: TcpListener,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;

    let router = Router::new()
        .route("/courses", get(get_courses).post(post_courses))
        // Health check, return 200 OK
        .route("/health", get(health))
        .layer(middleware::from_fn(no_cache))
        .with_state(app);

    let server = axum::serve(listener, router).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.await_shutdown().await }
    });

    server.await?;

    Ok(())
}
