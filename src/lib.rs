#[macro_use]
extern crate diesel;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Path},
    http::HeaderMap,
    routing::get,
    Router,
};
use bytes::Bytes;
use diesel::prelude::SqliteConnection;
use diesel::r2d2;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub mod admin;
pub mod auth;
pub mod config;
pub mod constants;
pub mod content_types;
pub mod errors;
pub mod forms;
pub mod handler;
pub mod handlers;
pub mod interviews;
pub mod models;
pub mod permissions;
pub mod schema;
pub mod templates;
pub mod upgrade;
pub mod view_models;

#[cfg(test)]
mod test_util;

pub use crate::constants::*;

pub type DbPool = r2d2::Pool<r2d2::ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn new_dbconn_pool(db_file: &str) -> Result<DbPool, anyhow::Error> {
    let manager = r2d2::ConnectionManager::<SqliteConnection>::new(db_file);
    Ok(r2d2::Pool::new(manager)?)
}

/// Brings the legacy schema up to date. The publishable upgrade itself is separate.
pub fn run_schema_migrations(conn: &mut SqliteConnection) -> Result<(), anyhow::Error> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("running schema migrations: {}", e))?;
    for version in applied {
        log::info!("applied schema migration {}", version);
    }
    Ok(())
}

fn peer(remote: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    remote.map(|ConnectInfo(addr)| addr)
}

pub fn router(
    pool: Arc<DbPool>,
    templates: Arc<templates::Templates>,
    config: Arc<config::EllaSiteConfig>,
) -> Router {
    Router::new()
        .route(
            "/interviews/:slug/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path(slug): Path<String>, headers: HeaderMap, remote: Option<ConnectInfo<SocketAddr>>| {
                    handlers::get_interview_handler(slug, headers, peer(remote), pool.clone(), templates.clone())
                }
            }),
        )
        .route(
            "/interviews/:slug/unanswered/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path(slug): Path<String>, headers: HeaderMap, remote: Option<ConnectInfo<SocketAddr>>| {
                    handlers::get_unanswered_handler(slug, headers, peer(remote), pool.clone(), templates.clone())
                }
            }),
        )
        .route(
            "/interviews/:slug/reply/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path(slug): Path<String>, headers: HeaderMap, remote: Option<ConnectInfo<SocketAddr>>| {
                    handlers::get_reply_list_handler(slug, headers, peer(remote), pool.clone(), templates.clone())
                }
            }),
        )
        .route(
            "/interviews/:slug/reply/:question/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path((slug, question)): Path<(String, String)>,
                      headers: HeaderMap,
                      remote: Option<ConnectInfo<SocketAddr>>| {
                    handlers::reply_handler(
                        slug,
                        question,
                        headers,
                        peer(remote),
                        None,
                        pool.clone(),
                        templates.clone(),
                    )
                }
            })
            .post({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path((slug, question)): Path<(String, String)>,
                      headers: HeaderMap,
                      remote: Option<ConnectInfo<SocketAddr>>,
                      body: Bytes| {
                    handlers::reply_handler(
                        slug,
                        question,
                        headers,
                        peer(remote),
                        Some(body),
                        pool.clone(),
                        templates.clone(),
                    )
                }
            }),
        )
        .route(
            "/interviews/:slug/ask/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                let config = config.clone();
                move |Path(slug): Path<String>, headers: HeaderMap, remote: Option<ConnectInfo<SocketAddr>>| {
                    handlers::ask_handler(
                        slug,
                        headers,
                        peer(remote),
                        None,
                        pool.clone(),
                        templates.clone(),
                        config.clone(),
                    )
                }
            })
            .post({
                let pool = pool.clone();
                let templates = templates.clone();
                let config = config.clone();
                move |Path(slug): Path<String>,
                      headers: HeaderMap,
                      remote: Option<ConnectInfo<SocketAddr>>,
                      body: Bytes| {
                    handlers::ask_handler(
                        slug,
                        headers,
                        peer(remote),
                        Some(body),
                        pool.clone(),
                        templates.clone(),
                        config.clone(),
                    )
                }
            }),
        )
        .route(
            "/admin/inlines/:inline/:app_label/:model/:object_id/",
            get({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path((inline, app_label, model, object_id)): Path<(String, String, String, String)>,
                      headers: HeaderMap,
                      remote: Option<ConnectInfo<SocketAddr>>| {
                    let target = handlers::InlineTarget {
                        inline,
                        app_label,
                        model,
                        object_id,
                    };
                    handlers::inline_handler(target, headers, peer(remote), None, pool.clone(), templates.clone())
                }
            })
            .post({
                let pool = pool.clone();
                let templates = templates.clone();
                move |Path((inline, app_label, model, object_id)): Path<(String, String, String, String)>,
                      headers: HeaderMap,
                      remote: Option<ConnectInfo<SocketAddr>>,
                      body: Bytes| {
                    let target = handlers::InlineTarget {
                        inline,
                        app_label,
                        model,
                        object_id,
                    };
                    handlers::inline_handler(
                        target,
                        headers,
                        peer(remote),
                        Some(body),
                        pool.clone(),
                        templates.clone(),
                    )
                }
            }),
        )
        .layer(DefaultBodyLimit::max(MAX_FORM_LENGTH))
}
