use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ella_rs::config::EllaSiteConfig;
use ella_rs::templates::Templates;
use ella_rs::{CONFIG_VAR, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(about = "Serves interviews and the inline editor")]
struct Args {
    #[arg(long, env = CONFIG_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Arc::new(EllaSiteConfig::from_file(&args.config)?);

    let dbpool = Arc::new(ella_rs::new_dbconn_pool(&config.database_url)?);
    {
        let mut conn = dbpool.get()?;
        ella_rs::run_schema_migrations(&mut conn)?;
    }
    info!("created dbpool from {:?}", config.database_url);

    let template_dir = std::path::Path::new(&config.template_dir);
    let templates = Templates::from_dir(template_dir.join("templates"), &config.site.site_name)?
        .add_context("MENUITEMS", &config.site.menu_items);
    info!(
        "initialized template system with templates in {:?}",
        config.template_dir
    );

    let app = ella_rs::router(dbpool, Arc::new(templates), config.clone())
        .nest_service("/static", ServeDir::new(template_dir.join("static")))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr {:?}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
