use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use taskboard::{
    auth::{GitHubProvider, TokenService},
    config::Config,
    responder::ErrorResponder,
    routes,
    state::AppState,
    store::{PgStore, StoreError},
};

fn store_failure(error: StoreError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config =
        Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let tokens = Arc::new(TokenService::new(
        config.session_secret.clone(),
        config.session_ttl_hours,
    ));

    let (state, postgres) = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url).await.map_err(store_failure)?);
            store.migrate().await.map_err(store_failure)?;
            log::info!("Connected to Postgres, migrations applied");
            (
                AppState::new(store.clone(), store.clone(), tokens.clone()),
                Some(store),
            )
        }
        None => {
            log::warn!("DATABASE_URL not set, data will be kept in memory");
            (AppState::in_memory(tokens.clone()), None)
        }
    };

    let mut state = state.with_environment(config.environment);
    match config.github.clone() {
        Some(github) => state = state.with_identity(Arc::new(GitHubProvider::new(github))),
        None => log::warn!(
            "GitHub login disabled: set GITHUB_CLIENT_ID, GITHUB_CLIENT_SECRET and CALLBACK_URL"
        ),
    }

    let environment = config.environment;
    let data = web::Data::new(state);

    log::info!(
        "Starting taskboard server at {} ({:?})",
        config.server_url(),
        environment
    );
    HttpServer::new(move || {
        App::new()
            .wrap(ErrorResponder::new(environment))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(routes::configure(tokens.clone()))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await?;

    if let Some(store) = postgres {
        store.close().await;
        log::info!("Postgres pool closed");
    }
    Ok(())
}
