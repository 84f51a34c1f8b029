use std::path::Path;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;

use api::AppState;
use blockchain::{chapters, Blockchain, LedgerStorage, LocationDirectory, RewardBook, WalletStore};
use config::NodeConfig;

// Open the ledger from storage, falling back to a fresh in-memory ledger
fn initialize_ledger(data_dir: &Path, difficulty: usize) -> anyhow::Result<(Blockchain, WalletStore)> {
    std::fs::create_dir_all(data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    let opened = LedgerStorage::open(data_dir)
        .map_err(anyhow::Error::from)
        .and_then(|storage| {
            let storage = Arc::new(storage);
            let chain = Blockchain::with_storage(Arc::clone(&storage), difficulty)?;
            let wallets = WalletStore::with_storage(storage)?;
            Ok((chain, wallets))
        });

    match opened {
        Ok(ledger) => {
            info!("Loaded ledger from storage at {}", data_dir.display());
            Ok(ledger)
        }
        Err(err) => {
            warn!("Failed to load ledger from storage: {}", err);
            warn!("Creating in-memory ledger instead");

            let chain = Blockchain::new(difficulty).context("creating genesis block")?;
            Ok((chain, WalletStore::new()))
        }
    }
}

fn load_locations(config: &NodeConfig) -> LocationDirectory {
    let Some(path) = &config.locations_file else {
        warn!("No locations file configured, check-ins will be rejected");
        return LocationDirectory::default();
    };

    match LocationDirectory::load(path) {
        Ok(directory) => {
            info!("Loaded {} check-in locations from {}", directory.len(), path.display());
            directory
        }
        Err(err) => {
            warn!("Failed to load locations from {}: {}", path.display(), err);
            LocationDirectory::default()
        }
    }
}

// Seal the configured chapter dataset into a chain that holds only genesis
fn seed_chapters(config: &NodeConfig, chain: &Blockchain) -> anyhow::Result<()> {
    let Some(path) = &config.chapters_file else {
        return Ok(());
    };

    if chain.len() > 1 {
        info!("Chain already holds {} blocks, skipping chapter import", chain.len());
        return Ok(());
    }

    let chapters = chapters::load_chapters(path)
        .with_context(|| format!("reading chapters from {}", path.display()))?;
    let blocks = chain.append_chapters(chapters)?;
    info!("Imported {} chapters into the chain", blocks.len());
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::add_chapters,
        api::handlers::register_user,
        api::handlers::get_user,
        api::handlers::get_wallet_balance,
        api::handlers::submit_reward,
        api::handlers::get_pending_rewards,
        api::handlers::flush_rewards,
        api::handlers::check_in
    ),
    components(
        schemas(
            blockchain::Wallet,
            blockchain::Currency,
            blockchain::Coordinates,
            blockchain::Chapter,
            blockchain::payload::Verse,
            api::handlers::ChainResponse,
            api::handlers::RegisterRequest,
            api::handlers::RegisterResponse,
            api::handlers::RewardKind,
            api::handlers::RewardRequest,
            api::handlers::RewardResponse,
            api::handlers::FlushResponse,
            api::handlers::CheckInRequest,
            api::handlers::ChaptersResponse
        )
    ),
    tags(
        (name = "quranchain", description = "QuranChain ledger API endpoints")
    ),
    info(
        title = "QuranChain API",
        version = "0.1.0",
        description = "Proof-of-work ledger for QuranChain rewards and wallets",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;
    info!("Mining difficulty: {}", config.difficulty);

    let (chain, wallets) = initialize_ledger(&config.data_dir, config.difficulty)?;
    if let Err(err) = seed_chapters(&config, &chain) {
        error!("Chapter import failed: {:#}", err);
    }

    let state = web::Data::new(AppState {
        chain,
        rewards: RewardBook::new(),
        wallets,
        locations: load_locations(&config),
    });

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    let server_state = state.clone();
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(server_state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    info!("Server stopped, writing final snapshot");
    if !state.rewards.is_empty() {
        warn!("{} pending rewards were never flushed", state.rewards.len());
    }
    state.chain.save()?;
    state.wallets.save()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_opens_from_storage() {
        let dir = tempfile::tempdir().unwrap();

        {
            let (chain, wallets) = initialize_ledger(dir.path(), 0).unwrap();
            wallets.register("alice").unwrap();
            chain.save().unwrap();
        }

        let (chain, wallets) = initialize_ledger(dir.path(), 0).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(wallets.get("alice").is_some());
    }

    #[test]
    fn test_unusable_storage_falls_back_to_memory() {
        // A path below a regular file can never become a database directory
        let file = tempfile::NamedTempFile::new().unwrap();
        let data_dir = file.path().join("ledger");

        let (chain, wallets) = initialize_ledger(&data_dir, 1).unwrap();

        assert_eq!(chain.len(), 1);
        assert!(chain.validate());
        assert_eq!(wallets.len(), 0);

        let block = chain.append(blockchain::Payload::genesis()).unwrap();
        assert_eq!(block.index(), 1);
        wallets.register("alice").unwrap();
        assert!(!data_dir.exists());
    }
}
