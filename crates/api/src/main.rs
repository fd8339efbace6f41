use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskforge_api::capabilities::{self, CapabilityDeps};
use taskforge_api::config::FileConfig;
use taskforge_api::router::build_app_router;
use taskforge_api::state::AppState;
use taskforge_api::{callbacks, dispatch};
use taskforge_core::script::store::{MemoryScriptStore, ScriptStore};
use taskforge_core::script::ScriptPool;
use taskforge_db::SqlClients;
use taskforge_kv::{KvClient, RedisScriptStore};
use taskforge_registry::{ConfigStores, ConfigSubscriber, HttpRegistryClient};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskforge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let config = match FileConfig::load(&config_dir) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!(error = %err, "no valid config file found");
            std::process::exit(1);
        }
    };
    tracing::info!(title = %config.app.title, "starting");

    // --- Redis (data + script source connections) ---
    let redis = &config.database.redis;
    let (kv_data, kv_scripts) = if redis.enable {
        let data = KvClient::connect(&redis.addr, &redis.password, redis.db).await;
        let scripts = KvClient::connect(&redis.addr, &redis.password, redis.db_config).await;
        match (data, scripts) {
            (Ok(data), Ok(scripts)) => (Some(data), Some(scripts)),
            (Err(err), _) | (_, Err(err)) => {
                tracing::error!(error = %err, "failed to connect to redis");
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("redis is disabled; using the in-process script store");
        (None, None)
    };

    // --- MySQL named pools ---
    let sql_settings = config.mysql_settings();
    let sql = if sql_settings.is_empty() {
        None
    } else {
        let clients = SqlClients::connect(&sql_settings).await;
        if clients.is_empty() {
            None
        } else {
            Some(Arc::new(clients))
        }
    };

    // --- Config registry subscription ---
    if config.nacos.server_addr.is_empty() {
        tracing::warn!("config registry not configured; skipping subscription");
    } else {
        let handlers = callbacks::write_back_handlers(kv_data.clone());
        let stores = Arc::new(ConfigStores::new(handlers));
        let ready = Arc::new(AtomicBool::new(false));
        let callback = dispatch::build_change_callback(stores, ready.clone());

        let client = match HttpRegistryClient::new(&config.nacos.registry_settings()) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to create registry client");
                std::process::exit(1);
            }
        };
        let subscriber = ConfigSubscriber::new(client, callback);
        if let Err(err) = subscriber.start().await {
            tracing::error!(error = %err, "failed to initialize config subscription");
            std::process::exit(1);
        }
        ready.store(true, Ordering::SeqCst);
    }

    // --- Script pool ---
    let store: Arc<dyn ScriptStore> = match kv_scripts {
        Some(kv) => Arc::new(RedisScriptStore::new(config.script.group_name.clone(), kv)),
        None => Arc::new(MemoryScriptStore::new()),
    };
    let pool = ScriptPool::new(store);
    pool.cache().initialize().await;

    let deps = CapabilityDeps {
        handle: tokio::runtime::Handle::current(),
        kv_data,
        sql,
        http: reqwest::Client::new(),
    };
    if let Err(err) = capabilities::inject_all(&pool, &deps) {
        tracing::error!(error = %err, "failed to inject capabilities");
        std::process::exit(1);
    }

    // --- Web server ---
    if !config.web.enable {
        tracing::info!("web server is disabled");
        std::future::pending::<()>().await;
        return;
    }

    let port = config.web.port;
    let state = AppState {
        pool,
        config: config.clone(),
    };
    let app = build_app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("web server started: http://127.0.0.1:{port}");

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "http server error");
    }
}
