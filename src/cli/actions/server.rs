use crate::{
    access::{
        AccessConfig, IdentityResolver, MemoryRequestStore, MemoryStudentDirectory,
        MemoryTokenStore, PgRequestStore, PgStudentDirectory, PgTokenStore, RequestQueue,
        RequestStore, RouteTable, SessionIdentityResolver, StaticIdentityResolver,
        StudentDirectory, TokenStore, TokenVerifier,
    },
    api::{self, Services},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_base_url: String,
    pub token_ttl_seconds: i64,
    pub token_max_attempts: u32,
    pub token_secret: Option<SecretString>,
    pub request_ttl_seconds: i64,
    pub request_delivery_seconds: i64,
    pub profile_timeout_ms: u64,
}

impl Args {
    fn access_config(&self) -> AccessConfig {
        AccessConfig::new(self.frontend_base_url.clone())
            .with_token_ttl_seconds(self.token_ttl_seconds)
            .with_max_attempts(self.token_max_attempts)
            .with_shared_secret(self.token_secret.clone())
            .with_request_ttl_seconds(self.request_ttl_seconds)
            .with_delivery_seconds(self.request_delivery_seconds)
            .with_profile_timeout_ms(self.profile_timeout_ms)
    }
}

struct Backends {
    tokens: Arc<dyn TokenStore>,
    requests: Arc<dyn RequestStore>,
    directory: Arc<dyn StudentDirectory>,
    resolver: Arc<dyn IdentityResolver>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.access_config();

    let backends = match &args.dsn {
        Some(dsn) => postgres_backends(dsn).await?,
        None => {
            warn!("No DSN configured, using in-memory storage");
            memory_backends()
        }
    };

    let services = Services {
        verifier: Arc::new(TokenVerifier::new(backends.tokens, config.clone())),
        queue: Arc::new(RequestQueue::new(
            backends.requests,
            backends.directory,
            config.clone(),
        )),
        resolver: backends.resolver,
        routes: Arc::new(RouteTable::default()),
        config,
    };

    api::new(args.port, services).await
}

async fn postgres_backends(dsn: &str) -> Result<Backends> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database");

    Ok(Backends {
        tokens: Arc::new(PgTokenStore::new(pool.clone())),
        requests: Arc::new(PgRequestStore::new(pool.clone())),
        directory: Arc::new(PgStudentDirectory::new(pool.clone())),
        resolver: Arc::new(SessionIdentityResolver::new(pool)),
    })
}

fn memory_backends() -> Backends {
    Backends {
        tokens: Arc::new(MemoryTokenStore::new()),
        requests: Arc::new(MemoryRequestStore::new()),
        directory: Arc::new(MemoryStudentDirectory::new()),
        resolver: Arc::new(StaticIdentityResolver::new()),
    }
}
