use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::JwtKeys;
use crate::config::{AppConfig, JwtConfig, VCodeConfig};
use crate::middleware::Metrics;
use crate::users::{AccountService, InMemoryUserRepo, PgUserRepo, UserRepo, UserService, VerificationCodes};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserService>,
    pub metrics: Metrics,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let repo: Arc<dyn UserRepo> = match &config.database_url {
            Some(url) => {
                info!("using postgres user store");
                Arc::new(PgUserRepo::connect(url).await?)
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(InMemoryUserRepo::new())
            }
        };

        Self::with_repo(config, repo)
    }

    /// Wires the account service over `repo` using `config`.
    pub fn with_repo(config: AppConfig, repo: Arc<dyn UserRepo>) -> anyhow::Result<Self> {
        let jwt = JwtKeys::from_config(&config.jwt);
        let codes = VerificationCodes::new(time::Duration::seconds(config.vcode.ttl_seconds));
        let users = Arc::new(AccountService::new(
            repo,
            codes,
            jwt.clone(),
            config.vcode.expose_in_response,
        ));
        Self::from_parts(Arc::new(config), users)
    }

    /// Builds state around an arbitrary `UserService`, e.g. a recording stub.
    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserService>) -> anyhow::Result<Self> {
        Ok(Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users,
            metrics: Metrics::new()?,
        })
    }

    /// In-memory state for tests and local runs: no database, codes echoed.
    pub fn fake() -> anyhow::Result<Self> {
        Self::with_repo(Self::test_config(), Arc::new(InMemoryUserRepo::new()))
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            vcode: VCodeConfig {
                ttl_seconds: 300,
                expose_in_response: true,
            },
            static_dir: "./static".into(),
        }
    }
}
