#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use control_plane_api::auth::password::hash_password;
use control_plane_api::clock::{Clock, ManualClock};
use control_plane_api::config::AppConfig;
use control_plane_api::database::models::{Session, User};
use control_plane_api::database::{MemoryStore, Store};
use control_plane_api::server;
use control_plane_api::services::license_service::{IssueLicense, LicenseView};
use control_plane_api::services::operator_service::NewOperator;
use control_plane_api::services::tenant_service::{CreateTenant, CreatedTenant};
use control_plane_api::services::{Actor, RequestOrigin};
use control_plane_api::state::AppState;
use control_plane_api::types::PlanTier;

pub const OPERATOR_EMAIL: &str = "ops@control-plane.test";
pub const OPERATOR_PASSWORD: &str = "correct-horse-battery";

/// Services over a fresh in-memory store and a clock that only moves when told
pub struct TestContext {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub config: AppConfig,
    pub state: AppState,
    pub operator: Actor,
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        let mut config = AppConfig::development();
        config.security.bcrypt_cost = 4;
        config.api.enable_request_logging = false;
        Self::with_config(config).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::starting_now());
        let state = AppState::new(&config, Arc::new(store.clone()), clock.clone())?;

        let created = state
            .operators
            .create_operator(
                &Actor::cli(),
                NewOperator {
                    name: "Olga Operator".to_string(),
                    email: OPERATOR_EMAIL.to_string(),
                    password: Some(OPERATOR_PASSWORD.to_string()),
                },
            )
            .await?;
        let operator = Actor::operator(created.operator.id, OPERATOR_EMAIL, RequestOrigin::default());

        Ok(Self {
            store,
            clock,
            config,
            state,
            operator,
        })
    }

    pub async fn create_tenant(&self, name: &str, owner_email: &str) -> Result<CreatedTenant> {
        let created = self
            .state
            .tenants
            .create(
                &self.operator,
                CreateTenant {
                    name: name.to_string(),
                    owner_name: "Owner Admin".to_string(),
                    owner_email: owner_email.to_string(),
                    phone: None,
                    address: None,
                },
            )
            .await?;
        Ok(created)
    }

    pub async fn issue_license(&self, tenant_id: Uuid, plan: PlanTier, days: i64, trial: bool) -> Result<LicenseView> {
        let license = self
            .state
            .licenses
            .issue(
                &self.operator,
                IssueLicense {
                    tenant_id,
                    plan,
                    duration_days: Some(days),
                    is_trial: trial,
                    max_users: None,
                    max_tables: None,
                    notes: None,
                },
            )
            .await?;
        Ok(license)
    }

    /// Extra tenant user created a minute after the owner so the owner stays first
    pub async fn add_user(&self, tenant_id: Uuid, email: &str) -> Result<User> {
        self.clock.advance(Duration::minutes(1));
        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            tenant_id,
            role_id: None,
            name: "Staff Member".to_string(),
            username: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            password_hash: hash_password("staff-password", 4).await?,
            active: true,
            locked: false,
            is_operator: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_user(&user).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Live tenant-app session valid for one day
    pub async fn add_session(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Session> {
        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            created_at: now,
            expires_at: now + Duration::days(1),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_session(&session).await?;
        tx.commit().await?;
        Ok(session)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<User> {
        let mut tx = self.store.begin().await?;
        tx.find_user(user_id).await?.context("user not found")
    }

    pub async fn live_sessions(&self, tenant_id: Uuid) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        Ok(tx.count_live_sessions(tenant_id, self.clock.now()).await?)
    }

    /// Serve the real router on an ephemeral port
    pub async fn spawn_server(&self) -> Result<TestServer> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let app = server::app(self.state.clone(), &self.config);
        tokio::spawn(async move {
            let _ = server::serve(listener, app).await;
        });

        Ok(TestServer {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
        })
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Operator token for the seeded operator
    pub async fn login(&self) -> Result<String> {
        let (status, body) = self
            .post(
                "/admin/login",
                None,
                &serde_json::json!({ "email": OPERATOR_EMAIL, "password": OPERATOR_PASSWORD }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response carried no token")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: &Value) -> Result<(StatusCode, Value)> {
        self.send(self.client.post(self.url(path)), token, body).await
    }

    pub async fn patch(&self, path: &str, token: Option<&str>, body: &Value) -> Result<(StatusCode, Value)> {
        self.send(self.client.patch(self.url(path)), token, body).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: &Value) -> Result<(StatusCode, Value)> {
        self.send(self.client.put(self.url(path)), token, body).await
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        token: Option<&str>,
        body: &Value,
    ) -> Result<(StatusCode, Value)> {
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.json(body).send().await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }
}
