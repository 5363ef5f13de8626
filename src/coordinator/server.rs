//! Coordinator server

use crate::cluster::membership::ClusterRegistry;
use crate::common::auth::{
    generate_signing_key, signing_key_from_hex, ServerAuthenticator, StaticIdentityStore,
};
use crate::common::session::SessionIssuer;
use crate::common::{CoordinatorConfig, Result, AUDIT_LOGGER};
use crate::coordinator::dispatch::Coordinator;
use crate::coordinator::http::{create_router, CoordState};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct CoordinatorServer {
    config: CoordinatorConfig,
    node_id: String,
}

impl CoordinatorServer {
    pub fn new(config: CoordinatorConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    /// Wire up authenticator, registry and dispatcher from configuration.
    pub fn build_state(&self) -> Result<CoordState> {
        let signing_key = match &self.config.signing_key {
            Some(hex_key) => signing_key_from_hex(hex_key)?,
            None => {
                tracing::warn!("no signing key configured, generated an ephemeral one");
                generate_signing_key()
            }
        };
        tracing::info!(
            "  Public key: {}",
            hex::encode(signing_key.verifying_key().as_bytes())
        );

        let identities = StaticIdentityStore::from_hex_table(&self.config.users)?;
        tracing::info!("  Registered users: {}", identities.len());

        let mut auth = ServerAuthenticator::new(signing_key, Arc::new(identities));
        let ttl = self.config.session_ttl();
        let sessions = match &self.config.session_secret {
            Some(secret) => Some(SessionIssuer::new(secret.as_bytes(), ttl)),
            None if self.config.require_session => Some(SessionIssuer::ephemeral(ttl)),
            None => None,
        };
        if let Some(sessions) = sessions {
            auth = auth.with_sessions(sessions);
        }

        let registry = Arc::new(ClusterRegistry::new(self.config.heartbeat_ttl()));
        let coordinator = Coordinator::new(registry.clone(), self.config.round_timeout());

        Ok(CoordState {
            coordinator: Arc::new(coordinator),
            auth: Arc::new(auth),
            registry: Some(registry),
            require_session: self.config.require_session,
        })
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    pub async fn serve_on<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting coordinator: {}", self.node_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Round timeout: {:?}", self.config.round_timeout());
        tracing::info!("  Heartbeat TTL: {:?}", self.config.heartbeat_ttl());
        tracing::info!("  Sessions required: {}", self.config.require_session);

        if let Some(path) = &self.config.audit_log {
            AUDIT_LOGGER.set_file(path)?;
            tracing::info!("  Audit log: {}", path.display());
        }

        let router = create_router(self.build_state()?);

        tracing::info!("✓ Coordinator ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down coordinator");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::auth::generate_signing_key;

    #[test]
    fn test_build_state_from_config() {
        let user_key = generate_signing_key();
        let mut config = CoordinatorConfig::default();
        config.signing_key = Some(hex::encode(generate_signing_key().to_bytes()));
        config
            .users
            .insert("alice".to_string(), hex::encode(user_key.verifying_key().as_bytes()));
        config.require_session = true;

        let state = CoordinatorServer::new(config, "coord-1".to_string())
            .build_state()
            .unwrap();
        assert!(state.require_session);
        assert!(state.auth.sessions().is_some());
        assert!(state.registry.is_some());
    }

    #[test]
    fn test_build_state_rejects_bad_key() {
        let config = CoordinatorConfig {
            signing_key: Some("not hex".to_string()),
            ..Default::default()
        };
        assert!(CoordinatorServer::new(config, "coord-1".to_string())
            .build_state()
            .is_err());
    }
}
