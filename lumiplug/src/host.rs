//! Registry of provider clients for one orchestration run
//!
//! A [`PluginHost`] launches each package's plugin the first time one of its
//! types is needed and hands out shared clients afterwards. Closing the host
//! shuts every plugin down.

use crate::client::ProviderClient;
use crate::config::HostConfig;
use crate::error::{LumiplugError, Result};
use crate::marshal::{NoReferences, ReferenceResolver};
use crate::schema::SchemaRegistry;
use crate::tokens::{Package, Type};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Slot for one package's client, filled by the first successful launch
type ClientCell = Arc<OnceCell<Arc<ProviderClient>>>;

/// Provider clients keyed by package
///
/// The map lock is only held to find or create a package's slot. Launches run
/// outside it, so a slow plugin only delays callers of its own package.
pub struct PluginHost {
    config: HostConfig,
    schemas: Arc<SchemaRegistry>,
    resolver: Arc<dyn ReferenceResolver>,
    clients: Mutex<HashMap<Package, ClientCell>>,
}

impl PluginHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            schemas: Arc::new(SchemaRegistry::new()),
            resolver: Arc::new(NoReferences),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Schemas handed to every client for change planning
    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Resolver handed to every client
    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Client for `package`, launching its plugin on first use
    ///
    /// Concurrent callers for the same package share one launch. A failed
    /// launch is not cached; the next call tries again.
    pub async fn provider(&self, package: &Package) -> Result<Arc<ProviderClient>> {
        let cell = Arc::clone(
            self.clients
                .lock()
                .await
                .entry(package.clone())
                .or_default(),
        );

        let client = cell
            .get_or_try_init(|| async {
                let client = ProviderClient::launch(&self.config, package)
                    .await?
                    .with_schemas(Arc::clone(&self.schemas))
                    .with_resolver(Arc::clone(&self.resolver));
                Ok::<_, LumiplugError>(Arc::new(client))
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Client for the package that owns `ty`
    pub async fn provider_for(&self, ty: &Type) -> Result<Arc<ProviderClient>> {
        self.provider(&ty.package()).await
    }

    /// Registers an already connected client, replacing any existing one
    pub async fn insert(&self, client: ProviderClient) -> Arc<ProviderClient> {
        let client = Arc::new(
            client
                .with_schemas(Arc::clone(&self.schemas))
                .with_resolver(Arc::clone(&self.resolver)),
        );
        let cell = Arc::new(OnceCell::new_with(Some(Arc::clone(&client))));
        self.clients
            .lock()
            .await
            .insert(client.package().clone(), cell);
        client
    }

    /// Packages with a live client
    pub async fn packages(&self) -> Vec<Package> {
        let mut packages: Vec<Package> = self
            .clients
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(package, _)| package.clone())
            .collect();
        packages.sort();
        packages
    }

    /// Closes every plugin; the first failure is returned after all were tried
    pub async fn close(&self) -> Result<()> {
        let cells: Vec<_> = self.clients.lock().await.drain().collect();
        let mut first_error = None;

        for (package, cell) in cells {
            let Some(client) = cell.get() else {
                continue;
            };
            if let Err(e) = client.close().await {
                tracing::warn!(package = %package, error = %e, "Failed to close provider plugin");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tonic::transport::Endpoint;

    #[tokio::test]
    async fn missing_plugin_is_reported_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let host = PluginHost::new(
            HostConfig::default()
                .with_search_path(vec![dir.path().to_path_buf()])
                .with_install_root(dir.path()),
        );

        let ty = Type::new("aws:ec2/vpc:VPC").unwrap();
        let err = host.provider_for(&ty).await.unwrap_err();
        assert!(matches!(err, LumiplugError::PluginNotFound { .. }));
        assert!(host.packages().await.is_empty());
    }

    #[tokio::test]
    async fn inserted_clients_are_shared_and_closed() {
        let host = PluginHost::new(HostConfig::default());
        let package = Package::new("aws").unwrap();
        let channel = Endpoint::from_static("http://127.0.0.1:1").connect_lazy();

        let inserted = host
            .insert(ProviderClient::from_channel(package.clone(), channel))
            .await;
        let fetched = host.provider(&package).await.unwrap();
        assert!(Arc::ptr_eq(&inserted, &fetched));

        host.close().await.unwrap();
        assert!(host.packages().await.is_empty());
    }
}
