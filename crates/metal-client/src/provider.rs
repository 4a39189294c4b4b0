//! Hot-swappable client gateway
//!
//! The kubeconfig of the metal cluster is mounted from a secret and may be
//! rotated at runtime. `ClientProvider` owns the current client behind a
//! read-write lock: scoped accesses hold the read lock so the client cannot
//! be replaced mid-operation, while a swap takes the write lock and waits
//! for in-flight scopes to finish. A background task polls the kubeconfig
//! (following the symlink Kubernetes mounts) and rebuilds the client when
//! the target file changes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::KubeMetalClient;
use crate::error::ClientError;
use crate::traits::MetalClient;

const KUBECONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Gateway to the current metal cluster client.
pub struct ClientProvider {
    inner: RwLock<Arc<dyn MetalClient>>,
    kubeconfig_path: Option<PathBuf>,
}

impl ClientProvider {
    /// Builds the gateway from a kubeconfig file, returning it together
    /// with the namespace of the kubeconfig's current context.
    pub async fn from_kubeconfig(
        path: impl AsRef<Path>,
    ) -> Result<(Arc<Self>, String), ClientError> {
        let path = path.as_ref().to_path_buf();
        let (client, namespace) = build_client(&path).await?;
        info!("created metal client for kubeconfig {}", path.display());
        Ok((
            Arc::new(Self {
                inner: RwLock::new(Arc::new(client)),
                kubeconfig_path: Some(path),
            }),
            namespace,
        ))
    }

    /// Wraps an existing client, typically a mock in tests.
    pub fn from_client(client: Arc<dyn MetalClient>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(client),
            kubeconfig_path: None,
        })
    }

    /// Runs `op` against the current client. The client is guaranteed not
    /// to be swapped for the duration of the callback; concurrent scoped
    /// accesses are allowed.
    pub async fn with_client<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce(Arc<dyn MetalClient>) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.inner.read().await;
        op(Arc::clone(&*guard)).await
    }

    /// Replaces the underlying client once all scoped accesses finished.
    pub async fn swap(&self, client: Arc<dyn MetalClient>) {
        *self.inner.write().await = client;
    }

    /// Spawns the background task that re-reads the kubeconfig and swaps
    /// the client whenever the mounted file changes. Returns `None` for
    /// providers that were not built from a kubeconfig.
    pub fn spawn_reload_task(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let path = self.kubeconfig_path.clone()?;
        let provider = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut last = kubeconfig_fingerprint(&path).await;
            let mut ticker = tokio::time::interval(KUBECONFIG_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let current = kubeconfig_fingerprint(&path).await;
                if current == last {
                    continue;
                }
                last = current;
                match build_client(&path).await {
                    Ok((client, _)) => {
                        provider.swap(Arc::new(client)).await;
                        info!(
                            "kubeconfig {} changed, metal client swapped",
                            path.display()
                        );
                    }
                    Err(err) => {
                        warn!("couldn't rebuild metal client after kubeconfig change: {err}");
                    }
                }
            }
        }))
    }
}

async fn build_client(path: &Path) -> Result<(KubeMetalClient, String), ClientError> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|err| {
        ClientError::Config(format!(
            "failed to read metal kubeconfig {}: {err}",
            path.display()
        ))
    })?;
    let namespace = current_namespace(&kubeconfig)?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|err| {
            ClientError::Config(format!("unable to build metal cluster client config: {err}"))
        })?;
    let client = Client::try_from(config)
        .map_err(|err| ClientError::Config(format!("failed to create client: {err}")))?;
    Ok((KubeMetalClient::new(client), namespace))
}

fn current_namespace(kubeconfig: &Kubeconfig) -> Result<String, ClientError> {
    let context_name = kubeconfig.current_context.as_deref().unwrap_or_default();
    let namespace = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == context_name)
        .and_then(|named| named.context.as_ref())
        .and_then(|context| context.namespace.clone())
        .unwrap_or_default();
    if namespace.is_empty() {
        return Err(ClientError::Config(
            "got an empty namespace from metal cluster kubeconfig".to_string(),
        ));
    }
    Ok(namespace)
}

// The mounted kubeconfig is a symlink whose target changes on rotation, so
// the resolved target path participates in the fingerprint alongside the
// modification time.
async fn kubeconfig_fingerprint(path: &Path) -> Option<(PathBuf, SystemTime)> {
    let target = tokio::fs::canonicalize(path).await.ok()?;
    let modified = tokio::fs::metadata(&target).await.ok()?.modified().ok()?;
    Some((target, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMetalClient;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://127.0.0.1:6443
  name: metal
contexts:
- context:
    cluster: metal
    namespace: metal-system
    user: admin
  name: metal
current-context: metal
users:
- name: admin
  user:
    token: not-a-real-token
"#;

    fn write_kubeconfig(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_from_kubeconfig_extracts_namespace() {
        let file = write_kubeconfig(KUBECONFIG);
        let (_, namespace) = ClientProvider::from_kubeconfig(file.path()).await.unwrap();
        assert_eq!(namespace, "metal-system");
    }

    #[tokio::test]
    async fn test_kubeconfig_without_namespace_is_rejected() {
        let file = write_kubeconfig(&KUBECONFIG.replace("namespace: metal-system\n", ""));
        let err = ClientProvider::from_kubeconfig(file.path())
            .await
            .err()
            .expect("namespace-less kubeconfig must be rejected");
        assert!(err.to_string().contains("empty namespace"));
    }

    #[tokio::test]
    async fn test_with_client_sees_swapped_client() {
        let first = Arc::new(MockMetalClient::new());
        first.add_server(metal_api::Server::new(
            "server-a",
            metal_api::ServerSpec::default(),
        ));
        let provider = ClientProvider::from_client(first);

        let found = provider
            .with_client(|client| async move { client.get_server("server-a").await })
            .await;
        assert!(found.is_ok());

        provider.swap(Arc::new(MockMetalClient::new())).await;
        let found = provider
            .with_client(|client| async move { client.get_server("server-a").await })
            .await;
        assert!(found.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_waits_for_scoped_access() {
        let provider = ClientProvider::from_client(Arc::new(MockMetalClient::new()));

        let scope = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                provider
                    .with_client(|_| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    })
                    .await;
            })
        };

        // Let the scope acquire the read lock before swapping.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let swap_started = tokio::time::Instant::now();
        provider.swap(Arc::new(MockMetalClient::new())).await;
        assert!(swap_started.elapsed() >= Duration::from_millis(90));

        scope.await.unwrap();
    }
}
