//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use freightscope_config::ServerConfig;
use freightscope_investigate::Investigator;
use freightscope_llm::MockBackend;
use freightscope_server::Server;
use freightscope_store::MockStore;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A test server running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub backend: Arc<MockBackend>,
    pub store: Arc<MockStore>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start with a backend that answers every question with plain text.
    pub async fn start() -> Result<Self> {
        Self::start_with(MockBackend::with_text("Test answer"), MockStore::new()).await
    }

    pub async fn start_with(backend: MockBackend, store: MockStore) -> Result<Self> {
        let backend = Arc::new(backend);
        let store = Arc::new(store);

        let investigator = Investigator::builder()
            .with_backend(backend.clone())
            .with_store(store.clone())
            .build()?;
        let config = ServerConfig {
            request_logging: false,
            ..Default::default()
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        let server = Server::new(investigator, config);
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            backend,
            store,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            timeout(Duration::from_secs(5), handle).await??;
        }
        Ok(())
    }
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
