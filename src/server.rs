//! Container Runtime Interface server implementation
use crate::{
    bundle::store::BundleStore,
    cri::{
        api::{
            image_service_server::ImageServiceServer, runtime_service_server::RuntimeServiceServer,
        },
        cri_service::{CRIServiceBuilder, EVENTS_CHANNEL_CAPACITY},
    },
    lock_map::RwLockMap,
    namespace::NamespaceManager,
    network::{
        cni::{CNIBuilder, CNI},
        Network, NetworkBuilder,
    },
    oci::runtime_adapter::RuntimeAdapter,
    pull_coalescer::PullCoalescer,
    registrar::Registrar,
    resource_store::ResourceStore,
    storage::{container_storage::ContainerStorage, default_key_value_storage::DefaultKeyValueStorage, KeyValueStorage},
    unix_stream::UnixStream,
};
use anyhow::{bail, Context, Result};
use clap::crate_name;
pub use crate::config::{Config, LogScope};
use env_logger::fmt::Color;
use futures::TryFutureExt;
use log::{debug, info, trace, LevelFilter};
use std::{collections::HashMap, env, io::Write, sync::Arc};
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::{
    fs,
    signal::unix::{signal, SignalKind},
    sync::{broadcast, Mutex as AsyncMutex, RwLock},
};
use tonic::transport;

/// Server is the main instance to run the Container Runtime Interface
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start a new server with its default values
    pub async fn start(self) -> Result<()> {
        self.set_logging_verbosity()
            .context("set logging verbosity")?;

        // Setup the storage and pass it to the service
        let storage =
            DefaultKeyValueStorage::open(&self.config.storage_path().join("cri-service"))?;

        let network = Arc::new(AsyncMutex::new(
            self.initialize_network().await.context("init network")?,
        ));

        let config = Arc::new(self.config.clone());
        let bundle_store = Arc::new(
            BundleStore::open(config.storage_path().join("bundles"))
                .await
                .context("open bundle store")?,
        );
        let container_storage = Arc::new(ContainerStorage::new(
            config.storage_path().join("containers"),
            config.run_root_path().join("containers"),
        ));
        let runtime_adapter = Arc::new(
            RuntimeAdapter::from_binaries(config.conmon_binary().clone(), config.runtime_binary().clone())
                .exit_dir(config.run_root_path().join("exits"))
                .runtime_root(config.run_root_path().join("runtime"))
                .build()
                .context("build runtime adapter")?,
        );
        let (events, _rx) = broadcast::channel(EVENTS_CHANNEL_CAPACITY);

        let cri_service = CRIServiceBuilder::default()
            .storage(storage.clone())
            .config(config)
            .registrar(Arc::new(Registrar::new()))
            .bundle_store(bundle_store)
            .container_storage(container_storage)
            .resource_store(Arc::new(ResourceStore::default()))
            .pull_coalescer(Arc::new(PullCoalescer::new()))
            .namespace_manager(Arc::new(NamespaceManager::new().context("build namespace manager")?))
            .runtime_adapter(runtime_adapter)
            .stop_mutex(Arc::new(RwLockMap::default()))
            .sandboxes(Arc::new(RwLock::new(HashMap::new())))
            .network(network.clone())
            .events(events)
            .build()
            .context("build CRI service")?;

        // Build a new socket from the config
        let uds = self.unix_domain_listener().await?;

        // Handle shutdown based on signals
        let mut shutdown_terminate = signal(SignalKind::terminate())?;
        let mut shutdown_interrupt = signal(SignalKind::interrupt())?;

        info!(
            "Runtime server listening on {}",
            self.config.sock_path().display()
        );

        let incoming = async_stream::stream! {
            while let item = uds.accept().map_ok(|(st, _)| UnixStream(st)).await {
                yield item;
            }
        };

        tokio::select! {
            res = transport::Server::builder()
                .add_service(RuntimeServiceServer::new(cri_service.clone()))
                .add_service(ImageServiceServer::new(cri_service))
                .serve_with_incoming(incoming) => {
                res.context("run GRPC server")?
            }
            _ = shutdown_interrupt.recv() => {
                info!("Got interrupt signal, shutting down server");
            }
            _ = shutdown_terminate.recv() => {
                info!("Got termination signal, shutting down server");
            }
        }

        self.cleanup(storage, network).await
    }

    /// Create a new UnixListener from the configs socket path.
    async fn unix_domain_listener(&self) -> Result<UnixListener> {
        let sock_path = self.config.sock_path();
        if !sock_path.is_absolute() {
            bail!(
                "specified socket path {} is not absolute",
                sock_path.display()
            )
        }
        if sock_path.exists() {
            fs::remove_file(sock_path)
                .await
                .with_context(|| format!("unable to remove socket file {}", sock_path.display()))?;
        } else {
            let sock_dir = sock_path
                .parent()
                .context("unable to get socket path directory")?;
            fs::create_dir_all(sock_dir)
                .await
                .with_context(|| format!("unable to create socket dir {}", sock_dir.display()))?;
        }

        Ok(UnixListener::bind(sock_path).context("unable to bind socket from path")?)
    }

    /// Initialize the logger and set the verbosity to the provided level.
    fn set_logging_verbosity(&self) -> Result<()> {
        // Set the logging verbosity via the env
        let level = if self.config.log_scope() == LogScope::Global {
            self.config.log_level().to_string()
        } else {
            format!("{}={}", crate_name!(), self.config.log_level())
        };
        env::set_var("RUST_LOG", level);

        // Initialize the logger with the format:
        // [YYYY-MM-DDTHH:MM:SS:MMMZ LEVEL crate::module file:LINE] MSGâ€¦
        // The file and line will be only printed when running with debug or trace level.
        let log_level = self.config.log_level();
        env_logger::builder()
            .format(move |buf, r| {
                let mut style = buf.style();
                style.set_color(Color::Black).set_intense(true);
                writeln!(
                    buf,
                    "{}{} {:<5} {}{}{} {}",
                    style.value("["),
                    buf.timestamp_millis(),
                    buf.default_styled_level(r.level()),
                    r.target(),
                    match (log_level >= LevelFilter::Debug, r.file(), r.line()) {
                        (true, Some(file), Some(line)) => format!(" {}:{}", file, line),
                        _ => "".into(),
                    },
                    style.value("]"),
                    r.args()
                )
            })
            .try_init()
            .context("init env logger")
    }

    /// Create a new network and initialize it from the internal configuration.
    async fn initialize_network(&self) -> Result<Network<CNI>> {
        let mut cni_network = CNIBuilder::default()
            .default_network_name(self.config.cni_default_network().clone())
            .config_paths(self.config.cni_config_paths().clone())
            .plugin_paths(self.config.cni_plugin_paths())
            .storage_path(self.config.storage_path().join("cni"))
            .build()
            .context("build CNI network data")?;

        cni_network
            .initialize()
            .await
            .context("initialize CNI network")?;

        let network = NetworkBuilder::<CNI>::default()
            .implementation(cni_network)
            .build()
            .context("build CNI network")?;

        Ok(network)
    }

    /// Cleanup the server and persist any data if necessary.
    async fn cleanup(
        self,
        mut storage: DefaultKeyValueStorage,
        network: Arc<AsyncMutex<Network<CNI>>>,
    ) -> Result<()> {
        debug!("Cleaning up server");

        trace!("Persisting storage");
        storage.persist().context("persist storage")?;

        trace!("Removing socket path");
        std::fs::remove_file(self.config.sock_path()).with_context(|| {
            format!(
                "unable to remove socket path {}",
                self.config.sock_path().display()
            )
        })?;

        trace!("Stopping network");
        network.lock().await.cleanup().await.context("clean up network")?;

        trace!("Server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn unix_domain_listener_success() -> Result<()> {
        let sock_path = &tempdir()?.path().join("test.sock");
        let config = ConfigBuilder::default().sock_path(sock_path).build()?;
        let sut = Server::new(config);

        assert!(!sock_path.exists());
        sut.unix_domain_listener().await?;
        assert!(sock_path.exists());

        Ok(())
    }

    #[tokio::test]
    async fn unix_domain_listener_success_exists() -> Result<()> {
        let sock_path = NamedTempFile::new()?;
        let config = ConfigBuilder::default()
            .sock_path(sock_path.path())
            .build()?;
        let sut = Server::new(config);

        assert!(sock_path.path().exists());
        sut.unix_domain_listener().await?;
        assert!(sock_path.path().exists());

        Ok(())
    }

    #[tokio::test]
    async fn unix_domain_listener_fail_not_absolute() -> Result<()> {
        let config = ConfigBuilder::default()
            .sock_path("not/absolute/path")
            .build()?;
        let sut = Server::new(config);

        assert!(sut.unix_domain_listener().await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn initialize_network_success() -> Result<()> {
        let config = ConfigBuilder::default()
            .storage_path(tempdir()?.path())
            .build()?;
        let sut = Server::new(config);
        sut.initialize_network().await?;
        Ok(())
    }

    #[tokio::test]
    async fn initialize_network_wrong_storage_path() -> Result<()> {
        let config = ConfigBuilder::default()
            .storage_path("/proc/storage")
            .build()?;
        let sut = Server::new(config);
        assert!(sut.initialize_network().await.is_err());
        Ok(())
    }
}
