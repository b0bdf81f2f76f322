//! Routes newly connected ports to the session that serves them.
//!
//! Each accepted port gets its own session task under a per-port span.
//! Unknown port names are dropped, which closes the channel on the client.

use std::collections::HashMap;
use std::sync::Arc;

use bclient::{BandcampApi, FileSource};
use tokio::sync::Mutex;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::logger::{TraceId, port_span};
use crate::metrics::counters::Counters;
use crate::port::Port;
use crate::protocol::{COLLECTION_PORT, DOWNLOAD_PORT};
use crate::rate_limit::RateLimiter;
use crate::session::{CollectionSession, DownloadSession};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn BandcampApi>,
    pub files: Arc<dyn FileSource>,
    /// One limiter for all outbound API calls, whichever port issued them.
    pub limiter: Arc<RateLimiter>,
    pub config: AppConfig,
    pub counters: Counters,
}

impl Services {
    pub fn new(api: Arc<dyn BandcampApi>, files: Arc<dyn FileSource>, config: AppConfig) -> Self {
        Self {
            api,
            files,
            limiter: Arc::new(RateLimiter::new(config.rate_limit())),
            config,
            counters: Counters::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    Collection,
    Download,
}

impl PortKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            COLLECTION_PORT => Some(PortKind::Collection),
            DOWNLOAD_PORT => Some(PortKind::Download),
            _ => None,
        }
    }
}

pub struct PortRouter {
    services: Services,

    /// Live sessions keyed by port id.
    active: Mutex<HashMap<Uuid, PortKind>>,
}

impl PortRouter {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new(Self {
            services,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Spawns the session for `port`, or drops it if the name is unknown.
    /// Returns the kind of session started.
    pub async fn accept(self: &Arc<Self>, port: Port) -> Option<PortKind> {
        let Some(kind) = PortKind::from_name(&port.name) else {
            Counters::bump(&self.services.counters.ports_rejected);
            warn!(
                component = "router",
                event = "port_rejected",
                port = %port.name,
                "Unexpected port name; ignoring connection"
            );
            return None;
        };

        Counters::bump(&self.services.counters.ports_accepted);

        let Port {
            id,
            name,
            inbound,
            outbound,
        } = port;
        self.active.lock().await.insert(id, kind);

        let span = port_span(&name, &TraceId::from(id));
        let router = Arc::clone(self);

        tokio::spawn(
            async move {
                match kind {
                    PortKind::Collection => {
                        CollectionSession::new(&router.services, outbound)
                            .run(inbound)
                            .await
                    }
                    PortKind::Download => {
                        DownloadSession::new(&router.services, outbound)
                            .run(inbound)
                            .await
                    }
                }
                router.active.lock().await.remove(&id);
                router.services.counters.log_snapshot();
            }
            .instrument(span),
        );

        info!(component = "router", port = %name, %id, "Spawned port session");
        Some(kind)
    }

    pub async fn active_ports(&self) -> usize {
        self.active.lock().await.len()
    }
}
