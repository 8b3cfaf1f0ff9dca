//! Shared application state.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::config::{ConfigError, ServerConfig};
use crate::core::{CallRelay, ConfiguredFactory, SessionFactory, create_tts_provider};
use crate::telephony::{TelnyxCallControl, TelnyxClient, media_stream_url};

/// Why a WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    /// `max_websocket_connections` reached
    GlobalLimitReached,
    /// `max_connections_per_ip` reached for the client
    PerIpLimitReached,
}

/// State shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub relay: CallRelay,
    /// Telnyx Call Control client, when an API key is configured
    pub telnyx: Option<TelnyxClient>,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build state with sessions wired to the configured upstream provider.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ConfigError> {
        let mut factory = ConfiguredFactory::new(
            config.upstream_config()?,
            config.transcoder_backend(),
            config.ffmpeg_path.clone(),
        );

        if let Some(tts_config) = config.tts_config() {
            let synthesizer = create_tts_provider("openai", tts_config)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            info!("Transcript synthesis enabled");
            factory = factory.with_synthesizer(synthesizer);
        }

        Self::with_factory(config, Arc::new(factory))
    }

    /// Build state around an explicit session factory.
    pub fn with_factory(
        config: ServerConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Arc<Self>, ConfigError> {
        let telnyx = match config.telnyx_api_key.as_deref() {
            Some(key) => Some(
                TelnyxClient::with_base_url(key, config.telnyx_api_url.clone())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            None => None,
        };

        let relay = CallRelay::new(factory, config.relay_settings());

        Ok(Arc::new(Self {
            config,
            relay,
            telnyx,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        }))
    }

    /// Media stream URL advertised to carriers.
    ///
    /// Uses the configured public host, then the request's `Host` header.
    pub fn stream_url(&self, request_host: Option<&str>) -> Option<String> {
        self.config
            .public_host
            .as_deref()
            .or(request_host)
            .map(media_stream_url)
    }

    /// Telnyx call control streaming to `stream_url`, if Telnyx is configured.
    pub fn telnyx_control(&self, stream_url: String) -> Option<TelnyxCallControl> {
        self.telnyx
            .clone()
            .map(|client| TelnyxCallControl::new(client, stream_url))
    }

    // =========================================================================
    // Connection tracking
    // =========================================================================

    /// Reserve a WebSocket slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        match self.config.max_websocket_connections {
            Some(max) => {
                self.ws_connections
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        (current < max).then_some(current + 1)
                    })
                    .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
            }
            None => {
                self.ws_connections.fetch_add(1, Ordering::AcqRel);
            }
        }

        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
        if *per_ip >= self.config.max_connections_per_ip {
            drop(per_ip);
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *per_ip += 1;
        Ok(())
    }

    /// Release a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("relay", &self.relay)
            .field("telnyx", &self.telnyx)
            .field("ws_connections", &self.ws_connection_count())
            .finish()
    }
}
