use crate::config::TransportConfig;
use async_trait::async_trait;
use lablink_core::IceServerConfig;
use tracing::{debug, warn};

/// Источник TURN/STUN дескрипторов для канала.
#[async_trait]
pub trait IceServerProvider: Send + Sync {
    async fn fetch_ice_servers(&self, channel_name: &str) -> anyhow::Result<Vec<IceServerConfig>>;
}

/// Фиксированный список серверов.
#[derive(Debug, Clone, Default)]
pub struct StaticIceServers(pub Vec<IceServerConfig>);

#[async_trait]
impl IceServerProvider for StaticIceServers {
    async fn fetch_ice_servers(&self, _channel_name: &str) -> anyhow::Result<Vec<IceServerConfig>> {
        Ok(self.0.clone())
    }
}

/// Only the configured STUN endpoints are used.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTurnServers;

#[async_trait]
impl IceServerProvider for NoTurnServers {
    async fn fetch_ice_servers(&self, _channel_name: &str) -> anyhow::Result<Vec<IceServerConfig>> {
        Ok(Vec::new())
    }
}

/// STUN из конфигурации всегда идет первым; ошибка провайдера не фатальна.
pub(crate) async fn resolve_ice_servers(
    provider: &dyn IceServerProvider,
    channel_name: &str,
    transport: &TransportConfig,
) -> Vec<IceServerConfig> {
    let mut servers: Vec<IceServerConfig> = transport
        .stun_urls
        .iter()
        .map(|url| IceServerConfig::stun(url.as_str()))
        .collect();

    match provider.fetch_ice_servers(channel_name).await {
        Ok(fetched) => {
            debug!(
                "Fetched {} ICE servers for channel '{}'",
                fetched.len(),
                channel_name
            );
            servers.extend(fetched);
        }
        Err(e) => warn!(
            "ICE server fetch for channel '{}' failed, continuing with STUN only: {:#}",
            channel_name, e
        ),
    }
    servers
}
