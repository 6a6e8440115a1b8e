use crate::error::SignalingError;
use crate::signaling::rendezvous::{RendezvousChannel, RendezvousEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lablink_core::{PeerId, Signal};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

type Endpoint = mpsc::UnboundedSender<RendezvousEvent>;

/// Сервис рандеву внутри процесса: один master (answerer) и любое число viewer.
///
/// Viewers can only address the master; the hub fills in the sender id on
/// delivery, the same way a hosted signaling service does.
#[derive(Clone, Default)]
pub struct LocalRendezvousHub {
    endpoints: Arc<DashMap<PeerId, Endpoint>>,
}

impl LocalRendezvousHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn master_channel(&self) -> LocalRendezvousChannel {
        LocalRendezvousChannel::new(self.clone(), PeerId::master())
    }

    pub fn viewer_channel(&self, client_id: impl Into<PeerId>) -> LocalRendezvousChannel {
        LocalRendezvousChannel::new(self.clone(), client_id.into())
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.endpoints.contains_key(id)
    }

    /// Доставить событие напрямую, минуя маршрутизацию.
    pub fn inject(&self, to: &PeerId, event: RendezvousEvent) -> bool {
        let endpoint = self.endpoints.get(to).map(|e| e.value().clone());
        endpoint.is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Симулирует закрытие сервиса: все endpoint получают `Closed`.
    pub fn shutdown(&self) {
        let keys: Vec<PeerId> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        info!("Rendezvous hub shutting down ({} endpoints)", keys.len());
        for key in keys {
            if let Some((_, tx)) = self.endpoints.remove(&key) {
                let _ = tx.send(RendezvousEvent::Closed);
            }
        }
    }
}

pub struct LocalRendezvousChannel {
    hub: LocalRendezvousHub,
    local_id: PeerId,
    endpoint: Mutex<Option<Endpoint>>,
}

impl LocalRendezvousChannel {
    fn new(hub: LocalRendezvousHub, local_id: PeerId) -> Self {
        Self {
            hub,
            local_id,
            endpoint: Mutex::new(None),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn own_endpoint(&self) -> Option<Endpoint> {
        self.endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_open(&self) -> bool {
        let Some(own) = self.own_endpoint() else {
            return false;
        };
        self.hub
            .endpoints
            .get(&self.local_id)
            .is_some_and(|e| e.value().same_channel(&own))
    }
}

#[async_trait]
impl RendezvousChannel for LocalRendezvousChannel {
    async fn open(&self, events: Endpoint) -> Result<(), SignalingError> {
        match self.hub.endpoints.entry(self.local_id.clone()) {
            Entry::Occupied(_) => {
                return Err(SignalingError::Open(format!(
                    "endpoint '{}' is already connected",
                    self.local_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(events.clone());
            }
        }
        *self.endpoint.lock().unwrap_or_else(PoisonError::into_inner) = Some(events.clone());

        debug!("Rendezvous endpoint '{}' connected", self.local_id);
        let _ = events.send(RendezvousEvent::Open);
        Ok(())
    }

    async fn send(&self, signal: Signal) -> Result<(), SignalingError> {
        if !self.is_open() {
            return Err(SignalingError::Closed);
        }

        let (target, sender) = if self.local_id.is_master() {
            (signal.peer_id, PeerId::master())
        } else if signal.peer_id.is_master() {
            (signal.peer_id, self.local_id.clone())
        } else {
            return Err(SignalingError::Send(format!(
                "viewer '{}' can only address the master, not '{}'",
                self.local_id, signal.peer_id
            )));
        };

        let endpoint = self.hub.endpoints.get(&target).map(|e| e.value().clone());
        let Some(endpoint) = endpoint else {
            return Err(SignalingError::Send(format!(
                "no endpoint connected as '{}'",
                target
            )));
        };

        debug!(
            "Routing {} from '{}' to '{}'",
            signal.message.kind(),
            sender,
            target
        );
        endpoint
            .send(RendezvousEvent::Signal(Signal::new(sender, signal.message)))
            .map_err(|_| SignalingError::Send(format!("endpoint '{}' went away", target)))
    }

    async fn close(&self) {
        let own = self
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(own) = own {
            self.hub
                .endpoints
                .remove_if(&self.local_id, |_, tx| tx.same_channel(&own));
            debug!("Rendezvous endpoint '{}' disconnected", self.local_id);
        }
    }
}
