//! The Core session: owns the one connection to the Roon Core.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected → Discovering → Authorizing → Connected
//!                    ↑                           │ I/O failure
//!                    └──────── Reconnecting ←────┘
//! ```
//!
//! [`CoreSession::run`] drives the state machine until its cancellation token
//! fires. Reconnects are unbounded and paced by [`Backoff`]. While the state is
//! anything but `Connected`, every capability fails immediately with
//! `ServiceUnavailable`.
//!
//! # Concurrency design
//!
//! - The event loop inside `run` is the only reader of the WebSocket and the
//!   only writer of the zone map and of registered sinks' state.
//! - Outbound traffic goes through [`CoreLink`], whose bounded queue is drained
//!   by a writer task. Capabilities called from HTTP handlers only touch the
//!   link and a few short-lived locks; none of them holds a lock across an
//!   await.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::connection::CoreLink;
use super::moo::{MooMessage, MooVerb};
use super::sood::{self, CoreEndpoint};
use super::token::TokenStore;
use super::traits::{CommandReceipt, ControlAction, CoreImages, CorePlayback, CoreStatus};
use super::types::{CoreInfo, Registration, RoonZone, ZonesEvent};
use super::{SessionError, SessionResult};
use crate::artwork::ImagePayload;
use crate::error::{CoreError, CoreResult, ErrorCode};
use crate::protocol_constants::{
    EXTENSION_EMAIL, EXTENSION_ID, EXTENSION_PUBLISHER, OUTBOUND_CHANNEL_CAPACITY, SVC_BROWSE,
    SVC_IMAGE, SVC_PING, SVC_REGISTRY, SVC_STATUS, SVC_TRANSPORT,
};
use crate::state::SessionConfig;
use crate::utils::{extension_display_name, now_millis};
use crate::zones::{ZoneSink, ZoneSnapshot};

/// Connection state of the Core session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Discovering,
    /// Connected and waiting for the user to enable the extension in Roon.
    Authorizing,
    Connected,
    Reconnecting,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Discovering => "discovering",
            Self::Authorizing => "authorizing",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the Core connection and provider of the Core capabilities.
pub struct CoreSession {
    config: SessionConfig,
    state: RwLock<SessionState>,
    link: RwLock<Option<Arc<CoreLink>>>,
    core: RwLock<Option<CoreInfo>>,
    /// Full zone objects as last reported, so seek-only changes can be
    /// expanded into complete snapshots.
    zones: Mutex<HashMap<String, RoonZone>>,
    sinks: RwLock<Vec<Arc<dyn ZoneSink>>>,
    tokens: TokenStore,
}

impl CoreSession {
    pub fn new(config: SessionConfig) -> Self {
        let tokens = TokenStore::load(config.token_file.clone());
        Self {
            config,
            state: RwLock::new(SessionState::Disconnected),
            link: RwLock::new(None),
            core: RwLock::new(None),
            zones: Mutex::new(HashMap::new()),
            sinks: RwLock::new(Vec::new()),
            tokens,
        }
    }

    /// Registers a sink that receives a complete snapshot on every zone change.
    pub fn subscribe(&self, sink: Arc<dyn ZoneSink>) {
        self.sinks.write().push(sink);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            log::info!("[Session] {} -> {}", previous, next);
        }
    }

    /// The live link, or `ServiceUnavailable` when not connected.
    pub(crate) fn connected_link(&self) -> CoreResult<Arc<CoreLink>> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(CoreError::not_connected(state));
        }
        self.link
            .read()
            .clone()
            .ok_or_else(|| CoreError::not_connected(state))
    }

    pub(crate) fn ensure_known_zone(&self, zone_id: &str) -> CoreResult<()> {
        if self.zones.lock().contains_key(zone_id) {
            Ok(())
        } else {
            Err(CoreError::UnknownZone(zone_id.to_string()))
        }
    }

    #[cfg(test)]
    pub(crate) fn install_link_for_tests(&self, link: Arc<CoreLink>) {
        *self.link.write() = Some(link);
        self.set_state(SessionState::Connected);
    }

    fn clear_connection(&self) {
        if let Some(link) = self.link.write().take() {
            link.fail_all();
        }
        *self.core.write() = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection Loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs the session until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(
            self.config.reconnect_initial_delay,
            self.config.reconnect_max_delay,
        );
        log::info!("[Session] Starting Roon Core session");

        loop {
            self.set_state(SessionState::Discovering);
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connect_and_serve(&mut backoff) => result,
            };
            match result {
                Ok(()) => log::info!("[Session] Core connection ended"),
                Err(e) => log::warn!("[Session] Core connection failed ({}): {}", e.code(), e),
            }

            self.clear_connection();
            self.set_state(SessionState::Reconnecting);
            let delay = backoff.next_delay();
            log::info!(
                "[Session] Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                backoff.attempt()
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.clear_connection();
        self.set_state(SessionState::Disconnected);
        log::info!("[Session] Stopped");
    }

    async fn locate_core(&self) -> SessionResult<CoreEndpoint> {
        match &self.config.core_host {
            Some(host) => Ok(CoreEndpoint::fixed(host.clone(), self.config.core_port)),
            None => sood::discover(self.config.discovery_timeout).await,
        }
    }

    /// One connection: connect, register in the background, then pump frames
    /// until the socket or a helper task ends.
    async fn connect_and_serve(self: &Arc<Self>, backoff: &mut Backoff) -> SessionResult<()> {
        let endpoint = self.locate_core().await?;
        let url = endpoint.ws_url();
        log::info!("[Session] Connecting to {} ({})", endpoint, url);

        let (ws, _) = tokio::time::timeout(
            self.config.request_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| SessionError::Connect(format!("timed out connecting to {}", url)))?
        .map_err(|e| SessionError::Connect(e.to_string()))?;
        let (mut ws_sink, mut ws_stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CHANNEL_CAPACITY);
        let link = Arc::new(CoreLink::new(out_tx, self.config.request_timeout));

        // Dropping the set aborts both helpers when this connection ends.
        let mut tasks: JoinSet<SessionResult<()>> = JoinSet::new();
        tasks.spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                ws_sink
                    .send(Message::binary(frame))
                    .await
                    .map_err(|e| SessionError::Connect(e.to_string()))?;
            }
            let _ = ws_sink.close().await;
            Err(SessionError::Closed)
        });

        self.set_state(SessionState::Authorizing);
        tasks.spawn(Arc::clone(self).register(Arc::clone(&link)));

        loop {
            tokio::select! {
                frame = ws_stream.next() => match frame {
                    Some(Ok(Message::Binary(data))) => self.handle_frame(&link, &data),
                    Some(Ok(Message::Text(text))) => self.handle_frame(&link, text.as_bytes()),
                    Some(Ok(Message::Close(_))) | None => return Err(SessionError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(SessionError::Connect(e.to_string())),
                },
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => backoff.reset(),
                    Ok(Err(e)) => return Err(e),
                    Err(e) => return Err(SessionError::Protocol(format!("connection task failed: {}", e))),
                },
            }
        }
    }

    fn registration_body(&self, token: Option<String>) -> Value {
        let mut body = json!({
            "extension_id": EXTENSION_ID,
            "display_name": extension_display_name(),
            "display_version": env!("CARGO_PKG_VERSION"),
            "publisher": EXTENSION_PUBLISHER,
            "email": EXTENSION_EMAIL,
            "required_services": [SVC_TRANSPORT, SVC_BROWSE, SVC_IMAGE],
            "optional_services": [],
            "provided_services": [SVC_PING, SVC_STATUS],
        });
        if let Some(token) = token {
            body["token"] = Value::String(token);
        }
        body
    }

    /// Registry handshake. Completes once the Core has authorized us and the
    /// zone subscription is queued.
    async fn register(self: Arc<Self>, link: Arc<CoreLink>) -> SessionResult<()> {
        let info: CoreInfo = link
            .request(&format!("{}/info", SVC_REGISTRY), None)
            .await?
            .json()?;
        log::info!(
            "[Session] Core \"{}\" ({}) answered",
            info.display_name,
            info.display_version
        );

        let token = self.tokens.get(&info.core_id);
        if token.is_none() {
            log::info!(
                "[Session] Waiting for authorization: enable \"{}\" in Roon Settings > Extensions",
                extension_display_name()
            );
        }
        let reply = link
            .request_unbounded(
                &format!("{}/register", SVC_REGISTRY),
                Some(&self.registration_body(token)),
            )
            .await?;
        if reply.name != "Registered" {
            return Err(SessionError::Protocol(format!(
                "registration answered {}",
                reply.name
            )));
        }

        let registration: Registration = reply.json()?;
        if let Some(token) = &registration.token {
            if let Err(e) = self.tokens.save(&registration.core_id, token) {
                log::warn!("[Session] Could not persist authorization token: {}", e);
            }
        }

        *self.core.write() = Some(info);
        *self.link.write() = Some(Arc::clone(&link));
        self.set_state(SessionState::Connected);

        link.subscribe(
            &format!("{}/subscribe_zones", SVC_TRANSPORT),
            Some(&json!({ "subscription_key": 0 })),
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound Traffic
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_frame(&self, link: &CoreLink, data: &[u8]) {
        let msg = match MooMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("[Session] Dropping malformed frame: {}", e);
                return;
            }
        };
        match msg.verb {
            MooVerb::Request => self.answer_core_request(link, &msg),
            MooVerb::Complete | MooVerb::Continue => {
                if let Some(zone_msg) = link.route(msg) {
                    self.apply_zone_message(&zone_msg);
                }
            }
        }
    }

    /// Serves the services we advertise as provided.
    fn answer_core_request(&self, link: &CoreLink, msg: &MooMessage) {
        let id = msg.request_id;
        let status = json!({
            "message": format!("Serving {} zone(s) to polling clients", self.zones.lock().len()),
            "is_error": false,
        });
        let reply = match msg.service_method() {
            Some((SVC_PING, "ping")) => MooMessage::reply(MooVerb::Complete, id, "Success", None),
            Some((SVC_STATUS, "subscribe_status")) => {
                MooMessage::reply(MooVerb::Continue, id, "Subscribed", Some(&status))
            }
            Some((SVC_STATUS, "get_status")) => {
                MooMessage::reply(MooVerb::Complete, id, "Success", Some(&status))
            }
            Some((SVC_STATUS, "unsubscribe_status")) => {
                MooMessage::reply(MooVerb::Complete, id, "Unsubscribed", None)
            }
            _ => {
                log::debug!("[Session] Rejecting unsupported request {}", msg.name);
                MooMessage::reply(
                    MooVerb::Complete,
                    id,
                    "InvalidRequest",
                    Some(&json!({ "error": format!("unsupported request {}", msg.name) })),
                )
            }
        };
        if let Err(e) = link.reply(&reply) {
            log::warn!("[Session] Could not answer {}: {}", msg.name, e);
        }
    }

    /// Applies a `subscribe_zones` event and publishes the resulting snapshots.
    pub(crate) fn apply_zone_message(&self, msg: &MooMessage) {
        match msg.name.as_str() {
            "Subscribed" | "Changed" => {}
            "Unsubscribed" => {
                log::info!("[Session] Zone subscription ended by Core");
                return;
            }
            other => {
                log::warn!("[Session] Unexpected zone event {}", other);
                return;
            }
        }
        let event: ZonesEvent = match msg.json() {
            Ok(event) => event,
            Err(e) => {
                log::warn!("[Session] Undecodable zone event: {}", e);
                return;
            }
        };

        let now = now_millis();
        let mut snapshots = Vec::new();
        {
            let mut zones = self.zones.lock();
            if msg.name == "Subscribed" {
                zones.clear();
                log::info!("[Session] Subscribed to {} zone(s)", event.zones.len());
            }
            for zone in event
                .zones
                .into_iter()
                .chain(event.zones_added)
                .chain(event.zones_changed)
            {
                snapshots.push(zone.to_snapshot(now));
                zones.insert(zone.zone_id.clone(), zone);
            }
            for zone_id in &event.zones_removed {
                if zones.remove(zone_id).is_some() {
                    log::info!("[Session] Zone {} removed by Core", zone_id);
                }
            }
            for seek in event.zones_seek_changed {
                if let Some(zone) = zones.get_mut(&seek.zone_id) {
                    zone.apply_seek(seek.seek_position);
                    snapshots.push(zone.to_snapshot(now));
                }
            }
        }

        for snapshot in snapshots {
            self.publish(snapshot);
        }
    }

    fn publish(&self, snapshot: ZoneSnapshot) {
        for sink in self.sinks.read().iter() {
            sink.apply_update(&snapshot.zone_id, snapshot.clone());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

impl CorePlayback for CoreSession {
    fn send_command(&self, zone_id: &str, action: ControlAction) -> CoreResult<CommandReceipt> {
        let link = self.connected_link()?;
        self.ensure_known_zone(zone_id)?;
        link.post(
            &format!("{}/control", SVC_TRANSPORT),
            Some(&json!({ "zone_or_output_id": zone_id, "control": action.as_str() })),
            format!("{} on zone {}", action, zone_id),
        )?;
        log::info!("[Session] Sent {} to zone {}", action, zone_id);
        Ok(CommandReceipt::Accepted)
    }
}

#[async_trait]
impl CoreImages for CoreSession {
    async fn fetch_image(&self, image_key: &str, max_size: u32) -> CoreResult<ImagePayload> {
        let link = self.connected_link()?;
        let reply = link
            .request(
                &format!("{}/get_image", SVC_IMAGE),
                Some(&json!({
                    "image_key": image_key,
                    "scale": "fit",
                    "width": max_size,
                    "height": max_size,
                    "format": "image/jpeg",
                })),
            )
            .await?;

        if !reply.is_success() || reply.body.is_empty() {
            log::debug!("[Session] Core has no image {} ({})", image_key, reply.name);
            return Err(CoreError::NotFound(format!("image {}", image_key)));
        }
        Ok(ImagePayload {
            content_type: reply
                .content_type
                .unwrap_or_else(|| "image/jpeg".to_string()),
            data: reply.body,
        })
    }
}

impl CoreStatus for CoreSession {
    fn session_state(&self) -> SessionState {
        self.state()
    }

    fn core_name(&self) -> Option<String> {
        self.core.read().as_ref().map(|c| c.display_name.clone())
    }
}
