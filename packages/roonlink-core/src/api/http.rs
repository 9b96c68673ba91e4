//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.
//! Every route is a GET so the simplest polling clients can use it.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_accepted, api_no_data, api_success};
use crate::api::AppState;
use crate::error::{CoreError, GatewayError, GatewayResult};
use crate::protocol_constants::SERVICE_ID;
use crate::roon::{ControlAction, SessionState};
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ZoneQuery {
    zone_id: Option<String>,
}

impl ZoneQuery {
    /// Explicit zone if given, else the default zone.
    fn target(self, state: &AppState) -> GatewayResult<String> {
        self.zone_id
            .filter(|id| !id.is_empty())
            .or_else(|| state.zones.default_zone())
            .ok_or(GatewayError::NoZoneAvailable)
    }
}

/// Commands need a live session before a zone can even be chosen.
fn ensure_connected(state: &AppState) -> GatewayResult<()> {
    match state.core.session_state() {
        SessionState::Connected => Ok(()),
        other => Err(CoreError::not_connected(other).into()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/health", get(health_check))
        .route("/status", get(zone_status))
        .route("/zones", get(list_zones))
        .route("/control/{action}", get(control))
        .route("/preset/{slot}", get(play_preset))
        .route("/presets", get(list_presets))
        .route("/image/{key}", get(serve_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe. Always 200 while the process is serving.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "session": state.core.session_state(),
        "core": state.core.core_name(),
        "zones": state.zones.list_zones().len(),
    }))
}

/// Latest snapshot for the requested (or default) zone.
///
/// A zone that cannot be chosen or has not reported yet is a valid "no data"
/// answer, not an error.
async fn zone_status(
    State(state): State<AppState>,
    Query(query): Query<ZoneQuery>,
) -> Response {
    let zone_id = match query.target(&state) {
        Ok(zone_id) => zone_id,
        Err(e) => return api_no_data(e.code(), None).into_response(),
    };
    match state.zones.read(&zone_id) {
        Some(snapshot) => {
            log::debug!(
                "[Status] Zone {} snapshot is {}ms old",
                zone_id,
                snapshot.age_ms(now_millis())
            );
            api_success(&*snapshot).into_response()
        }
        None => {
            let err = GatewayError::from(CoreError::UnknownZone(zone_id.clone()));
            api_no_data(err.code(), Some(&zone_id)).into_response()
        }
    }
}

async fn list_zones(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "zones": state.zones.list_zones() }))
}

/// Hands a transport command to the Core session. Does not wait for the Core.
async fn control(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(query): Query<ZoneQuery>,
) -> GatewayResult<impl IntoResponse> {
    let action: ControlAction = action.parse().map_err(GatewayError::InvalidAction)?;
    ensure_connected(&state)?;
    let zone_id = query.target(&state)?;
    state.core.send_command(&zone_id, action)?;
    Ok(api_accepted(json!({ "action": action, "zone_id": zone_id })))
}

async fn play_preset(
    State(state): State<AppState>,
    Path(slot): Path<String>,
    Query(query): Query<ZoneQuery>,
) -> GatewayResult<impl IntoResponse> {
    let slot: u32 = slot
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("preset slot must be a number: {}", slot)))?;
    let preset = state
        .presets
        .get(slot)
        .cloned()
        .ok_or(CoreError::UnknownPreset(slot))?;
    ensure_connected(&state)?;
    let zone_id = query.target(&state)?;

    state.presets.resolve(slot, &zone_id).await?;
    Ok(api_accepted(json!({
        "slot": slot,
        "kind": preset.kind,
        "name": preset.name,
        "zone_id": zone_id,
    })))
}

async fn list_presets(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "presets": state.presets.list() }))
}

/// Artwork bytes for an image key, from the cache or the Core.
async fn serve_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> GatewayResult<Response> {
    let image = state.images.get(&key).await?;
    log::debug!("[Images] Serving {} ({} bytes)", key, image.data.len());
    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            // Image keys identify immutable content.
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        image.data,
    )
        .into_response())
}

/// Human-readable status page.
async fn status_page(State(state): State<AppState>) -> Html<String> {
    let session = state.core.session_state();
    let core = state
        .core
        .core_name()
        .map(|name| html_escape::encode_text(&name).into_owned())
        .unwrap_or_else(|| "&mdash;".to_string());
    let zones = state.zones.list_zones();
    let default_zone = state.zones.default_zone();

    let zone_rows: String = zones
        .iter()
        .map(|zone| {
            let marker = if default_zone.as_deref() == Some(zone.zone_id.as_str()) {
                " (default)"
            } else {
                ""
            };
            format!(
                "<li><code>{}</code> {}{} &middot; {}</li>",
                html_escape::encode_text(&zone.zone_id),
                html_escape::encode_text(&zone.name),
                marker,
                zone.state
            )
        })
        .collect();
    let preset_rows: String = state
        .presets
        .list()
        .iter()
        .map(|preset| {
            format!(
                "<li>{}: {} &ldquo;{}&rdquo;</li>",
                preset.slot,
                preset.kind,
                html_escape::encode_text(&preset.name)
            )
        })
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>RoonLink Gateway</title></head>
<body>
<h1>RoonLink Gateway</h1>
<p>Session: <strong>{session}</strong> &middot; Core: {core} &middot; Zones: {zone_count}</p>
<h2>Zones</h2>
<ul>{zone_rows}</ul>
<h2>Presets</h2>
<ul>{preset_rows}</ul>
<h2>Endpoints</h2>
<ul>
<li><code>/status[?zone_id=ID]</code></li>
<li><code>/zones</code></li>
<li><code>/control/{{play|pause|playpause|stop|next|previous}}[?zone_id=ID]</code></li>
<li><code>/preset/{{slot}}[?zone_id=ID]</code></li>
<li><code>/presets</code></li>
<li><code>/image/{{key}}</code></li>
<li><code>/health</code></li>
</ul>
</body>
</html>
"#,
        zone_count = zones.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::AppState;
    use crate::artwork::{ImageCache, ImagePayload};
    use crate::error::CoreResult;
    use crate::presets::{PresetDefinition, PresetKind, PresetResolver};
    use crate::roon::{
        CommandReceipt, CoreBrowse, CoreImages, CorePlayback, CoreStatus, SessionState,
    };
    use crate::runtime::TokioSpawner;
    use crate::state::Config;
    use crate::zones::{
        NowPlaying, PlaybackState, ThreeLine, ZoneSink, ZoneSnapshot, ZoneStateCache,
    };

    /// Core fake: records commands, knows zone Z1 and one image.
    struct FakeCore {
        state: SessionState,
        commands: Mutex<Vec<(String, ControlAction)>>,
        presets: Mutex<Vec<(String, String)>>,
    }

    impl FakeCore {
        fn new(state: SessionState) -> Self {
            Self {
                state,
                commands: Mutex::new(Vec::new()),
                presets: Mutex::new(Vec::new()),
            }
        }

        fn check(&self, zone_id: &str) -> CoreResult<()> {
            if self.state != SessionState::Connected {
                return Err(CoreError::not_connected(self.state));
            }
            if zone_id != "Z1" {
                return Err(CoreError::UnknownZone(zone_id.to_string()));
            }
            Ok(())
        }
    }

    impl CorePlayback for FakeCore {
        fn send_command(&self, zone_id: &str, action: ControlAction) -> CoreResult<CommandReceipt> {
            self.check(zone_id)?;
            self.commands.lock().push((zone_id.to_string(), action));
            Ok(CommandReceipt::Accepted)
        }
    }

    #[async_trait]
    impl CoreBrowse for FakeCore {
        async fn resolve_and_play(
            &self,
            zone_id: &str,
            kind: PresetKind,
            name: &str,
        ) -> CoreResult<CommandReceipt> {
            self.check(zone_id)?;
            if name == "My Classical" {
                return Err(CoreError::NotFound(format!("{} \"{}\"", kind, name)));
            }
            self.presets
                .lock()
                .push((zone_id.to_string(), name.to_string()));
            Ok(CommandReceipt::Accepted)
        }
    }

    #[async_trait]
    impl CoreImages for FakeCore {
        async fn fetch_image(&self, image_key: &str, _max_size: u32) -> CoreResult<ImagePayload> {
            if self.state != SessionState::Connected {
                return Err(CoreError::not_connected(self.state));
            }
            match image_key {
                "k1" => Ok(ImagePayload {
                    content_type: "image/png".into(),
                    data: Bytes::from_static(b"\x89PNG-k1"),
                }),
                other => Err(CoreError::NotFound(format!("image {}", other))),
            }
        }
    }

    impl CoreStatus for FakeCore {
        fn session_state(&self) -> SessionState {
            self.state
        }

        fn core_name(&self) -> Option<String> {
            (self.state == SessionState::Connected).then(|| "Living <Room> Core".to_string())
        }
    }

    struct Harness {
        state: AppState,
        core: Arc<FakeCore>,
        cache: Arc<ZoneStateCache>,
    }

    fn harness(session: SessionState) -> Harness {
        let core = Arc::new(FakeCore::new(session));
        let cache = Arc::new(ZoneStateCache::new(None));
        let mut presets = BTreeMap::new();
        presets.insert(1, PresetDefinition::new(PresetKind::Radio, "Jazz Radio"));
        presets.insert(2, PresetDefinition::new(PresetKind::Playlist, "My Classical"));
        let config = Config {
            presets: presets.clone(),
            ..Config::default()
        };

        let state = AppState::builder()
            .zones(cache.clone())
            .core(core.clone())
            .images(Arc::new(ImageCache::new(
                core.clone(),
                4,
                300,
                TokioSpawner::current(),
            )))
            .presets(Arc::new(PresetResolver::new(presets, core.clone())))
            .config(Arc::new(config))
            .build();
        Harness { state, core, cache }
    }

    fn playing_z1() -> ZoneSnapshot {
        let mut snapshot = ZoneSnapshot::idle("Z1", "Den");
        snapshot.state = PlaybackState::Playing;
        snapshot.seek_position = Some(10.0);
        snapshot.now_playing = Some(NowPlaying {
            three_line: ThreeLine {
                line1: "A".into(),
                line2: "B".into(),
                line3: "C".into(),
            },
            length: Some(200),
            image_key: Some("k1".into()),
            ..NowPlaying::default()
        });
        snapshot
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = create_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(state, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn status_without_any_zone_is_no_data() {
        let h = harness(SessionState::Connected);

        let (status, body) = get_json(&h.state, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "available": false, "reason": "no_zone_available" }));
    }

    #[tokio::test]
    async fn status_for_unreported_zone_is_no_data() {
        let h = harness(SessionState::Connected);

        let (status, body) = get_json(&h.state, "/status?zone_id=Z9").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "unknown_zone");
        assert_eq!(body["zone_id"], "Z9");
    }

    #[tokio::test]
    async fn status_returns_the_latest_snapshot_wholesale() {
        let h = harness(SessionState::Connected);
        h.cache.apply_update("Z1", playing_z1());

        let (status, body) = get_json(&h.state, "/status?zone_id=Z1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "playing");
        assert_eq!(body["zone_name"], "Den");
        assert_eq!(body["seek_position"], 10.0);
        assert_eq!(body["now_playing"]["three_line"]["line2"], "B");
        assert_eq!(body["now_playing"]["length"], 200);
        assert_eq!(body["now_playing"]["image_key"], "k1");

        let mut paused = ZoneSnapshot::idle("Z1", "Den");
        paused.state = PlaybackState::Paused;
        paused.seek_position = Some(45.0);
        h.cache.apply_update("Z1", paused);

        // Default zone is the first seen, so no query is needed.
        let (_, body) = get_json(&h.state, "/status").await;
        assert_eq!(body["state"], "paused");
        assert_eq!(body["seek_position"], 45.0);
        assert_eq!(body["now_playing"], Value::Null);
    }

    #[tokio::test]
    async fn zones_lists_in_first_seen_order() {
        let h = harness(SessionState::Connected);
        h.cache.apply_update("Z2", ZoneSnapshot::idle("Z2", "Kitchen"));
        h.cache.apply_update("Z1", playing_z1());

        let (_, body) = get_json(&h.state, "/zones").await;

        assert_eq!(
            body["zones"],
            json!([
                { "zone_id": "Z2", "name": "Kitchen", "state": "stopped" },
                { "zone_id": "Z1", "name": "Den", "state": "playing" }
            ])
        );
    }

    #[tokio::test]
    async fn control_is_accepted_and_dispatched_once() {
        let h = harness(SessionState::Connected);
        h.cache.apply_update("Z1", playing_z1());

        let (status, body) = get_json(&h.state, "/control/pause").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["accepted"], true);
        assert_eq!(body["zone_id"], "Z1");
        assert_eq!(
            h.core.commands.lock().as_slice(),
            &[("Z1".to_string(), ControlAction::Pause)]
        );
    }

    #[tokio::test]
    async fn control_failures_have_distinct_codes() {
        let h = harness(SessionState::Connected);

        let (status, body) = get_json(&h.state, "/control/play").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_zone_available");

        let (status, body) = get_json(&h.state, "/control/rewind?zone_id=Z1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_action");

        let (status, body) = get_json(&h.state, "/control/next?zone_id=Z9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_zone");

        assert!(h.core.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn control_while_reconnecting_is_unavailable() {
        let h = harness(SessionState::Reconnecting);

        let (status, body) = get_json(&h.state, "/control/play?zone_id=Z1").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service_unavailable");
        assert_eq!(body["status"], 503);
    }

    #[tokio::test]
    async fn commands_before_any_zone_wait_for_the_session() {
        let h = harness(SessionState::Disconnected);

        for uri in ["/control/play", "/preset/1"] {
            let (status, body) = get_json(&h.state, uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
            assert_eq!(body["error"], "service_unavailable", "{}", uri);
        }

        let (status, body) = get_json(&h.state, "/preset/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_preset");
        assert!(h.core.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn preset_outcomes() {
        let h = harness(SessionState::Connected);
        h.cache.apply_update("Z1", playing_z1());

        let (status, body) = get_json(&h.state, "/preset/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Jazz Radio");
        assert_eq!(body["kind"], "radio");
        assert_eq!(
            h.core.presets.lock().as_slice(),
            &[("Z1".to_string(), "Jazz Radio".to_string())]
        );

        let (status, body) = get_json(&h.state, "/preset/2").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = get_json(&h.state, "/preset/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_preset");

        let (status, body) = get_json(&h.state, "/preset/first").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn undeclared_preset_wins_over_missing_zone() {
        let h = harness(SessionState::Connected);

        let (_, body) = get_json(&h.state, "/preset/9").await;

        assert_eq!(body["error"], "unknown_preset");
    }

    #[tokio::test]
    async fn image_is_served_with_its_content_type() {
        let h = harness(SessionState::Connected);

        let response = create_router(h.state.clone())
            .oneshot(Request::builder().uri("/image/k1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers().contains_key(header::CACHE_CONTROL));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"\x89PNG-k1");
    }

    #[tokio::test]
    async fn missing_image_is_404_and_offline_image_is_503() {
        let h = harness(SessionState::Connected);
        let (status, body) = get_json(&h.state, "/image/unknownkey").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let h = harness(SessionState::Discovering);
        let (status, _) = get_json(&h.state, "/image/k1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_session_state() {
        let h = harness(SessionState::Authorizing);

        let (status, body) = get_json(&h.state, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session"], "authorizing");
        assert_eq!(body["core"], Value::Null);
    }

    #[tokio::test]
    async fn presets_are_listed() {
        let h = harness(SessionState::Connected);

        let (_, body) = get_json(&h.state, "/presets").await;

        assert_eq!(body["presets"][0], json!({ "slot": 1, "kind": "radio", "name": "Jazz Radio" }));
        assert_eq!(body["presets"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_page_escapes_names() {
        let h = harness(SessionState::Connected);
        h.cache
            .apply_update("Z1", ZoneSnapshot::idle("Z1", "<script>alert(1)</script>"));

        let (status, body) = get(&h.state, "/").await;
        let html = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Session: <strong>connected</strong>"));
        assert!(html.contains("Living &lt;Room&gt; Core"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("(default)"));
    }
}
