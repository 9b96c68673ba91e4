//! Preset playback through the Core's browse service.
//!
//! Resolution walks the browse tree the way a user would in a Roon remote:
//! open the hierarchy for the preset kind, pick the first item whose title
//! matches exactly, then descend through its action lists until a play action
//! turns up. Every resolution runs in its own browse session
//! (`multi_session_key`) so concurrent preset requests do not move each
//! other's position in the tree.
//!
//! The lookups are awaited (each bounded by the request timeout). The final
//! play action is queued and not awaited.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::connection::CoreLink;
use super::moo::MooMessage;
use super::session::CoreSession;
use super::traits::{CommandReceipt, CoreBrowse};
use super::types::{BrowseItem, BrowseResult, LoadResult};
use crate::error::{CoreError, CoreResult};
use crate::presets::PresetKind;
use crate::protocol_constants::{BROWSE_MAX_DEPTH, BROWSE_PAGE_SIZE, BROWSE_PLAY_NOW, SVC_BROWSE};

const HINT_ACTION: &str = "action";
const HINT_ACTION_LIST: &str = "action_list";

/// One browse session against one hierarchy, on behalf of one zone.
struct BrowseWalk<'a> {
    link: &'a CoreLink,
    hierarchy: &'static str,
    zone_id: &'a str,
    session_key: String,
}

impl<'a> BrowseWalk<'a> {
    fn body(&self, extra: Value) -> Value {
        let mut body = json!({
            "hierarchy": self.hierarchy,
            "zone_or_output_id": self.zone_id,
            "multi_session_key": self.session_key,
        });
        if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
            body.extend(extra);
        }
        body
    }

    async fn call(&self, method: &str, body: Value) -> CoreResult<MooMessage> {
        let reply = self
            .link
            .request(&format!("{}/{}", SVC_BROWSE, method), Some(&body))
            .await?;
        match reply.name.as_str() {
            "Success" => Ok(reply),
            "ZoneNotFound" => Err(CoreError::UnknownZone(self.zone_id.to_string())),
            "InvalidItemKey" => Err(CoreError::NotFound(format!("browse item in {}", self.hierarchy))),
            other => Err(CoreError::Protocol(format!("browse {} answered {}", method, other))),
        }
    }

    async fn browse(&self, extra: Value) -> CoreResult<BrowseResult> {
        let reply = self.call("browse", self.body(extra)).await?;
        let result: BrowseResult = reply
            .json()
            .map_err(|e| CoreError::Protocol(e.to_string()))?;
        if result.is_error {
            return Err(CoreError::Protocol(
                result.message.unwrap_or_else(|| "browse failed".to_string()),
            ));
        }
        Ok(result)
    }

    /// Loads every item of the current list, page by page.
    async fn load_all(&self, expected: u32) -> CoreResult<Vec<BrowseItem>> {
        let mut items = Vec::new();
        loop {
            let reply = self
                .call(
                    "load",
                    self.body(json!({ "offset": items.len(), "count": BROWSE_PAGE_SIZE })),
                )
                .await?;
            let page: LoadResult = reply
                .json()
                .map_err(|e| CoreError::Protocol(e.to_string()))?;
            let total = page.list.as_ref().map_or(expected, |l| l.count) as usize;
            let received = page.items.len();
            items.extend(page.items);
            if received == 0 || items.len() >= total {
                return Ok(items);
            }
        }
    }

    /// Dispatches an action item without waiting for the Core's answer.
    fn dispatch(&self, item: &BrowseItem, key: &str) -> CoreResult<CommandReceipt> {
        self.link.post(
            &format!("{}/browse", SVC_BROWSE),
            Some(&self.body(json!({ "item_key": key }))),
            format!("\"{}\" on zone {}", item.title, self.zone_id),
        )?;
        Ok(CommandReceipt::Accepted)
    }
}

/// Picks the entry that starts playback from an item's action list.
fn pick_play_action(mut items: Vec<BrowseItem>) -> Option<BrowseItem> {
    let hint_is = |item: &BrowseItem, hint: &str| item.hint.as_deref() == Some(hint);
    let index = items
        .iter()
        .position(|i| i.title == BROWSE_PLAY_NOW && hint_is(i, HINT_ACTION))
        .or_else(|| {
            items
                .iter()
                .position(|i| hint_is(i, HINT_ACTION_LIST) && i.title.starts_with("Play"))
        })
        .or_else(|| items.iter().position(|i| hint_is(i, HINT_ACTION_LIST)))
        .or_else(|| items.iter().position(|i| hint_is(i, HINT_ACTION)))?;
    Some(items.swap_remove(index))
}

#[async_trait]
impl CoreBrowse for CoreSession {
    async fn resolve_and_play(
        &self,
        zone_id: &str,
        kind: PresetKind,
        name: &str,
    ) -> CoreResult<CommandReceipt> {
        let link = self.connected_link()?;
        self.ensure_known_zone(zone_id)?;

        let walk = BrowseWalk {
            link: &link,
            hierarchy: kind.hierarchy(),
            zone_id,
            session_key: uuid::Uuid::new_v4().to_string(),
        };
        log::info!("[Presets] Resolving {} \"{}\" for zone {}", kind, name, zone_id);

        let root = walk.browse(json!({ "pop_all": true })).await?;
        let root_count = root.list.map_or(0, |l| l.count);
        // Ambiguous titles resolve to the first match in Core order.
        let mut item = walk
            .load_all(root_count)
            .await?
            .into_iter()
            .find(|i| i.title == name)
            .ok_or_else(|| CoreError::NotFound(format!("{} \"{}\"", kind, name)))?;

        for _ in 0..BROWSE_MAX_DEPTH {
            let key = item.item_key.clone().ok_or_else(|| {
                CoreError::Protocol(format!("browse item \"{}\" has no key", item.title))
            })?;
            if item.hint.as_deref() == Some(HINT_ACTION) {
                log::info!("[Presets] Playing {} \"{}\" on zone {}", kind, name, zone_id);
                return walk.dispatch(&item, &key);
            }

            let opened = walk.browse(json!({ "item_key": key })).await?;
            if opened.action != "list" {
                // The Core acted on the item directly.
                return Ok(CommandReceipt::Accepted);
            }
            let count = opened.list.map_or(0, |l| l.count);
            item = pick_play_action(walk.load_all(count).await?).ok_or_else(|| {
                CoreError::NotFound(format!("play action for {} \"{}\"", kind, name))
            })?;
        }

        Err(CoreError::Protocol(format!(
            "no play action within {} levels of \"{}\"",
            BROWSE_MAX_DEPTH, name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roon::moo::MooVerb;
    use crate::roon::SessionState;
    use crate::state::SessionConfig;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn item(title: &str, key: Option<&str>, hint: &str) -> BrowseItem {
        BrowseItem {
            title: title.into(),
            subtitle: None,
            item_key: key.map(Into::into),
            hint: Some(hint.into()),
        }
    }

    #[test]
    fn prefers_play_now_over_other_actions() {
        let picked = pick_play_action(vec![
            item("Add Next", Some("a"), HINT_ACTION),
            item("Play Now", Some("b"), HINT_ACTION),
            item("Queue", Some("c"), HINT_ACTION),
        ])
        .unwrap();
        assert_eq!(picked.item_key.as_deref(), Some("b"));
    }

    #[test]
    fn falls_back_to_play_action_list() {
        let picked = pick_play_action(vec![
            item("Track 1", Some("t1"), "list"),
            item("Play Playlist", Some("pp"), HINT_ACTION_LIST),
        ])
        .unwrap();
        assert_eq!(picked.title, "Play Playlist");
    }

    #[test]
    fn no_actions_means_none() {
        assert!(pick_play_action(vec![item("Track 1", Some("t1"), "list")]).is_none());
    }

    /// Fake Core: answers each request with the next scripted body and stops
    /// once the gateway has been quiet for a while.
    async fn serve_script(
        link: Arc<CoreLink>,
        mut rx: mpsc::Receiver<Vec<u8>>,
        mut script: VecDeque<Value>,
    ) -> Vec<MooMessage> {
        let mut seen = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            let request = MooMessage::parse(&frame).unwrap();
            let body = script.pop_front().unwrap_or_else(|| json!({}));
            link.route(MooMessage::reply(
                MooVerb::Complete,
                request.request_id,
                "Success",
                Some(&body),
            ));
            seen.push(request);
        }
        seen
    }

    fn connected_session_with_zone() -> (Arc<CoreSession>, Arc<CoreLink>, mpsc::Receiver<Vec<u8>>) {
        let session = Arc::new(CoreSession::new(SessionConfig::default()));
        let (tx, rx) = mpsc::channel(16);
        let link = Arc::new(CoreLink::new(tx, Duration::from_secs(1)));
        session.install_link_for_tests(Arc::clone(&link));
        session.apply_zone_message(&MooMessage::reply(
            MooVerb::Continue,
            0,
            "Subscribed",
            Some(&json!({ "zones": [{"zone_id": "Z1", "display_name": "Den", "state": "stopped"}] })),
        ));
        assert_eq!(session.state(), SessionState::Connected);
        (session, link, rx)
    }

    #[tokio::test]
    async fn missing_title_is_not_found() {
        let (session, link, rx) = connected_session_with_zone();
        let script = VecDeque::from(vec![
            json!({ "action": "list", "list": {"title": "Playlists", "count": 1, "level": 0} }),
            json!({ "items": [{"title": "Rock Favorites", "item_key": "p1", "hint": "list"}],
                    "offset": 0, "list": {"title": "Playlists", "count": 1, "level": 0} }),
        ]);
        let core = tokio::spawn(serve_script(link, rx, script));

        let result = session
            .resolve_and_play("Z1", PresetKind::Playlist, "My Classical")
            .await;

        assert_eq!(
            result,
            Err(CoreError::NotFound("playlist \"My Classical\"".into()))
        );
        core.abort();
    }

    #[tokio::test]
    async fn match_descends_to_play_now_and_dispatches_it() {
        let (session, link, rx) = connected_session_with_zone();
        let script = VecDeque::from(vec![
            // pop_all to the hierarchy root
            json!({ "action": "list", "list": {"title": "My Live Radio", "count": 2, "level": 0} }),
            json!({ "items": [
                        {"title": "Jazz Radio", "item_key": "s1", "hint": "action_list"},
                        {"title": "Jazz Radio", "item_key": "s2", "hint": "action_list"}
                    ],
                    "offset": 0, "list": {"title": "My Live Radio", "count": 2, "level": 0} }),
            // open the first match
            json!({ "action": "list", "list": {"title": "Jazz Radio", "count": 2, "level": 1} }),
            json!({ "items": [
                        {"title": "Play Now", "item_key": "s1-play", "hint": "action"},
                        {"title": "Add to Library", "item_key": "s1-lib", "hint": "action"}
                    ],
                    "offset": 0, "list": {"title": "Jazz Radio", "count": 2, "level": 1} }),
        ]);
        let core = tokio::spawn(serve_script(link, rx, script));

        let receipt = session
            .resolve_and_play("Z1", PresetKind::Radio, "Jazz Radio")
            .await
            .unwrap();
        assert_eq!(receipt, CommandReceipt::Accepted);

        let seen = core.await.unwrap();
        let bodies: Vec<Value> = seen.iter().map(|m| m.json().unwrap()).collect();
        assert_eq!(bodies[0]["hierarchy"], "internet_radio");
        assert_eq!(bodies[0]["pop_all"], true);
        assert_eq!(bodies[2]["item_key"], "s1");
        let last = bodies.last().unwrap();
        assert_eq!(last["item_key"], "s1-play");
        assert_eq!(last["zone_or_output_id"], "Z1");
        assert!(bodies
            .iter()
            .all(|b| b["multi_session_key"] == bodies[0]["multi_session_key"]));
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected_before_browsing() {
        let (session, _link, mut rx) = connected_session_with_zone();

        let result = session
            .resolve_and_play("Z9", PresetKind::Tag, "Jazz")
            .await;

        assert_eq!(result, Err(CoreError::UnknownZone("Z9".into())));
        assert!(rx.try_recv().is_err());
    }
}
