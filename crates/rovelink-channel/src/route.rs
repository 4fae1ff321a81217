use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::Result;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Something routed messages can be handed to.
pub trait RouteTarget: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Queue `payload` on the target's send path.
    fn forward(&self, payload: Bytes) -> Result<()>;
}

struct Route {
    target_id: ChannelId,
    target: Weak<dyn RouteTarget>,
}

/// Outgoing routing edges of one channel. Edges never keep a target alive.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Add an edge. Returns false if it already exists.
    pub(crate) fn add(&mut self, target_id: ChannelId, target: Weak<dyn RouteTarget>) -> bool {
        if self.routes.iter().any(|r| r.target_id == target_id) {
            return false;
        }
        self.routes.push(Route { target_id, target });
        true
    }

    /// Remove an edge by id. Works whether or not the target still exists.
    pub(crate) fn remove(&mut self, target_id: ChannelId) -> bool {
        let before = self.routes.len();
        self.routes.retain(|r| r.target_id != target_id);
        self.routes.len() != before
    }

    /// Hand `payload` to every live target; prune dead ones.
    pub(crate) fn deliver(&mut self, payload: &Bytes) {
        self.routes.retain(|route| match route.target.upgrade() {
            Some(target) => {
                if let Err(err) = target.forward(payload.clone()) {
                    debug!(target = %route.target_id, %err, "routed message not sent");
                }
                true
            }
            None => {
                warn!(target = %route.target_id, "routing target is gone, dropping route");
                false
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| r.target_id))
            .finish()
    }
}
