//! Event registry and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{Next, Plugin, PluginError};

/// Maps each event to the stages registered for it, in registration order.
///
/// One instance is built at startup and shared read-only by every request.
#[derive(Default, Clone)]
pub struct EventManager {
    listeners: HashMap<EventType, Vec<Arc<dyn Plugin>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `plugin` to the chain of every event it activates on.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        for event in plugin.activation_events() {
            debug!(plugin = plugin.name(), event = %event, "registering stage");
            self.listeners
                .entry(event)
                .or_default()
                .push(Arc::clone(&plugin));
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Stages registered for `event`, in order.
    pub fn plugins_for(&self, event: EventType) -> &[Arc<dyn Plugin>] {
        self.listeners.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the stages registered for `event`, in order.
    pub fn stage_names(&self, event: EventType) -> Vec<&str> {
        self.plugins_for(event).iter().map(|p| p.name()).collect()
    }

    /// Run the chain registered for `event`.
    ///
    /// An event with no stages completes immediately. The first stage error
    /// stops the chain and is returned as is.
    #[instrument(skip_all, fields(event = %event, session_id = %chat.session_id, request_id = %ctx.request_id))]
    pub async fn trigger(
        &self,
        ctx: &RequestContext,
        event: EventType,
        chat: &mut ChatManage,
    ) -> Result<(), PluginError> {
        let chain = self.plugins_for(event);
        if chain.is_empty() {
            debug!("no stages registered");
            return Ok(());
        }

        match Next::new(chain, event).run(ctx, chat).await {
            Ok(_) => {
                info!(stages = chain.len(), "event completed");
                Ok(())
            }
            Err(e) => {
                warn!(stage = %e.stage, kind = %e.kind, error = %e.source, "event aborted");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        let mut events: Vec<_> = self.listeners.keys().copied().collect();
        events.sort();
        for event in events {
            map.entry(&event.as_str(), &self.stage_names(event));
        }
        map.finish()
    }
}
