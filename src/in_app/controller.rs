//! Chooses which in-app message to present, one at a time.

use super::dynamic::{DynamicTriggerScheduler, TriggerObserver};
use super::evaluator::TriggerEvaluator;
use super::models::{InAppMessage, RedisplayStats};
use super::redisplay::RedisplayGate;
use super::store::InAppMessageStore;
use super::trigger_store::TriggerStore;
use crate::clock::Clock;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Renders a message. Implemented by the host application.
pub trait InAppMessagePresenter: Send + Sync {
    fn present(&self, message: &InAppMessage) -> Result<()>;
}

#[derive(Default)]
struct ControllerState {
    messages: Vec<InAppMessage>,
    stats: HashMap<String, RedisplayStats>,
    showing: Option<String>,
}

pub struct InAppMessageController {
    triggers: TriggerStore,
    evaluator: TriggerEvaluator,
    dynamic: Arc<DynamicTriggerScheduler>,
    gate: RedisplayGate,
    store: Arc<dyn InAppMessageStore>,
    presenter: Arc<dyn InAppMessagePresenter>,
    state: Mutex<ControllerState>,
}

impl InAppMessageController {
    /// Build a controller observing the timers of `dynamic`.
    pub fn new(
        clock: Arc<dyn Clock>,
        dynamic: Arc<DynamicTriggerScheduler>,
        store: Arc<dyn InAppMessageStore>,
        presenter: Arc<dyn InAppMessagePresenter>,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            triggers: TriggerStore::default(),
            evaluator: TriggerEvaluator::new(dynamic.clone()),
            gate: RedisplayGate::new(clock, store.clone()),
            dynamic,
            store,
            presenter,
            state: Mutex::new(ControllerState::default()),
        });
        let observer: Arc<dyn TriggerObserver> = controller.clone();
        controller.dynamic.add_observer(&observer);
        controller
    }

    pub fn triggers(&self) -> &TriggerStore {
        &self.triggers
    }

    pub fn showing(&self) -> Option<String> {
        self.state().ok().and_then(|state| state.showing.clone())
    }

    pub fn stats(&self, message_id: &str) -> Option<RedisplayStats> {
        self.state()
            .ok()
            .and_then(|state| state.stats.get(message_id).copied())
    }

    /// Replace the message list, loading persisted display statistics, and
    /// evaluate. Timers scheduled for the previous list are dropped.
    pub fn set_messages(&self, messages: Vec<InAppMessage>) -> Result<Option<String>> {
        let mut stats = HashMap::new();
        for message in &messages {
            let mut message_stats = RedisplayStats::from_config(message.redisplay);
            match self.store.load_stats(&message.id) {
                Ok(Some(stored)) => {
                    message_stats.display_quantity = stored.display_quantity;
                    message_stats.last_display_time_seconds = stored.last_display_time;
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to load stats of message {}: {:#}", message.id, e),
            }
            stats.insert(message.id.clone(), message_stats);
        }
        {
            let mut state = self.state()?;
            info!("Loaded {} in-app messages", messages.len());
            state.messages = messages;
            state.stats = stats;
        }
        self.dynamic.reset();
        self.evaluate_messages()
    }

    pub fn add_trigger(&self, key: &str, value: Value) -> Result<Option<String>> {
        self.triggers.set(key, value);
        self.evaluate_messages()
    }

    pub fn add_triggers(&self, entries: HashMap<String, Value>) -> Result<Option<String>> {
        self.triggers.set_all(entries);
        self.evaluate_messages()
    }

    pub fn remove_triggers(&self, keys: &[&str]) -> Result<Option<String>> {
        self.triggers.remove(keys);
        self.evaluate_messages()
    }

    /// Present the first eligible message unless one is already showing.
    /// Returns the id of the presented message.
    pub fn evaluate_messages(&self) -> Result<Option<String>> {
        let candidate = {
            let mut state = self.state()?;
            if state.showing.is_some() {
                return Ok(None);
            }
            let ControllerState {
                messages, stats, ..
            } = &mut *state;

            let mut candidate = None;
            for message in messages.iter() {
                if !self
                    .evaluator
                    .evaluate(&message.id, &message.triggers, &self.triggers)
                {
                    continue;
                }
                let message_stats = stats.entry(message.id.clone()).or_default();
                if message_stats.display_quantity > 0
                    && !(message_stats.redisplay_enabled
                        && self.gate.can_show_again(message_stats))
                {
                    debug!("Message {} may not be shown again yet", message.id);
                    continue;
                }
                candidate = Some(message.clone());
                break;
            }
            if let Some(message) = &candidate {
                state.showing = Some(message.id.clone());
            }
            candidate
        };

        let Some(message) = candidate else {
            return Ok(None);
        };
        debug!("Presenting in-app message {}", message.id);
        if let Err(e) = self.presenter.present(&message) {
            self.state()?.showing = None;
            return Err(e.context(format!("Failed to present message {}", message.id)));
        }
        Ok(Some(message.id))
    }

    /// The presenter put `message_id` on screen.
    pub fn on_message_displayed(&self, message_id: &str) -> Result<()> {
        self.dynamic.on_message_showing();
        let mut state = self.state()?;
        state.showing = Some(message_id.to_string());
        let stats = state.stats.entry(message_id.to_string()).or_default();
        self.gate.record_display(message_id, stats)
    }

    pub fn on_message_dismissed(&self, message_id: &str) -> Result<Option<String>> {
        {
            let mut state = self.state()?;
            if state.showing.as_deref() == Some(message_id) {
                state.showing = None;
            }
        }
        self.dynamic.on_message_dismissed();
        self.evaluate_messages()
    }

    pub fn on_session_started(&self) -> Result<Option<String>> {
        self.dynamic.on_session_started();
        self.evaluate_messages()
    }

    fn state(&self) -> Result<MutexGuard<'_, ControllerState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("In-app controller state lock poisoned"))
    }
}

impl TriggerObserver for InAppMessageController {
    fn on_trigger_conditions_changed(&self) {
        if let Err(e) = self.evaluate_messages() {
            warn!("Re-evaluation after trigger timer failed: {:#}", e);
        }
    }
}
