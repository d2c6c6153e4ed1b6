use crate::config::KioskConfig;
use crate::error::SyncError;
use crate::kiosk::command::{Action, Command};
use crate::kiosk::context::SyncContext;
use crate::kiosk::state::StateStore;
use crate::kiosk::transport::{DeliveryPath, Inbound, Transport};
use crate::kiosk::types::{now_millis, DisplayMode, DisplayState, FeedSlot, Sponsor};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operator side of the protocol.
///
/// Holds a read-replica of every configured display. Replicas are updated
/// optimistically by the setters and overwritten by inbound state reports;
/// the displays stay authoritative.
pub struct ControllerEngine {
    config: Arc<KioskConfig>,
    replicas: HashMap<String, DisplayState>,
    connected: BTreeSet<String>,
    last_seen: HashMap<String, i64>,
    store: StateStore,
    transport: Transport,
}

impl ControllerEngine {
    pub fn activate(ctx: &SyncContext) -> Self {
        let transport = ctx.open_transport();
        let store = ctx.state_store(transport.origin());
        let config = ctx.config().clone();

        let replicas: HashMap<String, DisplayState> = config
            .display_ids()
            .map(|id| (id.to_string(), store.load(id)))
            .collect();

        for id in config.display_ids() {
            transport.send(&Command::RequestState {
                display_id: id.to_string(),
            });
        }
        info!(
            "Controller active for {} displays (endpoint {})",
            replicas.len(),
            transport.origin()
        );

        Self {
            config,
            replicas,
            connected: BTreeSet::new(),
            last_seen: HashMap::new(),
            store,
            transport,
        }
    }

    pub fn set_mode(&mut self, display_id: &str, mode: DisplayMode) -> Result<(), SyncError> {
        self.send_action(display_id, Action::SetMode { mode })
    }

    pub fn set_slide(&mut self, display_id: &str, index: usize) -> Result<(), SyncError> {
        self.send_action(display_id, Action::SetSlide { index })
    }

    pub fn advance_slide(&mut self, display_id: &str) -> Result<(), SyncError> {
        self.send_action(display_id, Action::AdvanceSlide)
    }

    pub fn set_auto_advance(&mut self, display_id: &str, enabled: bool) -> Result<(), SyncError> {
        self.send_action(display_id, Action::SetAutoAdvance { enabled })
    }

    pub fn set_slide_duration(&mut self, display_id: &str, seconds: u32) -> Result<(), SyncError> {
        self.send_action(display_id, Action::SetSlideDuration { seconds })
    }

    pub fn set_feed_url(
        &mut self,
        display_id: &str,
        slot: FeedSlot,
        url: impl Into<String>,
    ) -> Result<(), SyncError> {
        let url = url.into();
        self.send_action(display_id, Action::SetFeedUrl { slot, url })
    }

    pub fn replace_sponsors(
        &mut self,
        display_id: &str,
        sponsors: Vec<Sponsor>,
    ) -> Result<(), SyncError> {
        self.send_action(display_id, Action::ReplaceSponsors { sponsors })
    }

    /// Send `action` to every configured display. Returns the number of
    /// commands sent.
    pub fn apply_to_all(&mut self, action: Action) -> usize {
        let commands = Command::ApplyToAll { action }.expand(self.config.display_ids());
        let count = commands.len();
        for command in commands {
            if let Some((display_id, action)) = command.into_action() {
                self.dispatch(display_id, action);
            }
        }
        count
    }

    /// Ask one display to report its state again.
    pub fn request_state(&mut self, display_id: &str) -> Result<(), SyncError> {
        self.ensure_configured(display_id)?;
        self.transport.send(&Command::RequestState {
            display_id: display_id.to_string(),
        });
        Ok(())
    }

    /// Post a pre-encoded command on the bus as-is
    pub fn post_raw(&self, payload: impl Into<Arc<str>>) {
        self.transport.post_raw(payload);
    }

    /// Send one action to one display; the typed setters go through here.
    pub fn send_action(&mut self, display_id: &str, action: Action) -> Result<(), SyncError> {
        self.ensure_configured(display_id)?;
        self.dispatch(display_id.to_string(), action);
        Ok(())
    }

    fn ensure_configured(&self, display_id: &str) -> Result<(), SyncError> {
        if self.replicas.contains_key(display_id) {
            Ok(())
        } else {
            Err(SyncError::UnknownDisplay(display_id.to_string()))
        }
    }

    fn dispatch(&mut self, display_id: String, action: Action) {
        self.transport
            .send(&Command::addressed(display_id.clone(), action.clone()));

        if let Some(replica) = self.replicas.get_mut(&display_id) {
            action.apply(replica, now_millis());
            if action.persists_on_controller() {
                self.store.save(replica);
            }
        }
    }

    /// React to inbound traffic. Only state reports matter here; every other
    /// kind is something the controller sends itself.
    pub fn handle(&mut self, inbound: Inbound) {
        let Command::ReportState {
            display_id,
            mut state,
        } = inbound.command
        else {
            return;
        };
        if inbound.path == DeliveryPath::Local {
            return;
        }
        if state.display_id != display_id {
            warn!(
                "Dropping report for {} carrying state of {}",
                display_id, state.display_id
            );
            return;
        }
        let Some(replica) = self.replicas.get_mut(&display_id) else {
            debug!("Ignoring report from unconfigured display {}", display_id);
            return;
        };

        if state.normalize() {
            warn!("Report from {} had slide index out of range, clamped", display_id);
        }
        *replica = state;
        if inbound.path == DeliveryPath::Bus {
            self.last_seen.insert(display_id.clone(), now_millis());
            if self.connected.insert(display_id.clone()) {
                info!("Display {} connected", display_id);
            }
        } else {
            debug!("Replica for {} refreshed from storage", display_id);
        }
    }

    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(inbound) = self.transport.try_next() {
            self.handle(inbound);
            handled += 1;
        }
        handled
    }

    /// Wait for the next inbound message; pass it to [`Self::handle`].
    pub async fn next_inbound(&mut self) -> Option<Inbound> {
        self.transport.recv().await
    }

    pub fn replicas(&self) -> &HashMap<String, DisplayState> {
        &self.replicas
    }

    pub fn replica(&self, display_id: &str) -> Option<&DisplayState> {
        self.replicas.get(display_id)
    }

    /// Displays that have reported at least once this session.
    ///
    /// There is no liveness check: a display that goes silent stays here.
    /// Use [`Self::last_seen`] to judge staleness.
    pub fn connected(&self) -> &BTreeSet<String> {
        &self.connected
    }

    pub fn is_connected(&self, display_id: &str) -> bool {
        self.connected.contains(display_id)
    }

    /// Epoch milliseconds of the last bus report from `display_id`
    pub fn last_seen(&self, display_id: &str) -> Option<i64> {
        self.last_seen.get(display_id).copied()
    }

    pub fn config(&self) -> &Arc<KioskConfig> {
        &self.config
    }

    pub fn deactivate(mut self) -> HashMap<String, DisplayState> {
        self.transport.close();
        info!("Controller deactivated");
        self.replicas
    }
}
