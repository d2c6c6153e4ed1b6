use crate::error::SyncError;
use crate::kiosk::bootstrap::resolve_display_id;
use crate::kiosk::command::{Action, Command};
use crate::kiosk::context::SyncContext;
use crate::kiosk::slideshow::{sleep_until_deadline, SlideshowTimer};
use crate::kiosk::state::StateStore;
use crate::kiosk::transport::{DeliveryPath, Inbound, Transport};
use crate::kiosk::types::{now_millis, DisplayState};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The authoritative owner of one display's state.
pub struct DisplayEngine {
    display_id: String,
    state: DisplayState,
    store: StateStore,
    transport: Transport,
    slideshow: SlideshowTimer,
    /// Peer reports are adopted until this endpoint changes its own state
    bootstrapping: bool,
}

impl DisplayEngine {
    /// Load state, open the transport and ask for the current state of
    /// this identity. Unknown identities are not activated.
    pub fn activate(ctx: &SyncContext, display_id: &str) -> Result<Self, SyncError> {
        if !ctx.config().is_configured(display_id) {
            return Err(SyncError::UnknownDisplay(display_id.to_string()));
        }

        let transport = ctx.open_transport();
        let store = ctx.state_store(transport.origin());
        let state = store.load(display_id);
        info!(
            "Display {} active in {} mode (endpoint {})",
            display_id,
            state.mode,
            transport.origin()
        );

        let engine = Self {
            display_id: display_id.to_string(),
            state,
            store,
            transport,
            slideshow: SlideshowTimer::new(),
            bootstrapping: true,
        };
        engine.transport.send(&Command::RequestState {
            display_id: engine.display_id.clone(),
        });
        Ok(engine)
    }

    /// Activate from a bootstrap query string such as `?id=tv2`.
    pub fn activate_from_query(ctx: &SyncContext, query: &str) -> Result<Self, SyncError> {
        let display_id = resolve_display_id(query, ctx.config())?;
        Self::activate(ctx, &display_id)
    }

    pub fn display_id(&self) -> &str {
        &self.display_id
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    /// Step the showcase forward one sponsor. No-op without sponsors.
    pub fn advance_slide(&mut self) -> bool {
        let advanced = Action::AdvanceSlide.apply(&mut self.state, now_millis());
        if advanced {
            self.bootstrapping = false;
            self.store.save(&self.state);
        }
        advanced
    }

    pub fn handle(&mut self, inbound: Inbound) {
        let Inbound { command, path } = inbound;
        match command.target() {
            Some(target) if target == self.display_id => {}
            Some(_) => return,
            None => {
                debug!("{}: ignoring unexpanded {}", self.display_id, command.kind());
                return;
            }
        }

        match command {
            Command::RequestState { .. } => self.report_state(),
            Command::ReportState { state, .. } => self.adopt(state, path),
            other => {
                let kind = other.kind();
                if let Some((_, action)) = other.into_action() {
                    if action.apply(&mut self.state, now_millis()) {
                        debug!("{}: applied {} via {:?}", self.display_id, kind, path);
                        if action.restarts_slideshow() {
                            self.slideshow.restart();
                        }
                        self.bootstrapping = false;
                        self.store.save(&self.state);
                    }
                }
            }
        }
    }

    fn report_state(&self) {
        self.transport.send(&Command::ReportState {
            display_id: self.display_id.clone(),
            state: self.state.clone(),
        });
    }

    fn adopt(&mut self, mut state: DisplayState, path: DeliveryPath) {
        if state.display_id != self.display_id {
            warn!(
                "{}: dropping report carrying state of {}",
                self.display_id, state.display_id
            );
            return;
        }
        if path != DeliveryPath::Local && state.normalize() {
            warn!("{}: reported slide index out of range, clamped", self.display_id);
        }
        match path {
            // Our own reply
            DeliveryPath::Local => {}
            DeliveryPath::Bus if self.bootstrapping => {
                debug!("{}: adopting state reported by another endpoint", self.display_id);
                self.bootstrapping = false;
                self.state = state;
                self.store.save(&self.state);
            }
            DeliveryPath::Bus => {
                debug!("{}: keeping own state over peer report", self.display_id);
            }
            // Already durable; writing it back would bounce between endpoints
            DeliveryPath::Storage => {
                debug!("{}: adopting stored snapshot", self.display_id);
                self.state = state;
            }
        }
    }

    /// Handle everything already waiting on the transport.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(inbound) = self.transport.try_next() {
            self.handle(inbound);
            handled += 1;
        }
        handled
    }

    /// Serve commands and drive the slideshow until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DisplayState {
        info!("Display {} running", self.display_id);
        loop {
            self.slideshow.sync(&self.state, Instant::now());
            let deadline = self.slideshow.deadline();

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                inbound = self.transport.recv() => match inbound {
                    Some(inbound) => self.handle(inbound),
                    None => break,
                },
                _ = sleep_until_deadline(deadline) => {
                    self.slideshow.fire(Instant::now());
                    self.advance_slide();
                }
            }
        }
        self.deactivate()
    }

    /// Close the transport and hand back the final state.
    pub fn deactivate(mut self) -> DisplayState {
        self.transport.close();
        info!("Display {} deactivated", self.display_id);
        self.state
    }
}
