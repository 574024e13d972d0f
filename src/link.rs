//! Registry of the UART link services.
//!
//! Owns the channel and every component, resolves their cross-references
//! once in [`UartLink::begin`], and offers the single cooperative
//! [`UartLink::poll`] plus the JSON surface used by the transport glue.
//!
//! # Startup order
//!
//! 1. load persisted settings
//! 2. reader begin (clears runtime state, opens the channel)
//! 3. diagnostics begin
//! 4. register collaborators with the mode arbiter
//! 5. apply the loaded mode

use alloc::string::String;

use crate::channel::{LinkContext, SharedUartChannel};
use crate::config::{MigrationResult, Mode, PersistedSettings, SettingsStore};
use crate::diagnostics::{DiagnosticsEngine, DiagnosticsSnapshot, DiagnosticsUpdate};
use crate::error::LinkError;
use crate::hal::UartPort;
use crate::logging::LogSource;
use crate::mode::{Collaborators, ModeArbiter, ModeSnapshot, ModeUpdate};
use crate::serial::{LiveSerialReader, SerialControl, SerialSnapshot, SerialUpdate, SuspendReason};
use crate::state::{StateSink, StateUpdateResult, Topic};
use crate::{link_error, link_info, link_warn};

pub struct UartLink<P: UartPort, S: SettingsStore> {
    channel: SharedUartChannel<P>,
    reader: LiveSerialReader,
    engine: DiagnosticsEngine,
    arbiter: ModeArbiter,
    store: S,
    registered: bool,
}

impl<P: UartPort, S: SettingsStore> UartLink<P, S> {
    /// Services with default settings. Nothing touches the port until
    /// [`begin`](Self::begin).
    pub fn new(port: P, store: S) -> Self {
        Self {
            channel: SharedUartChannel::new(port),
            reader: LiveSerialReader::new(Default::default()),
            engine: DiagnosticsEngine::new(),
            arbiter: ModeArbiter::new(Mode::default()),
            store,
            registered: false,
        }
    }

    /// Load settings, start the services and apply the persisted mode.
    pub fn begin(&mut self, now_us: u64, sink: &mut dyn StateSink) -> Option<MigrationResult> {
        let mut settings = self.current_settings();
        let migration = match self.store.load(&mut settings) {
            Ok(result) => {
                link_info!(LogSource::System, now_us, "Settings loaded: {:?}", result);
                Some(result)
            }
            Err(e) => {
                link_error!(LogSource::System, now_us, "Settings load failed, using defaults: {}", e);
                settings = PersistedSettings::default();
                None
            }
        };
        let settings = settings.sanitized();
        link_info!(LogSource::Mode, now_us, "Loaded mode: {}", settings.mode.as_str());

        self.reader.set_config(settings.serial);
        self.arbiter = ModeArbiter::new(settings.mode);
        self.registered = false;

        let mut cx = LinkContext::new(&mut self.channel, sink, now_us);
        if settings.mode == Mode::Diagnostics {
            // Park before the first open so the UART never starts in live mode
            SerialControl::suspend(&mut self.reader, SuspendReason::Mode, &mut cx);
        }
        self.reader.begin(&mut cx);
        self.engine.begin(now_us);

        self.registered = true;
        link_info!(LogSource::System, now_us, "Services registered");
        self.arbiter.apply(
            Some(Collaborators {
                serial: &mut self.reader,
                diagnostics: &mut self.engine,
            }),
            &mut cx,
        );

        migration
    }

    /// One pass of the control loop.
    pub fn poll(&mut self, now_us: u64, sink: &mut dyn StateSink) {
        let mut cx = LinkContext::new(&mut self.channel, sink, now_us);
        self.reader.poll(&mut cx);
        self.engine.poll(&mut self.reader, &mut cx);
    }

    fn current_settings(&self) -> PersistedSettings {
        PersistedSettings {
            mode: self.arbiter.mode(),
            serial: self.reader.config().clone(),
        }
    }

    /// Save after a change. Before [`begin`](Self::begin) only the requested
    /// field is known, so it is patched onto what the store holds.
    fn persist(&mut self, now_us: u64, patch: impl FnOnce(&mut PersistedSettings)) {
        let settings = if self.registered {
            self.current_settings()
        } else {
            let mut stored = PersistedSettings::default();
            if let Err(e) = self.store.load(&mut stored) {
                link_warn!(LogSource::System, now_us, "Settings load failed, save skipped: {}", e);
                return;
            }
            let mut stored = stored.sanitized();
            patch(&mut stored);
            stored
        };
        if let Err(e) = self.store.save(&settings) {
            link_error!(LogSource::System, now_us, "Settings save failed: {}", e);
        }
    }

    pub fn update_serial(
        &mut self,
        update: &SerialUpdate,
        origin: &str,
        now_us: u64,
        sink: &mut dyn StateSink,
    ) -> StateUpdateResult {
        let mut cx = LinkContext::new(&mut self.channel, sink, now_us);
        let result = self.reader.update(update, origin, &mut cx);
        if result == StateUpdateResult::Changed {
            self.persist(now_us, |stored| {
                update.apply_to(&mut stored.serial);
            });
        }
        result
    }

    pub fn update_mode(
        &mut self,
        update: &ModeUpdate,
        origin: &str,
        now_us: u64,
        sink: &mut dyn StateSink,
    ) -> StateUpdateResult {
        let mut cx = LinkContext::new(&mut self.channel, sink, now_us);
        let collaborators = if self.registered {
            Some(Collaborators {
                serial: &mut self.reader,
                diagnostics: &mut self.engine,
            })
        } else {
            None
        };
        let result = self.arbiter.update(update, origin, collaborators, &mut cx);
        if result == StateUpdateResult::Changed {
            let mode = self.arbiter.mode();
            self.persist(now_us, |stored| stored.mode = mode);
        }
        result
    }

    pub fn update_diagnostics(
        &mut self,
        update: &DiagnosticsUpdate,
        origin: &str,
        now_us: u64,
        sink: &mut dyn StateSink,
    ) -> StateUpdateResult {
        let mut cx = LinkContext::new(&mut self.channel, sink, now_us);
        self.engine.update(update, origin, &mut self.reader, &mut cx)
    }

    pub fn serial_state(&self) -> SerialSnapshot {
        self.reader.read_state()
    }

    pub fn mode_state(&self) -> ModeSnapshot {
        self.arbiter.read_state()
    }

    pub fn diagnostics_state(&self, now_us: u64) -> DiagnosticsSnapshot {
        self.engine.read_state(now_us)
    }

    /// Current state of `topic` as JSON.
    pub fn read_json(&self, topic: &str, now_us: u64) -> Result<String, LinkError> {
        let encoded = match Topic::from_name(topic).ok_or(LinkError::UnknownTopic)? {
            Topic::Serial => serde_json::to_string(&self.serial_state()),
            Topic::UartMode => serde_json::to_string(&self.mode_state()),
            Topic::Diagnostics => serde_json::to_string(&self.diagnostics_state(now_us)),
        };
        encoded.map_err(LinkError::Encode)
    }

    /// Apply a JSON update document to `topic`.
    pub fn update_json(
        &mut self,
        topic: &str,
        body: &str,
        origin: &str,
        now_us: u64,
        sink: &mut dyn StateSink,
    ) -> Result<StateUpdateResult, LinkError> {
        let topic = Topic::from_name(topic).ok_or(LinkError::UnknownTopic)?;
        let decoded = match topic {
            Topic::Serial => serde_json::from_str(body).map(|u| self.update_serial(&u, origin, now_us, sink)),
            Topic::UartMode => serde_json::from_str(body).map(|u| self.update_mode(&u, origin, now_us, sink)),
            Topic::Diagnostics => {
                serde_json::from_str(body).map(|u| self.update_diagnostics(&u, origin, now_us, sink))
            }
        };
        decoded.map_err(|e| {
            link_warn!(LogSource::System, now_us, "Bad {} update: {}", topic.as_str(), e);
            LinkError::Decode(e)
        })
    }

    pub fn mode(&self) -> Mode {
        self.arbiter.mode()
    }

    pub fn channel(&self) -> &SharedUartChannel<P> {
        &self.channel
    }

    pub fn reader(&self) -> &LiveSerialReader {
        &self.reader
    }

    pub fn engine(&self) -> &DiagnosticsEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Collaborators are registered with the arbiter.
    pub fn is_registered(&self) -> bool {
        self.registered
    }
}
