// ABOUTME: High-level modem operations on top of the AT engine, one method per client operation
// ABOUTME: Owns SIM state, the message layer and the enable/disable lifecycle of one device

mod card;
mod connect;
mod contacts;
mod network;
mod sms;
mod ussd;

pub use card::CardInfo;
pub use connect::{DataLink, RegisteredStatus, SimpleStatus};
pub use contacts::Contact;
pub use network::OperatorFormat;

use crate::customizer::Customizer;
use crate::daemon::{Daemons, PollIntervals};
use crate::datatypes::{AccessTech, Charset, ErrorKind, Interface, ModemState, UssdState};
use crate::error::{ModemError, ModemResult};
use crate::machines;
use crate::mal::MessageAssemblyLayer;
use crate::protocol::{AtCommand, EngineHandle, Reply, Unsolicited};
use crate::signals::{Capability, Signal};
use crate::sim::{self, SimState};
use crate::status::StatusBoard;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

/// Attempts made when reading the SIM right after enable.
const INIT_ATTEMPTS: u32 = 3;
const INIT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// `AT+CFUN` may take a while on some radios.
const RADIO_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-device bookkeeping that outlives single operations.
#[derive(Debug, Default)]
struct Session {
    /// PDP context selected by the last `set_apn`
    conn_id: Option<u32>,
    /// When the SIM was last unlocked
    authtime: Option<Instant>,
    /// Set by a failure notification while a data call comes up
    connection_failed: bool,
    /// Set when a disconnect races an IP configuration poll
    should_stop: bool,
}

pub struct Wrapper {
    engine: EngineHandle,
    custom: Arc<Customizer>,
    board: Arc<StatusBoard>,
    sim: Arc<Mutex<SimState>>,
    /// Held by anything that encodes against, or switches, the charset
    charset_lock: Arc<tokio::sync::Mutex<()>>,
    mal: tokio::sync::Mutex<MessageAssemblyLayer>,
    registration: network::RegistrationCache,
    sms_reference: AtomicU8,
    link: DataLink,
    dialer: tokio::sync::Mutex<Option<tokio_serial::SerialStream>>,
    session: Mutex<Session>,
    daemons: Mutex<Option<Daemons>>,
    intervals: PollIntervals,
}

impl Wrapper {
    pub fn new(
        engine: EngineHandle,
        custom: Arc<Customizer>,
        board: Arc<StatusBoard>,
        link: DataLink,
    ) -> Wrapper {
        Wrapper {
            engine,
            custom,
            board,
            sim: Arc::new(Mutex::new(SimState::new())),
            charset_lock: Arc::new(tokio::sync::Mutex::new(())),
            mal: tokio::sync::Mutex::new(MessageAssemblyLayer::new()),
            registration: network::RegistrationCache::default(),
            sms_reference: AtomicU8::new(0),
            link,
            dialer: tokio::sync::Mutex::new(None),
            session: Mutex::new(Session::default()),
            daemons: Mutex::new(None),
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn custom(&self) -> &Customizer {
        &self.custom
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn status(&self) -> ModemState {
        self.board.status()
    }

    pub fn set_status(&self, state: ModemState) {
        self.board.set_status(state);
    }

    pub fn emit(&self, signal: Signal) {
        self.board.emit(signal);
    }

    /// Snapshot of the SIM state.
    pub fn sim(&self) -> SimState {
        lock(&self.sim).clone()
    }

    /// Charset last selected. Commands built from it must hold a
    /// [`CharsetLease`] instead, see [`Wrapper::lease_charset`].
    pub fn charset(&self) -> Charset {
        lock(&self.sim).charset
    }

    /// Pin the active charset until the lease is dropped. Temporary
    /// switches wait for every outstanding lease.
    pub async fn lease_charset(&self) -> CharsetLease {
        let held = self.charset_lock.clone().lock_owned().await;
        CharsetLease {
            charset: self.charset(),
            _held: held,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    /// PDP context id chosen by the last `set_apn`.
    pub fn conn_id(&self) -> ModemResult<u32> {
        self.session()
            .conn_id
            .ok_or_else(|| ModemError::new(ErrorKind::CallIndexError, "no PDP context selected"))
    }

    pub fn authtime(&self) -> Option<Instant> {
        self.session().authtime
    }

    pub(crate) fn connection_failed(&self) -> bool {
        self.session().connection_failed
    }

    /// Consume a pending stop request left by a disconnect.
    pub(crate) fn take_should_stop(&self) -> bool {
        std::mem::take(&mut self.session().should_stop)
    }

    pub async fn send(&self, cmd: AtCommand) -> ModemResult<Reply> {
        self.engine.send(cmd).await
    }

    /// Send `raw` handled by the catalog entry `name`.
    pub async fn query(&self, raw: impl Into<String>, name: &str) -> ModemResult<Reply> {
        self.engine.send(AtCommand::new(raw, name)).await
    }

    /// Send an AT string that only answers `OK`.
    pub async fn send_at(&self, raw: &str) -> ModemResult<()> {
        self.engine.send_at(raw).await.map(|_| ())
    }

    /// Switch to `charset` until the returned guard is restored or dropped.
    /// Nobody else encodes text while the guard lives.
    pub async fn charset_guard(&self, charset: Charset) -> ModemResult<CharsetGuard> {
        let held = self.charset_lock.clone().lock_owned().await;
        let previous = self.charset();
        if previous != charset {
            apply_charset(&self.engine, &self.sim, charset).await?;
        }
        Ok(CharsetGuard {
            engine: self.engine.clone(),
            sim: self.sim.clone(),
            charset,
            previous: (previous != charset).then_some(previous),
            held: Some(held),
        })
    }

    /// Switch the modem to `charset` for good.
    pub(crate) async fn switch_charset(&self, charset: Charset) -> ModemResult<()> {
        let _held = self.charset_lock.lock().await;
        apply_charset(&self.engine, &self.sim, charset).await
    }

    /// Enable the device: unlock, initialise the SIM, start pollers.
    pub async fn enable_device(self: &Arc<Self>) -> ModemResult<()> {
        let status = self.status();
        if status.is_enabled() {
            return Ok(());
        }
        if status == ModemState::Enabling {
            return Err(ModemError::new(ErrorKind::SimBusy, "device is already enabling"));
        }

        self.set_status(ModemState::Enabling);
        if let Err(e) = machines::authenticate(self).await {
            self.set_status(ModemState::Disabled);
            return Err(e);
        }
        if let Err(e) = self.initialize().await {
            warn!(error = %e, "device initialisation failed");
            self.stop_daemons();
            self.set_status(ModemState::Disabled);
            return Err(e);
        }
        info!(family = self.custom.family(), "device enabled");
        Ok(())
    }

    pub async fn disable_device(&self) -> ModemResult<()> {
        if self.status() == ModemState::Connected {
            if let Err(e) = self.disconnect_from_internet().await {
                warn!(error = %e, "disconnect while disabling failed");
            }
        }
        if !self.status().is_enabled() {
            return Ok(());
        }
        self.set_status(ModemState::Disabling);
        self.stop_daemons();
        self.mal.lock().await.reset();
        *lock(&self.sim) = SimState::new();
        self.registration.clear();
        self.set_status(ModemState::Disabled);
        info!("device disabled");
        Ok(())
    }

    async fn initialize(self: &Arc<Self>) -> ModemResult<()> {
        // A freshly unlocked SIM needs time before it answers reliably
        if let Some(authtime) = self.authtime() {
            let ready = authtime + self.custom.auth_delay();
            if ready > Instant::now() {
                debug!(wait = ?(ready - Instant::now()), "letting the SIM settle");
                sleep_until(ready).await;
            }
        }
        if let Some(sim_ready) = self.custom.hooks().sim_ready {
            sim_ready(self).await?;
        }

        self.enable_radio(true).await?;
        self.initialize_sim().await?;
        self.init_mal().await?;
        self.init_properties().await?;
        self.start_daemons();
        self.set_status(ModemState::Enabled);
        if let Err(e) = self.set_netreg_notification(1).await {
            warn!(error = %e, "could not enable +CREG notifications");
        }
        Ok(())
    }

    async fn initialize_sim(&self) -> ModemResult<()> {
        match self.send_at("AT+CMEE=1").await {
            Ok(()) => lock(&self.sim).extended_errors = true,
            Err(e) => warn!(error = %e, "extended error reporting unavailable"),
        }

        let supported = self.get_charsets().await?;
        match SimState::choose_charset(&supported) {
            Some(charset) => self.set_charset(charset).await?,
            None => warn!(?supported, "no usable charset, keeping {}", self.charset()),
        }

        self.set_sms_indication(2, 1, 0, 1, 0).await?;
        self.set_sms_format(0).await?;

        let mut attempt = 0;
        loop {
            match self.get_phonebook_size().await {
                Ok(size) => {
                    lock(&self.sim).size = Some(size);
                    break;
                }
                Err(e) if attempt + 1 < sim::RETRY_ATTEMPTS => {
                    attempt += 1;
                    debug!(attempt, error = %e, "phonebook not ready");
                    sleep(Duration::from_secs(sim::RETRY_TIMEOUT)).await;
                }
                Err(e) => {
                    warn!(error = %e, "phonebook size unknown");
                    break;
                }
            }
        }

        for raw in self.custom.sim_init() {
            if let Err(e) = self.send_at(raw).await {
                warn!(command = raw.as_str(), error = %e, "SIM setup command failed");
            }
        }
        Ok(())
    }

    /// Read every stored SMS into the message layer.
    async fn init_mal(&self) -> ModemResult<()> {
        let mut attempt = 0;
        let messages = loop {
            match self.do_list_sms().await {
                Ok(messages) => break messages,
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= INIT_ATTEMPTS {
                        return Err(ModemError::new(
                            ErrorKind::SimFailure,
                            format!("SIM never became ready: {}", e),
                        ));
                    }
                    debug!(attempt, error = %e, "SMS storage not ready");
                    sleep(INIT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        };
        let count = messages.len();
        self.mal.lock().await.prime(messages);
        debug!(count, "message layer primed");
        Ok(())
    }

    async fn init_properties(&self) -> ModemResult<()> {
        self.board.set_property(Interface::Modem, "UnlockRetries", 999u32);
        self.board
            .set_property(Interface::Ussd, "State", UssdState::Idle.as_str());
        self.board.set_property(
            Interface::Card,
            "SupportedBands",
            self.custom.supported_bands().bits(),
        );
        self.board
            .set_property(Interface::Card, "SupportedModes", self.custom.supported_modes());

        let pin_enabled = self.get_pin_status().await?;
        self.board.set_property(Interface::Card, "PinEnabled", pin_enabled);

        let imei = self.get_imei().await?;
        self.board
            .set_property(Interface::Modem, "EquipmentIdentifier", imei);
        Ok(())
    }

    fn start_daemons(self: &Arc<Self>) {
        let poll_rssi = !self.link.is_dedicated()
            || !self.custom.has_capability(Capability::SignalQuality);
        let daemons = Daemons::start(self, self.intervals, poll_rssi);
        if let Some(old) = lock(&self.daemons).replace(daemons) {
            old.stop();
        }
    }

    fn stop_daemons(&self) {
        if let Some(daemons) = lock(&self.daemons).take() {
            daemons.stop();
        }
    }

    /// React to something the engine noticed on its own.
    pub async fn handle_unsolicited(&self, event: Unsolicited) {
        match event {
            Unsolicited::Signal(signal) => self.on_signal(signal).await,
            Unsolicited::NewSms { store, index } => {
                if let Err(e) = self.on_sms_notification(&store, index).await {
                    warn!(store, index, error = %e, "could not read new SMS");
                }
            }
            Unsolicited::DeliveryReport { pdu } => {
                if let Err(e) = self.on_delivery_report(&pdu).await {
                    warn!(error = %e, "could not process delivery report");
                }
            }
        }
    }

    async fn on_signal(&self, signal: Signal) {
        match &signal {
            Signal::CregReceived(status) => {
                self.emit(signal.clone());
                if let Err(e) = self.on_creg(*status).await {
                    warn!(status, error = %e, "registration refresh failed");
                }
                return;
            }
            Signal::NetworkMode(mode) => {
                let tech = AccessTech::from(*mode);
                if tech != AccessTech::Unknown {
                    self.board
                        .set_property(Interface::Network, "AccessTechnology", tech as u32);
                }
            }
            Signal::Disconnected if self.status() == ModemState::Connecting => {
                debug!("data call attempt failed");
                self.session().connection_failed = true;
            }
            _ => {}
        }
        self.emit(signal);
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("family", &self.custom.family())
            .field("state", &self.status())
            .field("charset", &self.charset())
            .finish()
    }
}

/// The charset commands may be encoded in while the lease is held.
#[derive(Debug)]
pub struct CharsetLease {
    charset: Charset,
    _held: OwnedMutexGuard<()>,
}

impl CharsetLease {
    pub fn charset(&self) -> Charset {
        self.charset
    }
}

/// Holds the charset lock across a temporary switch and puts the previous
/// charset back before letting go of it.
///
/// Call [`CharsetGuard::restore`] to learn whether restoring worked; a
/// guard dropped without it restores in the background, still holding
/// the lock until the modem has switched back.
#[derive(Debug)]
pub struct CharsetGuard {
    engine: EngineHandle,
    sim: Arc<Mutex<SimState>>,
    charset: Charset,
    previous: Option<Charset>,
    held: Option<OwnedMutexGuard<()>>,
}

impl CharsetGuard {
    /// Charset active while the guard lives.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub async fn restore(mut self) -> ModemResult<()> {
        let result = match self.previous.take() {
            Some(charset) => apply_charset(&self.engine, &self.sim, charset).await,
            None => Ok(()),
        };
        self.held.take();
        result
    }
}

impl Drop for CharsetGuard {
    fn drop(&mut self) {
        let Some(charset) = self.previous.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%charset, "no runtime left to restore charset");
            return;
        };
        let engine = self.engine.clone();
        let sim = self.sim.clone();
        let held = self.held.take();
        runtime.spawn(async move {
            if let Err(e) = apply_charset(&engine, &sim, charset).await {
                warn!(%charset, error = %e, "could not restore charset");
            }
            drop(held);
        });
    }
}

async fn apply_charset(
    engine: &EngineHandle,
    sim: &Mutex<SimState>,
    charset: Charset,
) -> ModemResult<()> {
    let raw = format!("AT+CSCS=\"{}\"", charset.as_str());
    engine.send(AtCommand::new(raw, "set_charset")).await?;
    lock(sim).charset = charset;
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Radio timeout shared by the card and network operations.
pub(crate) fn radio_command(raw: String, name: &str) -> AtCommand {
    AtCommand::new(raw, name).with_timeout(RADIO_TIMEOUT)
}

/// Next TP-MR for an outgoing SMS.
fn next_reference(counter: &AtomicU8) -> u8 {
    counter.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted modem for wrapper tests: answers each command line with
    //! the first matching canned reply.

    use super::*;
    use crate::protocol::Engine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    pub type Script = Vec<(&'static str, String)>;

    /// Spawn a mock modem replying per `script`. Unscripted commands get
    /// `OK`. Every line received is forwarded on the returned channel.
    pub fn mock_modem(script: Script) -> (DuplexStream, mpsc::UnboundedReceiver<String>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut port = theirs;
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = match port.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.iter().position(|b| *b == b'\r' || *b == 0x1a) {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..line.len() - 1])
                        .trim_start_matches('\n')
                        .to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = seen_tx.send(line.clone());
                    let reply = script
                        .iter()
                        .find(|(prefix, _)| line.starts_with(prefix))
                        .map(|(_, reply)| reply.clone())
                        .unwrap_or_else(|| "\r\nOK\r\n".to_string());
                    if port.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });
        (ours, seen_rx)
    }

    /// A wrapper for the generic family talking to a scripted modem.
    pub fn scripted(script: Script) -> (Arc<Wrapper>, mpsc::UnboundedReceiver<String>) {
        wrapper_with(Customizer::generic().expect("generic customizer"), script)
    }

    pub fn wrapper_with(
        custom: Customizer,
        script: Script,
    ) -> (Arc<Wrapper>, mpsc::UnboundedReceiver<String>) {
        let (stream, seen) = mock_modem(script);
        let custom = Arc::new(custom);
        let (engine, _events) = Engine::spawn(stream, custom.clone()).expect("engine");
        let board = Arc::new(StatusBoard::new());
        let wrapper = Arc::new(Wrapper::new(engine, custom, board, DataLink::Shared));
        (wrapper, seen)
    }

    pub fn drain(seen: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = seen.try_recv() {
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_charset_guard_restores_on_drop() {
        let (wrapper, mut seen) = scripted(vec![]);
        lock(&wrapper.sim).charset = Charset::Ucs2;

        {
            let _guard = wrapper.charset_guard(Charset::Ira).await.unwrap();
            assert_eq!(wrapper.charset(), Charset::Ira);
        }
        // the restore runs on a spawned task
        for _ in 0..50 {
            if wrapper.charset() == Charset::Ucs2 {
                break;
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(wrapper.charset(), Charset::Ucs2);
        let lines = drain(&mut seen);
        assert_eq!(lines, vec!["AT+CSCS=\"IRA\"", "AT+CSCS=\"UCS2\""]);
    }

    #[tokio::test]
    async fn test_encoders_wait_for_a_charset_switch() {
        let (wrapper, mut seen) = scripted(vec![]);
        lock(&wrapper.sim).charset = Charset::Ucs2;

        let guard = wrapper.charset_guard(Charset::Ira).await.unwrap();
        let writer = {
            let wrapper = wrapper.clone();
            tokio::spawn(async move { wrapper.edit_contact(2, "Ana", "600").await })
        };
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(!writer.is_finished());

        guard.restore().await.unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(
            drain(&mut seen),
            vec![
                "AT+CSCS=\"IRA\"",
                "AT+CSCS=\"UCS2\"",
                "AT+CPBW=2,\"600\",129,\"0041006E0061\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_guard_restores_before_others_encode() {
        let (wrapper, mut seen) = scripted(vec![]);
        lock(&wrapper.sim).charset = Charset::Ucs2;

        {
            let _guard = wrapper.charset_guard(Charset::Ira).await.unwrap();
        }
        wrapper.edit_contact(2, "Ana", "600").await.unwrap();
        assert_eq!(wrapper.charset(), Charset::Ucs2);
        assert_eq!(
            drain(&mut seen).last().unwrap(),
            "AT+CPBW=2,\"600\",129,\"0041006E0061\""
        );
    }

    #[tokio::test]
    async fn test_charset_guard_without_switch_sends_nothing() {
        let (wrapper, mut seen) = scripted(vec![]);
        let guard = wrapper.charset_guard(wrapper.charset()).await.unwrap();
        guard.restore().await.unwrap();
        assert!(drain(&mut seen).is_empty());
    }

    #[tokio::test]
    async fn test_network_mode_updates_access_technology() {
        let (wrapper, _) = scripted(vec![]);
        let mut rx = wrapper.board().subscribe();
        wrapper
            .handle_unsolicited(Unsolicited::Signal(Signal::NetworkMode(
                crate::datatypes::NetworkMode::Hsdpa,
            )))
            .await;
        assert_eq!(
            wrapper
                .board()
                .property(Interface::Network, "AccessTechnology")
                .and_then(|v| v.as_u32()),
            Some(AccessTech::Hsdpa as u32)
        );
        let mut saw_mode = false;
        while let Ok(signal) = rx.try_recv() {
            saw_mode |= matches!(signal, Signal::NetworkMode(_));
        }
        assert!(saw_mode);
    }
}
