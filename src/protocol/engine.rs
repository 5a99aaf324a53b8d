// ABOUTME: AT command engine task that owns one modem port and serialises commands onto it
// ABOUTME: Callers talk to it through a cloneable handle; unsolicited output flows out on a channel

use crate::connection::Connection;
use crate::customizer::Customizer;
use crate::datatypes::ErrorKind;
use crate::error::{ModemError, ModemResult};
use crate::protocol::command::{AtCommand, Captures, Reply};
use crate::protocol::unsolicited::{IdlePatterns, Unsolicited, scan_async};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Prompt the modem shows when it waits for the second half of a split
/// command.
const PROMPT_REGEX: &str = r"^\r\n>\s$";

type ReplySender = oneshot::Sender<ModemResult<Reply>>;

#[derive(Debug)]
enum Request {
    Submit {
        id: u64,
        cmd: AtCommand,
        reply: ReplySender,
    },
    Cancel {
        id: u64,
    },
    /// Bytes written outside the command queue, e.g. a dial string
    WriteRaw {
        text: String,
        reply: oneshot::Sender<ModemResult<()>>,
    },
    Close,
}

/// Cloneable handle to a running engine.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    requests: mpsc::UnboundedSender<Request>,
    next_id: Arc<AtomicU64>,
    data_mode: Arc<AtomicBool>,
}

/// A submitted command whose reply has not been collected yet.
#[derive(Debug)]
pub struct PendingCommand {
    id: u64,
    rx: oneshot::Receiver<ModemResult<Reply>>,
}

impl PendingCommand {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply. A dropped engine resolves to `PortClosed`.
    pub async fn wait(self) -> ModemResult<Reply> {
        self.rx.await.map_err(|_| ModemError::PortClosed)?
    }
}

impl EngineHandle {
    /// Queue `cmd` and return a handle to its reply.
    pub fn submit(&self, cmd: AtCommand) -> ModemResult<PendingCommand> {
        if self.is_data_mode() {
            return Err(ModemError::DataMode);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Submit { id, cmd, reply })
            .map_err(|_| ModemError::PortClosed)?;
        Ok(PendingCommand { id, rx })
    }

    /// Queue `cmd` and wait for its reply.
    pub async fn send(&self, cmd: AtCommand) -> ModemResult<Reply> {
        self.submit(cmd)?.wait().await
    }

    /// Send an arbitrary AT string that only answers `OK`.
    pub async fn send_at(&self, raw: &str) -> ModemResult<Reply> {
        self.send(AtCommand::new(raw, "send_at")).await
    }

    /// Remove a queued command. The command currently on the wire is not
    /// affected.
    pub fn cancel(&self, id: u64) {
        let _ = self.requests.send(Request::Cancel { id });
    }

    /// Write `text` to the port without waiting for any reply.
    pub async fn write_raw(&self, text: impl Into<String>) -> ModemResult<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::WriteRaw {
                text: text.into(),
                reply,
            })
            .map_err(|_| ModemError::PortClosed)?;
        rx.await.map_err(|_| ModemError::PortClosed)?
    }

    /// Mark the port as carrying a data call. While set, reads are
    /// discarded and new commands are refused.
    pub fn set_data_mode(&self, on: bool) {
        self.data_mode.store(on, Ordering::SeqCst);
    }

    pub fn is_data_mode(&self) -> bool {
        self.data_mode.load(Ordering::SeqCst)
    }

    /// Ask the engine to stop. Outstanding commands fail with `PortClosed`.
    pub fn close(&self) {
        let _ = self.requests.send(Request::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

struct Queued {
    id: u64,
    cmd: AtCommand,
    reply: ReplySender,
}

struct Current {
    cmd: AtCommand,
    reply: ReplySender,
    deadline: Instant,
}

enum Event {
    Request(Option<Request>),
    Read(std::io::Result<Option<String>>),
    Timeout,
}

enum Waiting {
    Done(ModemResult<Reply>, String),
    Prompt(String),
    More,
}

/// The task side of the engine.
pub struct Engine<S> {
    conn: Connection<S>,
    customizer: Arc<Customizer>,
    idle: IdlePatterns,
    prompt: Regex,
    queue: VecDeque<Queued>,
    current: Option<Current>,
    idlebuf: String,
    waitbuf: String,
    data_mode: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<Unsolicited>,
}

impl<S> Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start an engine on `stream`.
    ///
    /// The returned receiver yields unsolicited notifications; it closes
    /// when the engine stops.
    pub fn spawn(
        stream: S,
        customizer: Arc<Customizer>,
    ) -> ModemResult<(EngineHandle, mpsc::UnboundedReceiver<Unsolicited>)> {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let data_mode = Arc::new(AtomicBool::new(false));

        let engine = Engine {
            conn: Connection::new(stream),
            customizer,
            idle: IdlePatterns::new()?,
            prompt: Regex::new(PROMPT_REGEX)?,
            queue: VecDeque::new(),
            current: None,
            idlebuf: String::new(),
            waitbuf: String::new(),
            data_mode: data_mode.clone(),
            events: event_tx,
        };
        tokio::spawn(engine.run(req_rx));

        let handle = EngineHandle {
            requests: req_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            data_mode,
        };
        Ok((handle, event_rx))
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        debug!(family = self.customizer.family(), "engine started");
        loop {
            self.dispatch().await;

            let deadline = self.current.as_ref().map(|c| c.deadline);
            let event = tokio::select! {
                req = requests.recv() => Event::Request(req),
                read = self.conn.read_text() => Event::Read(read),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Event::Timeout
                }
            };

            match event {
                Event::Request(Some(Request::Submit { id, cmd, reply })) => {
                    debug!(id, name = %cmd.name, "queued");
                    self.queue.push_back(Queued { id, cmd, reply });
                }
                Event::Request(Some(Request::Cancel { id })) => self.cancel(id),
                Event::Request(Some(Request::WriteRaw { text, reply })) => {
                    let result = self.conn.write_str(&text).await.map_err(ModemError::from);
                    let _ = reply.send(result);
                }
                Event::Request(Some(Request::Close)) | Event::Request(None) => {
                    debug!("engine asked to stop");
                    break;
                }
                Event::Read(Ok(Some(text))) => self.on_text(text).await,
                Event::Read(Ok(None)) => {
                    info!("modem port closed");
                    break;
                }
                Event::Read(Err(e)) => {
                    warn!(error = %e, "modem port read failed");
                    break;
                }
                Event::Timeout => self.on_timeout(),
            }
        }
        self.shutdown();
    }

    /// Write the next queued command if nothing is on the wire.
    async fn dispatch(&mut self) {
        while self.current.is_none() {
            let Some(next) = self.queue.pop_front() else {
                return;
            };
            if next.reply.is_closed() {
                debug!(id = next.id, "caller went away, skipping");
                continue;
            }
            if self.data_mode.load(Ordering::SeqCst) {
                let _ = next.reply.send(Err(ModemError::DataMode));
                continue;
            }

            debug!(id = next.id, cmd = ?next.cmd, "sending");
            match self.conn.write_str(&next.cmd.wire()).await {
                Ok(()) => {
                    self.current = Some(Current {
                        deadline: Instant::now() + next.cmd.timeout,
                        cmd: next.cmd,
                        reply: next.reply,
                    });
                }
                Err(e) => {
                    let _ = next.reply.send(Err(e.into()));
                }
            }
        }
    }

    fn cancel(&mut self, id: u64) {
        if let Some(pos) = self.queue.iter().position(|q| q.id == id) {
            if let Some(queued) = self.queue.remove(pos) {
                debug!(id, name = %queued.cmd.name, "cancelled");
                let _ = queued.reply.send(Err(ModemError::Cancelled));
            }
        }
    }

    async fn on_text(&mut self, text: String) {
        if self.data_mode.load(Ordering::SeqCst) {
            debug!(len = text.len(), "discarding data-mode bytes");
            return;
        }

        if self.current.is_some() {
            self.waitbuf.push_str(&text);
            self.process_waiting().await;
        } else {
            self.idlebuf.push_str(&text);
            self.process_idle();
        }
    }

    fn process_idle(&mut self) {
        let signals = scan_async(
            &mut self.idlebuf,
            self.customizer.async_regex(),
            self.customizer.translations(),
        );
        for signal in signals {
            self.publish(Unsolicited::Signal(signal));
        }
        for found in self.idle.process(&mut self.idlebuf) {
            self.publish(found);
        }
    }

    async fn process_waiting(&mut self) {
        let signals = scan_async(
            &mut self.waitbuf,
            self.customizer.async_regex(),
            self.customizer.translations(),
        );
        for signal in signals {
            self.publish(Unsolicited::Signal(signal));
        }
        for found in self.idle.take(&mut self.waitbuf) {
            self.publish(found);
        }

        match self.match_reply() {
            Waiting::Done(result, rest) => self.finish(result, rest),
            Waiting::Prompt(split) => {
                debug!("prompt seen, sending continuation");
                self.waitbuf.clear();
                if let Err(e) = self.conn.write_str(&split).await {
                    self.finish(Err(e.into()), String::new());
                }
            }
            Waiting::More => {}
        }
    }

    fn match_reply(&self) -> Waiting {
        let Some(current) = &self.current else {
            return Waiting::More;
        };
        let catalog = self.customizer.catalog();
        let entry = catalog.get(&current.cmd.name);

        if let Some(end) = entry.end.find(&self.waitbuf) {
            let head = &self.waitbuf[..end.end()];
            let matches = match &entry.extract {
                Some(extract) => extract
                    .captures_iter(head)
                    .map(|caps| Captures::from_regex(extract, &caps))
                    .collect(),
                None => Vec::new(),
            };
            let reply = Reply {
                text: head.to_string(),
                matches,
            };
            return Waiting::Done(Ok(reply), self.waitbuf[end.end()..].to_string());
        }

        if let Some(caps) = catalog.error_regex().captures(&self.waitbuf) {
            let fragment = caps.name("error").map(|m| m.as_str()).unwrap_or("ERROR");
            let rest = caps
                .get(0)
                .map(|whole| self.waitbuf[whole.end()..].to_string())
                .unwrap_or_default();
            let err = ModemError::new(ErrorKind::from_fragment(fragment), fragment);
            return Waiting::Done(Err(err), rest);
        }

        if self.prompt.is_match(&self.waitbuf) {
            if let Some(split) = &current.cmd.splitcmd {
                return Waiting::Prompt(split.clone());
            }
        }
        Waiting::More
    }

    /// Complete the current command and hand any trailing text to the idle
    /// passes.
    fn finish(&mut self, result: ModemResult<Reply>, rest: String) {
        if let Some(current) = self.current.take() {
            match &result {
                Ok(_) => debug!(name = %current.cmd.name, "completed"),
                Err(e) => debug!(name = %current.cmd.name, error = %e, "failed"),
            }
            let _ = current.reply.send(result);
        }
        self.waitbuf.clear();
        if !rest.is_empty() {
            self.idlebuf.push_str(&rest);
            self.process_idle();
        }
    }

    fn on_timeout(&mut self) {
        let buffered = std::mem::take(&mut self.waitbuf);
        if let Some(current) = &self.current {
            warn!(name = %current.cmd.name, data = ?buffered, "command timed out");
        }
        self.finish(
            Err(ModemError::new(ErrorKind::SerialResponseTimeout, buffered)),
            String::new(),
        );
    }

    fn publish(&self, event: Unsolicited) {
        debug!(?event, "unsolicited");
        if self.events.send(event).is_err() {
            debug!("nobody listening for unsolicited events");
        }
    }

    fn shutdown(&mut self) {
        if let Some(current) = self.current.take() {
            let _ = current.reply.send(Err(ModemError::PortClosed));
        }
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(Err(ModemError::PortClosed));
        }
        debug!("engine stopped");
    }
}
