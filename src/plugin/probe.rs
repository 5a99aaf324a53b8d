// ABOUTME: Raw AT exchanges run before an engine exists: port probing and model identification
// ABOUTME: Works on any async byte stream so serial ports and in-memory pipes behave the same

use crate::error::{ModemError, ModemResult};
use crate::port::PortPair;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(3);

const RESET: &str = "ATZ E0 V1 X4 &C1\r\n";

/// Write `cmd` and collect the reply until a final result or `wait`
/// elapses. Whatever arrived by then is returned.
async fn exchange<S>(stream: &mut S, cmd: &str, wait: Duration) -> ModemResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(cmd.as_bytes()).await?;
    stream.flush().await?;

    let deadline = Instant::now() + wait;
    let mut reply = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match timeout_at(deadline, stream.read(&mut chunk)).await {
            Err(_) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => reply.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e.into()),
        }
        let text = String::from_utf8_lossy(&reply);
        if text
            .lines()
            .any(|l| matches!(l.trim(), "OK" | "ERROR") || l.contains("+CME ERROR"))
        {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// Whether anything on the other end answers `AT+CGMR`.
pub async fn probe_port<S>(stream: &mut S) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match exchange(stream, "AT+CGMR\r\n", PROBE_TIMEOUT).await {
        Ok(reply) => !reply.trim().is_empty(),
        Err(e) => {
            debug!(error = %e, "probe failed");
            false
        }
    }
}

/// Ask the modem for its model after a reset to known settings.
pub async fn identify<S>(stream: &mut S) -> ModemResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    exchange(stream, RESET, IDENTIFY_TIMEOUT).await?;
    let reply = exchange(stream, "AT+CGMM\r\n", IDENTIFY_TIMEOUT).await?;
    model_from_reply(&reply)
        .ok_or_else(|| ModemError::InvalidData(format!("meaningless AT+CGMM reply {:?}", reply)))
}

/// First line of a `+CGMM` reply that is neither the echo, a final
/// result nor a vendor notification.
fn model_from_reply(reply: &str) -> Option<String> {
    reply
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.starts_with('^') && !l.starts_with('_'))
        .find(|l| !matches!(*l, "" | "OK" | "AT+CGMM"))
        .map(str::to_string)
}

/// Pick the data and control ports among `ports`.
///
/// With `hardcoded` indexes no port is touched. Otherwise every port is
/// probed in order: the first to answer carries data, the next one
/// becomes the control port.
pub async fn probe_ports<F, Fut>(
    ports: &[PathBuf],
    hardcoded: Option<(usize, usize)>,
    mut probe: F,
) -> ModemResult<PortPair>
where
    F: FnMut(&Path) -> Fut,
    Fut: Future<Output = bool>,
{
    if let Some((data, control)) = hardcoded {
        let pick = |index: usize| {
            ports.get(index).cloned().ok_or_else(|| {
                ModemError::InvalidState(format!(
                    "port index {} out of range ({} ports)",
                    index,
                    ports.len()
                ))
            })
        };
        return Ok(PortPair::new(Some(pick(data)?), Some(pick(control)?)));
    }

    let mut pair = PortPair::default();
    for port in ports {
        if !probe(port).await {
            debug!(port = %port.display(), "no answer");
            continue;
        }
        if pair.data.is_none() {
            pair.data = Some(port.clone());
        } else {
            pair.control = Some(port.clone());
            break;
        }
    }
    if pair.data.is_none() {
        warn!(?ports, "no port answered");
        return Err(ModemError::InvalidState("no port answered AT+CGMR".to_string()));
    }
    debug!(%pair, "ports probed");
    Ok(pair)
}
