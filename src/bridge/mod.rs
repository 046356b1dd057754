//! Host bridge: drives a [`Supervisor`] from line-delimited JSON requests
//! and forwards its events to the host.

pub mod protocol;

pub use protocol::{decode_request, ControlError, ControlRequest, ResponseFrame};

use crate::supervisor::{Supervisor, SupervisorEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Why a bridge session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Host requested `unload`; the hook already ran
    Unloaded,
    /// Host requested `uninstall`; the hook already ran
    Uninstalled,
    /// Host closed stdin
    InputClosed,
    /// Shutdown signal received
    Cancelled,
}

impl SessionEnd {
    /// Whether a lifecycle hook already ran for this ending.
    pub fn hook_ran(self) -> bool {
        matches!(self, SessionEnd::Unloaded | SessionEnd::Uninstalled)
    }
}

/// Execute one request against the supervisor.
pub async fn dispatch(
    supervisor: &Supervisor,
    request: ControlRequest,
) -> Result<Value, ControlError> {
    match request {
        ControlRequest::GetSettings => encode(&supervisor.get_settings().await),
        ControlRequest::UpdateSettings(update) => {
            Ok(Value::Bool(supervisor.update_settings(update).await))
        }
        ControlRequest::GetStatus => encode(&supervisor.get_status().await),
        ControlRequest::StartMonitoring => Ok(Value::Bool(supervisor.start_monitoring().await)),
        ControlRequest::StopMonitoring => Ok(Value::Bool(supervisor.stop_monitoring().await)),
        ControlRequest::Unload => {
            supervisor.on_unload().await;
            Ok(Value::Bool(true))
        }
        ControlRequest::Uninstall => {
            supervisor.on_uninstall().await;
            Ok(Value::Bool(true))
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ControlError> {
    serde_json::to_value(value).map_err(|e| ControlError::Encode(e.to_string()))
}

/// Serve requests from `input` and write responses and events to `output`
/// until the host unloads, closes its input, or `cancel` fires.
///
/// Requests are handled one at a time; events raised while a request runs
/// are written once it completes.
pub async fn serve<R, W>(
    supervisor: &Supervisor,
    input: R,
    mut output: W,
    mut events: broadcast::Receiver<SupervisorEvent>,
    cancel: CancellationToken,
) -> std::io::Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut events_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bridge shutting down");
                return Ok(SessionEnd::Cancelled);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Host closed input");
                    return Ok(SessionEnd::InputClosed);
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let (id, request) = decode_request(line);
                let (response, end) = match request {
                    Ok(request) => {
                        tracing::debug!(?request, "Handling request");
                        let end = match request {
                            ControlRequest::Unload => Some(SessionEnd::Unloaded),
                            ControlRequest::Uninstall => Some(SessionEnd::Uninstalled),
                            _ => None,
                        };
                        let response = match dispatch(supervisor, request).await {
                            Ok(result) => ResponseFrame::ok(id, result),
                            Err(e) => ResponseFrame::error(id, &e),
                        };
                        (response, end)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Rejected request");
                        (ResponseFrame::error(id, &e), None)
                    }
                };

                // Events raised by this request go out before its response
                flush_pending(&mut events, &mut output).await?;
                write_frame(&mut output, &response).await?;

                if let Some(end) = end {
                    return Ok(end);
                }
            }
            event = events.recv(), if events_open => match event {
                Ok(event) => write_frame(&mut output, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Host bridge fell behind, events dropped");
                }
                Err(RecvError::Closed) => events_open = false,
            },
        }
    }
}

async fn flush_pending<W: AsyncWrite + Unpin>(
    events: &mut broadcast::Receiver<SupervisorEvent>,
    output: &mut W,
) -> std::io::Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => write_frame(output, &event).await?,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Host bridge fell behind, events dropped");
            }
            Err(_) => return Ok(()),
        }
    }
}

async fn write_frame<W, T>(output: &mut W, frame: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame).map_err(std::io::Error::other)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SupervisorConfig;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn test_supervisor(
        dir: &std::path::Path,
    ) -> (Supervisor, broadcast::Receiver<SupervisorEvent>) {
        let config = SupervisorConfig {
            script_path: dir.join("missing-script"),
            settings_dir: Some(dir.join("settings")),
            ..Default::default()
        };
        let (tx, rx) = broadcast::channel(16);
        (Supervisor::new(config, Arc::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_dispatch_get_settings() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path());

        let value = dispatch(&supervisor, ControlRequest::GetSettings)
            .await
            .unwrap();
        assert_eq!(value["max_latency"], 100);
        assert_eq!(value["ping_host"], "8.8.8.8");
    }

    #[tokio::test]
    async fn test_dispatch_start_without_script_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path());

        let value = dispatch(&supervisor, ControlRequest::StartMonitoring)
            .await
            .unwrap();
        assert_eq!(value, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_serve_round_trip_until_unload() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, rx) = test_supervisor(dir.path());

        let (mut host_in, bridge_in) = duplex(4096);
        let (bridge_out, host_out) = duplex(4096);

        host_in
            .write_all(
                concat!(
                    "{\"id\": 1, \"method\": \"get_status\"}\n",
                    "\n",
                    "{\"id\": 2, \"method\": \"bogus\"}\n",
                    "{\"id\": 3, \"method\": \"update_settings\", \"params\": {\"max_latency\": 150}}\n",
                    "{\"id\": 4, \"method\": \"unload\"}\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let end = serve(
            &supervisor,
            bridge_in,
            bridge_out,
            rx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(end, SessionEnd::Unloaded);
        assert!(end.hook_ran());

        let mut lines = BufReader::new(host_out).lines();
        let mut frames = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            frames.push(serde_json::from_str::<Value>(&line).unwrap());
        }

        let responses: Vec<_> = frames.iter().filter(|f| f.get("id").is_some()).collect();
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["result"]["is_monitoring"], false);
        assert_eq!(responses[1]["error"], "unknown method 'bogus'");
        assert_eq!(responses[2]["result"], true);
        assert_eq!(responses[3]["result"], true);

        // Unload stops monitoring, which is announced to the host
        assert!(frames
            .iter()
            .any(|f| f["event"] == "wifi_status_changed" && f["data"]["monitoring"] == false));

        // Unload persisted the updated settings
        assert_eq!(supervisor.settings_store().load().max_latency, 150);
    }

    #[tokio::test]
    async fn test_serve_ends_when_input_closes() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, rx) = test_supervisor(dir.path());

        let (host_in, bridge_in) = duplex(64);
        let (bridge_out, _host_out) = duplex(4096);
        drop(host_in);

        let end = serve(
            &supervisor,
            bridge_in,
            bridge_out,
            rx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(end, SessionEnd::InputClosed);
        assert!(!end.hook_ran());
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, rx) = test_supervisor(dir.path());

        let (_host_in, bridge_in) = duplex(64);
        let (bridge_out, _host_out) = duplex(4096);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let end = serve(&supervisor, bridge_in, bridge_out, rx, cancel)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
    }
}
