//! Stdio MCP server.
//!
//! Messages are newline-delimited JSON-RPC 2.0. Requests other than
//! `tools/call` are answered inline; tool calls run as spawned tasks so a
//! slow registry never blocks `ping` or cancellation. All responses funnel
//! through one writer task, which keeps lines whole on the output stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{
    negotiate_version, CallToolParams, CallToolResult, CancelledParams, ErrorObject,
    Implementation, Incoming, InitializeParams, InitializeResult, ListToolsResult, RequestId,
    Response, ServerCapabilities, JSONRPC_VERSION,
};
use crate::tools::{Tool, Toolbox};

/// Programmatic server name.
pub const SERVER_NAME: &str = "oci-mcp";

/// Display name.
pub const SERVER_TITLE: &str = "ORAS";

/// Queued responses awaiting the writer.
const OUTBOX_CAPACITY: usize = 100;

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// MCP server dispatching to a [`Toolbox`].
#[derive(Debug, Clone)]
pub struct Server {
    toolbox: Arc<Toolbox>,
    info: Implementation,
}

impl Server {
    /// Creates a server for the given tools.
    #[must_use]
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox: Arc::new(toolbox),
            info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some(SERVER_TITLE.to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Overrides the version reported by `initialize`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    /// Serves one session until the input ends or `shutdown` is cancelled.
    ///
    /// In-flight tool calls are cancelled on shutdown, and the call returns
    /// once every queued response has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the input or writing a response fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W, shutdown: CancellationToken) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let writer = tokio::spawn(write_loop(writer, rx));

        let session = shutdown.child_token();
        let in_flight: InFlight = Arc::default();
        let mut lines = BufReader::new(reader).lines();

        info!(tools = self.toolbox.len(), "MCP server started");
        let read_result = loop {
            let line = tokio::select! {
                biased;
                () = session.cancelled() => break Ok(()),
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => self.handle_line(&line, &outbox, &session, &in_flight).await,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        session.cancel();
        drop(outbox);
        let write_result = match writer.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Writer task failed");
                Ok(())
            }
        };
        info!("MCP server stopped");

        read_result?;
        write_result
    }

    async fn handle_line(
        &self,
        line: &str,
        outbox: &mpsc::Sender<Response>,
        session: &CancellationToken,
        in_flight: &InFlight,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                send(outbox, Response::error(None, ErrorObject::parse_error(e))).await;
                return;
            }
        };
        if value.is_array() {
            let error = ErrorObject::invalid_request("batch messages are not supported");
            send(outbox, Response::error(None, error)).await;
            return;
        }

        let message: Incoming = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                send(outbox, Response::error(None, ErrorObject::invalid_request(e))).await;
                return;
            }
        };
        if message.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            let error = ErrorObject::invalid_request("jsonrpc must be \"2.0\"");
            send(outbox, Response::error(message.id, error)).await;
            return;
        }

        match (message.id, message.method) {
            (Some(id), Some(method)) => {
                self.handle_request(id, &method, message.params, outbox, session, in_flight)
                    .await;
            }
            (None, Some(method)) => handle_notification(&method, message.params, in_flight),
            (id, None) => debug!(id = ?id, "Ignoring message without method"),
        }
    }

    async fn handle_request(
        &self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
        outbox: &mpsc::Sender<Response>,
        session: &CancellationToken,
        in_flight: &InFlight,
    ) {
        debug!(id = %id, method, "Request");
        let response = match method {
            "initialize" => self.initialize(id, params),
            "ping" => Response::result(id, Value::Object(serde_json::Map::new())),
            "tools/list" => self.list_tools(id),
            "tools/call" => match decode_params::<CallToolParams>(params) {
                Ok(call) => {
                    if let Some(tool) = self.toolbox.get(&call.name) {
                        spawn_call(id, tool, call, outbox.clone(), session, in_flight);
                        return;
                    }
                    let error = ErrorObject::invalid_params(format!("unknown tool {:?}", call.name));
                    Response::error(Some(id), error)
                }
                Err(error) => Response::error(Some(id), error),
            },
            _ => Response::error(Some(id), ErrorObject::method_not_found(method)),
        };
        send(outbox, response).await;
    }

    fn initialize(&self, id: RequestId, params: Option<Value>) -> Response {
        let params = match decode_params::<InitializeParams>(params) {
            Ok(params) => params,
            Err(error) => return Response::error(Some(id), error),
        };
        let version = negotiate_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            info!(client = %client.name, client_version = %client.version, protocol = version, "Client connected");
        }

        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: self.info.clone(),
        };
        encode_result(id, &result)
    }

    fn list_tools(&self, id: RequestId) -> Response {
        let result = ListToolsResult {
            tools: self.toolbox.definitions(),
        };
        encode_result(id, &result)
    }
}

fn spawn_call(
    id: RequestId,
    tool: Arc<dyn Tool>,
    call: CallToolParams,
    outbox: mpsc::Sender<Response>,
    session: &CancellationToken,
    in_flight: &InFlight,
) {
    let cancel = session.child_token();
    in_flight.lock().insert(id.clone(), cancel.clone());
    let in_flight = Arc::clone(in_flight);

    tokio::spawn(async move {
        let args = call.arguments.unwrap_or(Value::Null);
        let outcome = tool.call(args, cancel.clone()).await;
        in_flight.lock().remove(&id);

        if cancel.is_cancelled() {
            debug!(id = %id, tool = %call.name, "Tool call cancelled, dropping response");
            return;
        }

        let result = match outcome {
            Ok(value) => CallToolResult::success(value)
                .unwrap_or_else(|e| CallToolResult::error(e.to_string())),
            Err(e) => {
                warn!(id = %id, tool = %call.name, error = %e, "Tool call failed");
                CallToolResult::error(e.to_string())
            }
        };
        send(&outbox, encode_result(id, &result)).await;
    });
}

fn handle_notification(method: &str, params: Option<Value>, in_flight: &InFlight) {
    match method {
        "notifications/initialized" => debug!("Client initialized"),
        "notifications/cancelled" => match decode_params::<CancelledParams>(params) {
            Ok(cancelled) => {
                if let Some(token) = in_flight.lock().remove(&cancelled.request_id) {
                    info!(id = %cancelled.request_id, reason = ?cancelled.reason, "Cancelling request");
                    token.cancel();
                }
            }
            Err(error) => debug!(error = %error.message, "Ignoring malformed cancellation"),
        },
        _ => debug!(method, "Ignoring notification"),
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, ErrorObject> {
    let params = match params {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(params).map_err(ErrorObject::invalid_params)
}

fn encode_result<T: serde::Serialize>(id: RequestId, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Response::result(id, value),
        Err(e) => Response::error(Some(id), ErrorObject::internal(e)),
    }
}

async fn send(outbox: &mpsc::Sender<Response>, response: Response) {
    if outbox.send(response).await.is_err() {
        debug!("Output closed, dropping response");
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Response>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Serves the tools over the process's stdin and stdout.
///
/// # Errors
///
/// Returns an error if stdin or stdout fail.
pub async fn serve_stdio(server: &Server, shutdown: CancellationToken) -> Result<()> {
    server
        .serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
        .await
}
