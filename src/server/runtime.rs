// src/server/runtime.rs

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::server::protocol::{FaultCode, Request, Response};
use crate::server::service::JobService;

/// Accept loop with a fixed number of worker slots.
///
/// A slot is taken before `accept` is called, so at most `workers`
/// connections are served at once and further clients wait in the listen
/// backlog. With a single worker, connections are served inline, one after
/// another.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    service: Arc<JobService>,
    workers: usize,
    max_request_bytes: usize,
}

/// Default upper bound on one request line.
const DEFAULT_MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

impl Server {
    pub async fn bind(address: &str, service: Arc<JobService>, workers: usize) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("binding {address}"))?;
        Ok(Self {
            listener,
            service,
            workers: workers.max(1),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        })
    }

    /// Longest request line accepted, newline excluded. Longer lines are
    /// answered with a `transport` fault and skipped.
    pub fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes.max(1);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then wait for in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, workers = self.workers, "request server listening");

        let slots = Arc::new(Semaphore::new(self.workers));
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&slots).acquire_owned() => {
                    permit.context("worker pool closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            let service = Arc::clone(&self.service);
            let limit = self.max_request_bytes;
            if self.workers == 1 {
                serve_connection(stream, peer, service, limit).await;
                drop(permit);
            } else {
                tokio::spawn(async move {
                    serve_connection(stream, peer, service, limit).await;
                    drop(permit);
                });
            }
        }

        info!("shutting down; waiting for in-flight requests");
        let _all = slots
            .acquire_many(self.workers as u32)
            .await
            .context("worker pool closed")?;
        info!("request server stopped");
        Ok(())
    }
}

/// Outcome of reading one request line.
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Read one `\n`-terminated line into `buf` without buffering more than
/// `limit + 1` bytes of it. An over-long line is consumed up to and including
/// its newline, so the next request on the connection stays readable.
async fn read_request_line<R>(reader: &mut R, limit: usize, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(limit as u64 + 1).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(LineRead::Line);
    }
    if buf.len() <= limit {
        // Last line without a trailing newline.
        return Ok(LineRead::Line);
    }

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                break;
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
    Ok(LineRead::TooLong)
}

/// Serve newline-delimited requests until the client hangs up.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, service: Arc<JobService>, limit: usize) {
    debug!(%peer, "connection accepted");
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let response = match read_request_line(&mut reader, limit, &mut buf).await {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::TooLong) => {
                warn!(%peer, limit, "request line too long");
                Response::fault(FaultCode::Transport, format!("request exceeds {limit} bytes"))
            }
            Ok(LineRead::Line) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line,
                    Err(e) => {
                        let fault = Response::fault(FaultCode::Transport, format!("request is not UTF-8: {e}"));
                        if !send_response(&mut writer, peer, &fault).await {
                            break;
                        }
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(line, &service).await
            }
            Err(e) => {
                warn!(%peer, error = %e, "read failed; dropping connection");
                break;
            }
        };

        if !send_response(&mut writer, peer, &response).await {
            break;
        }
    }
    debug!(%peer, "connection closed");
}

/// Write one response line. `false` when the connection is unusable.
async fn send_response<W>(writer: &mut W, peer: SocketAddr, response: &Response) -> bool
where
    W: AsyncWrite + Unpin,
{
    let mut out = match serde_json::to_string(response) {
        Ok(text) => text,
        Err(e) => {
            error!(%peer, error = %e, "could not encode response");
            return false;
        }
    };
    out.push('\n');
    if let Err(e) = writer.write_all(out.as_bytes()).await {
        warn!(%peer, error = %e, "write failed; dropping connection");
        return false;
    }
    true
}

async fn handle_line(line: &str, service: &Arc<JobService>) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response::fault(FaultCode::Transport, format!("malformed request: {e}"));
        }
    };
    debug!(op = request.op(), "request");

    // Store access is blocking file I/O and may wait on an experiment lock.
    let service = Arc::clone(service);
    match tokio::task::spawn_blocking(move || service.dispatch(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "request handler panicked");
            Response::fault(FaultCode::Internal, "request handler failed")
        }
    }
}
