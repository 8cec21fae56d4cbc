use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use omws::server::{JobService, Request, Response, Server};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Minimal line-protocol client.
pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.context("connect")?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        self.send(request).await?;
        self.recv().await
    }

    /// Send one raw line and read one response.
    pub async fn send_raw(&mut self, line: &str) -> Result<Response> {
        self.write_line(line).await?;
        self.recv().await
    }

    /// Send a request without waiting for its response.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let line = serde_json::to_string(request)?;
        self.write_line(&line).await
    }

    /// Read the next response. Cancel safe.
    pub async fn recv(&mut self) -> Result<Response> {
        let reply = self
            .lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("server closed the connection"))?;
        Ok(serde_json::from_str(&reply)?)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }
}

/// A server running on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<omws::errors::Result<()>>,
}

impl RunningServer {
    pub async fn start(service: JobService, workers: usize) -> Result<Self> {
        let server = Server::bind("127.0.0.1:0", Arc::new(service), workers).await?;
        Self::spawn(server)
    }

    /// Like [`RunningServer::start`] with a request line limit.
    pub async fn start_with_limit(service: JobService, workers: usize, max_request_bytes: usize) -> Result<Self> {
        let server = Server::bind("127.0.0.1:0", Arc::new(service), workers)
            .await?
            .with_max_request_bytes(max_request_bytes);
        Self::spawn(server)
    }

    fn spawn(server: Server) -> Result<Self> {
        let addr = server.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        Ok(Self {
            addr,
            shutdown: Some(tx),
            handle,
        })
    }

    /// Stop accepting and wait for in-flight requests.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await??;
        Ok(())
    }
}
