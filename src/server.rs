// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The connection dispatcher.
//!
//! Each accepted connection gets its own task.  The task reads one
//! request, validates it, and either answers with an error straight
//! away or submits a render job and waits.  Frames coming back from
//! the render engine are routed through the [`ConnectionRegistry`] to
//! the task waiting for them; the first frame to arrive is the one that
//! gets written, after which the connection is closed.

use std::collections::HashMap;
use std::future::{self, Future};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use http::StatusCode;

use crate::config::{ReadLimits, ServerConfig};
use crate::engine::{ConnectionId, Frame, Job, RenderEngine, RenderParameters};
use crate::error::Result;
use crate::request::{self, HttpRequest};
use crate::response;
use crate::validation::{self, Rejection};

/// Connections that are still waiting for a frame.  An entry is
/// removed exactly once: when its frame is handed over, when its
/// request is rejected, or when the client goes away.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<ConnectionId, oneshot::Sender<Frame>>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ConnectionRegistry::default()
    }

    fn waiting(&self) -> MutexGuard<HashMap<ConnectionId, oneshot::Sender<Frame>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection.  The receiver yields the first frame rendered
    /// for it.
    pub fn register(&self) -> (ConnectionId, oneshot::Receiver<Frame>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.waiting().insert(id, tx);
        (id, rx)
    }

    /// Hand `frame` to the connection it belongs to and deregister that
    /// connection.  Returns false, dropping the frame, if the connection
    /// is no longer registered or has stopped listening.
    pub fn deliver(&self, frame: Frame) -> bool {
        let id = frame.connection;
        let waiting = self.waiting().remove(&id);
        match waiting {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Deregister a connection without delivering anything.  Returns
    /// false if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.waiting().remove(&id).is_some()
    }

    /// True if `id` is still waiting for a frame.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.waiting().contains_key(&id)
    }

    /// Number of connections waiting.
    pub fn len(&self) -> usize {
        self.waiting().len()
    }

    /// True when nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting().is_empty()
    }
}

/// Parse and validate a buffered request.  Anything that goes wrong
/// unexpectedly along the way is reported as an internal error rather
/// than unwinding into the dispatcher.
pub fn accept_request(buffered: &[u8], config: &ServerConfig) -> std::result::Result<RenderParameters, StatusCode> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> std::result::Result<_, Rejection> {
        let text = String::from_utf8_lossy(buffered);
        let request = HttpRequest::parse(&text)
            .into_complete()
            .ok_or(Rejection::Malformed)?;
        validation::validate(&request, config.address)
    }));
    match outcome {
        Ok(Ok(params)) => Ok(params),
        Ok(Err(rejection)) => {
            warn!(status = rejection.status().as_u16(), %rejection, "request rejected");
            Err(rejection.status())
        }
        Err(_) => {
            error!("request handling panicked");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Read until the end of the header section, the peer closes, the
/// size limit is reached, or the client goes quiet.
pub async fn read_request(stream: &mut TcpStream, limits: &ReadLimits) -> std::io::Result<Vec<u8>> {
    let mut buffered = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut wait = limits.first_byte_timeout;
    loop {
        match timeout(wait, stream.read(&mut chunk)).await {
            Err(_) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                buffered.extend_from_slice(&chunk[..n]);
                if request::is_complete(&buffered) || buffered.len() >= limits.max_request_bytes {
                    break;
                }
                wait = limits.idle_timeout;
            }
            Ok(Err(err)) => return Err(err),
        }
    }
    Ok(buffered)
}

/// Resolves once reading reports the connection broken, discarding
/// anything else the peer sends.  A peer that merely shuts down its
/// sending half can still be answered, so end of input only stops the
/// watch.
async fn connection_lost(stream: &mut TcpStream) {
    let mut scratch = [0u8; 512];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) => return future::pending().await,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

struct Dispatcher {
    config: ServerConfig,
    engine: RenderEngine,
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) {
        let (id, reply) = self.registry.register();
        debug!(connection = id.0, %peer, "connection accepted");

        let buffered = match read_request(&mut stream, &self.config.read).await {
            Ok(buffered) => buffered,
            Err(err) => {
                warn!(connection = id.0, %err, "reading request failed");
                self.registry.remove(id);
                return;
            }
        };

        let params = match accept_request(&buffered, &self.config) {
            Ok(params) => params,
            Err(status) => return self.reject(id, stream, status).await,
        };

        let job = Job {
            connection: id,
            params,
        };
        if let Err(err) = self.engine.submit(job) {
            error!(connection = id.0, %err, "could not submit job");
            return self
                .reject(id, stream, StatusCode::INTERNAL_SERVER_ERROR)
                .await;
        }

        let frame = tokio::select! {
            frame = reply => frame.ok(),
            _ = connection_lost(&mut stream) => None,
        };
        let frame = match frame {
            Some(frame) => frame,
            None => {
                self.registry.remove(id);
                debug!(connection = id.0, "client left before a frame arrived");
                return;
            }
        };

        match response::success_response(&frame) {
            Ok(message) => {
                write_and_close(&mut stream, &message, id).await;
                info!(connection = id.0, pass = frame.pass, bytes = message.len(), "frame delivered");
            }
            Err(err) => {
                error!(connection = id.0, %err, "could not encode frame");
                let message = response::error_response(StatusCode::INTERNAL_SERVER_ERROR);
                write_and_close(&mut stream, &message, id).await;
            }
        }
    }

    async fn reject(&self, id: ConnectionId, mut stream: TcpStream, status: StatusCode) {
        self.registry.remove(id);
        let message = response::error_response(status);
        write_and_close(&mut stream, &message, id).await;
    }
}

async fn write_and_close(stream: &mut TcpStream, message: &[u8], id: ConnectionId) {
    let written = async {
        stream.write_all(message).await?;
        stream.flush().await?;
        stream.shutdown().await
    };
    if let Err(err) = written.await {
        warn!(connection = id.0, %err, "writing response failed");
    }
}

/// A bound, not yet running, render server.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl Server {
    /// Bind the listening socket and create an idle render engine.
    pub async fn bind(config: ServerConfig) -> Result<Server> {
        let listener = TcpListener::bind(config.socket_addr()).await?;
        let (tx, frames) = mpsc::unbounded_channel();
        let engine = RenderEngine::new(config.passes, move |frame| {
            // The receiver only goes away when the server stops.
            let _ = tx.send(frame);
        });
        Ok(Server {
            listener,
            dispatcher: Arc::new(Dispatcher {
                config,
                engine,
                registry: Arc::new(ConnectionRegistry::new()),
            }),
            frames,
        })
    }

    /// The address actually bound, with the real port if zero was
    /// configured.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The registry of connections awaiting a frame.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.dispatcher.registry)
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(future::pending()).await
    }

    /// Serve until `shutdown` resolves, then stop the render engine.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            dispatcher,
            mut frames,
        } = self;

        let registry = Arc::clone(&dispatcher.registry);
        let delivery = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let (id, pass) = (frame.connection, frame.pass);
                if !registry.deliver(frame) {
                    debug!(connection = id.0, pass, "frame dropped, connection gone");
                }
            }
        });

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move { dispatcher.handle(stream, peer).await });
                    }
                    Err(err) => {
                        // Running out of descriptors and similar are
                        // transient; keep accepting.
                        warn!(%err, "accept failed");
                    }
                },
                _ = &mut shutdown => break Ok(()),
            }
        };

        info!("shutting down");
        let engine_owner = Arc::clone(&dispatcher);
        if let Err(err) = tokio::task::spawn_blocking(move || engine_owner.engine.shutdown()).await {
            warn!(%err, "render engine shutdown failed");
        }
        delivery.abort();
        result
    }
}
