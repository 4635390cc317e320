use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::WsError;
use crate::frame::{self, Message, OpCode, ReadOutcome};
use crate::handshake::{self, Headers};

/// lifecycle states from 3: connecting -> open -> closing -> closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// the capability set a session delivers events through (6): open, message,
/// close, error. Implemented by the application.
#[async_trait]
pub trait Handler: Send {
    async fn on_open(&mut self, _ctx: &SessionHandle) {}
    async fn on_msg(&mut self, ctx: &SessionHandle, msg: Message);
    async fn on_close(&mut self, _ctx: &SessionHandle) {}
    async fn on_error(&mut self, _ctx: &SessionHandle) {}
}

struct WriteCmd {
    opcode: OpCode,
    payload: Vec<u8>,
    done: Option<oneshot::Sender<()>>,
}

enum ControlCmd {
    Read,
    Close,
}

/// a cheaply cloneable handle to a running session: the surface the
/// application (including other tasks, e.g. a chat room broadcasting to a
/// participant) uses to call `write`/`read`/`close`/`get_headers` (6).
#[derive(Clone)]
pub struct SessionHandle {
    write_tx: mpsc::UnboundedSender<WriteCmd>,
    control_tx: mpsc::UnboundedSender<ControlCmd>,
    headers: Arc<OnceLock<Headers>>,
}

impl SessionHandle {
    /// enqueues an outbound frame; returns immediately. ordering across calls
    /// on the same handle is preserved on the wire (5).
    pub fn write(&self, opcode: OpCode, payload: Vec<u8>) {
        let _ = self.write_tx.send(WriteCmd { opcode, payload, done: None });
    }

    /// like `write`, but resolves once the transport has acknowledged the
    /// frame -- the optional completion callback from 4.4.
    pub fn write_notify(&self, opcode: OpCode, payload: Vec<u8>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.write_tx.send(WriteCmd { opcode, payload, done: Some(tx) });
        rx
    }

    /// schedules the next inbound frame read. precondition: state is `open`;
    /// a call while closing/closed is a harmless no-op.
    pub fn read(&self) {
        let _ = self.control_tx.send(ControlCmd::Read);
    }

    /// initiates the closing handshake.
    pub fn close(&self) {
        let _ = self.control_tx.send(ControlCmd::Close);
    }

    /// the parsed request headers; empty until `on_open` has fired.
    pub fn get_headers(&self) -> Headers {
        self.headers.get().cloned().unwrap_or_default()
    }

    /// false once the owning session's task has exited -- lets a detached
    /// task (e.g. a periodic writer spawned from `on_open`) notice it should
    /// stop instead of writing into a dead handle forever.
    pub fn is_open(&self) -> bool {
        !self.write_tx.is_closed()
    }
}

/// one accepted connection: owns the transport, the handler, and the
/// lifecycle state machine described in 3 and 4.5.
pub struct Session<S, H> {
    stream: BufReader<S>,
    handler: H,
    state: State,
    headers: Arc<OnceLock<Headers>>,
    handle: SessionHandle,
    write_rx: mpsc::UnboundedReceiver<WriteCmd>,
    control_rx: mpsc::UnboundedReceiver<ControlCmd>,
}

impl<S, H> Session<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    pub fn new(stream: S, handler: H) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let headers = Arc::new(OnceLock::new());
        let handle = SessionHandle {
            write_tx,
            control_tx,
            headers: headers.clone(),
        };
        Session {
            stream: BufReader::new(stream),
            handler,
            state: State::Connecting,
            headers,
            handle,
            write_rx,
            control_rx,
        }
    }

    /// a handle that can be cloned out before `run` is called and handed to
    /// other collaborators (e.g. a chat room) ahead of time.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// drives the session to completion: handshake, then the frame loop from
    /// 4.5, until the session reaches `closed`.
    pub async fn run(mut self) {
        match handshake::perform(&mut self.stream).await {
            Ok(headers) => {
                let _ = self.headers.set(headers);
                self.state = State::Open;
            }
            Err(e) => {
                warn!(error = %e, "handshake failed, dropping connection");
                return;
            }
        }

        self.handler.on_open(&self.handle).await;

        let mut reading = true;
        let mut closing_initiated_by_us = false;

        loop {
            if self.state == State::Closed {
                break;
            }

            tokio::select! {
                result = frame::read_frame(&mut self.stream), if reading => {
                    match result {
                        Err(WsError::TransportRead(e)) => {
                            debug!(error = %e, "transport read failed, closing session");
                            self.state = State::Closed;
                            self.handler.on_error(&self.handle).await;
                            break;
                        }
                        Err(e) => {
                            // handshake/frame errors (malformed frame, unsupported
                            // opcode) terminate silently: no handler callback (7).
                            warn!(error = %e, "frame error, dropping session");
                            self.state = State::Closed;
                            break;
                        }
                        Ok(ReadOutcome::Dropped) => {
                            reading = false;
                        }
                        Ok(ReadOutcome::Frame(msg)) => {
                            match msg.opcode {
                                OpCode::Text | OpCode::Binary => {
                                    reading = false;
                                    self.handler.on_msg(&self.handle, msg).await;
                                }
                                OpCode::Ping => {
                                    if frame::write_frame(&mut self.stream, OpCode::Pong, &msg.payload).await.is_err() {
                                        self.state = State::Closed;
                                        break;
                                    }
                                    reading = true;
                                }
                                OpCode::Close => match self.state {
                                    State::Open => {
                                        closing_initiated_by_us = false;
                                        self.state = State::Closing;
                                        if frame::write_frame(&mut self.stream, OpCode::Close, &[]).await.is_err() {
                                            self.state = State::Closed;
                                            break;
                                        }
                                        self.state = State::Closed;
                                        self.handler.on_close(&self.handle).await;
                                        break;
                                    }
                                    State::Closing if closing_initiated_by_us => {
                                        self.state = State::Closed;
                                        self.handler.on_close(&self.handle).await;
                                        break;
                                    }
                                    _ => {
                                        reading = false;
                                    }
                                },
                                OpCode::Continuation | OpCode::Pong => {
                                    reading = false;
                                }
                            }
                        }
                    }
                }
                Some(cmd) = self.write_rx.recv() => {
                    let WriteCmd { opcode, payload, done } = cmd;
                    let result = frame::write_frame(&mut self.stream, opcode, &payload).await;
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    if result.is_err() {
                        debug!("write failed, closing session silently");
                        self.state = State::Closed;
                        break;
                    }
                }
                Some(cmd) = self.control_rx.recv() => {
                    match cmd {
                        ControlCmd::Read => {
                            reading = true;
                        }
                        ControlCmd::Close => {
                            if self.state == State::Open {
                                closing_initiated_by_us = true;
                                self.state = State::Closing;
                                if frame::write_frame(&mut self.stream, OpCode::Close, &[]).await.is_err() {
                                    self.state = State::Closed;
                                    break;
                                }
                                reading = true;
                            }
                        }
                    }
                }
            }
        }
    }
}
