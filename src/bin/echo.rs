//! reflects every text/binary frame back to the sender verbatim.

use async_trait::async_trait;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use wscore::{tls, Config, Handler, Message, Session, SessionHandle};

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn on_open(&mut self, _ctx: &SessionHandle) {
        info!("websocket connection open");
    }

    async fn on_msg(&mut self, ctx: &SessionHandle, msg: Message) {
        info!(opcode = ?msg.opcode, len = msg.payload.len(), "message received");
        ctx.write(msg.opcode, msg.payload);
        ctx.read();
    }

    async fn on_close(&mut self, _ctx: &SessionHandle) {
        info!("websocket connection closed");
    }

    async fn on_error(&mut self, _ctx: &SessionHandle) {
        info!("websocket connection error");
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    let listener = TcpListener::bind(config.socket_addr()).await?;
    info!(addr = %config.socket_addr(), "echo server listening");

    let acceptor = if config.tls_enabled() {
        let cert = config.cert.as_deref().unwrap();
        let key = config.key.as_deref().unwrap();
        Some(tls::load_acceptor(cert, key)?)
    } else {
        None
    };

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");

        match acceptor.clone() {
            Some(acceptor) => {
                tokio::spawn(async move {
                    match acceptor.accept(socket).await {
                        Ok(tls_stream) => {
                            Session::new(tls_stream, EchoHandler).run().await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "tls handshake failed");
                        }
                    }
                });
            }
            None => {
                tokio::spawn(async move {
                    Session::new(socket, EchoHandler).run().await;
                });
            }
        }
    }
}
