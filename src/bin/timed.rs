//! streams a slowly-drifting angle as a binary frame every 100ms -- a
//! periodic telemetry session that pushes data with no inbound message
//! driving it, exercising the write side of the session independent of
//! back-pressure.

use async_trait::async_trait;
use clap::Parser;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use wscore::{Config, Handler, Message, OpCode, Session, SessionHandle};

/// small xorshift PRNG: good enough for a cosmetic random walk, not worth a
/// dependency for.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Rng(seed | 1)
    }

    fn next_unit(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        // map to [-1.0, 1.0]
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

struct TimedHandler;

#[async_trait]
impl Handler for TimedHandler {
    async fn on_open(&mut self, ctx: &SessionHandle) {
        info!("websocket connection open");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut rng = Rng::new(0x9E3779B97F4A7C15 ^ std::process::id() as u64);
            let mut angle: f64 = 0.0;
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if !ctx.is_open() {
                    break;
                }
                angle += rng.next_unit();
                angle = angle.clamp(-20.0, 20.0);
                ctx.write(OpCode::Binary, angle.to_be_bytes().to_vec());
            }
        });
    }

    async fn on_msg(&mut self, ctx: &SessionHandle, _msg: Message) {
        info!("websocket message received");
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
    info!(addr = %config.socket_addr(), "timed server listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        tokio::spawn(async move {
            Session::new(socket, TimedHandler).run().await;
        });
    }
}
