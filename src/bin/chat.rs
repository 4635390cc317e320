//! broadcasts every text message to all participants, including the sender,
//! and replays the last 100 messages to newly joined participants -- the
//! chat room collaborator from the original design (8, scenario 4). The
//! room holds participants by owned handle, not by raw pointer.

use async_trait::async_trait;
use clap::Parser;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;
use wscore::{Config, Handler, Message, OpCode, Session, SessionHandle};

const MAX_RECENT_MESSAGES: usize = 100;

struct ChatRoom {
    participants: Mutex<HashMap<u64, SessionHandle>>,
    recent: Mutex<VecDeque<Vec<u8>>>,
}

impl ChatRoom {
    fn new() -> Self {
        ChatRoom {
            participants: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    async fn join(&self, id: u64, handle: SessionHandle) {
        let recent = self.recent.lock().await;
        for msg in recent.iter() {
            handle.write(OpCode::Text, msg.clone());
        }
        drop(recent);
        self.participants.lock().await.insert(id, handle);
    }

    async fn leave(&self, id: u64) {
        self.participants.lock().await.remove(&id);
    }

    async fn deliver(&self, payload: Vec<u8>) {
        let mut recent = self.recent.lock().await;
        recent.push_back(payload.clone());
        while recent.len() > MAX_RECENT_MESSAGES {
            recent.pop_front();
        }
        drop(recent);

        for participant in self.participants.lock().await.values() {
            participant.write(OpCode::Text, payload.clone());
        }
    }
}

struct ChatHandler {
    id: u64,
    room: Arc<ChatRoom>,
}

#[async_trait]
impl Handler for ChatHandler {
    async fn on_open(&mut self, ctx: &SessionHandle) {
        info!(id = self.id, "on_open");
        self.room.join(self.id, ctx.clone()).await;
    }

    async fn on_msg(&mut self, ctx: &SessionHandle, msg: Message) {
        if msg.opcode == OpCode::Text {
            self.room.deliver(msg.payload).await;
        }
        ctx.read();
    }

    async fn on_close(&mut self, _ctx: &SessionHandle) {
        info!(id = self.id, "on_close");
        self.room.leave(self.id).await;
    }

    async fn on_error(&mut self, _ctx: &SessionHandle) {
        info!(id = self.id, "on_error");
        self.room.leave(self.id).await;
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    let listener = TcpListener::bind(config.socket_addr()).await?;
    info!(addr = %config.socket_addr(), "chat server listening");

    let room = Arc::new(ChatRoom::new());
    let next_id = AtomicU64::new(1);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let room = room.clone();
        let id = next_id.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            Session::new(socket, ChatHandler { id, room }).run().await;
        });
    }
}
