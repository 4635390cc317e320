use clap::Parser;

/// listen address and optional TLS material for the example binaries built
/// on top of the session engine. the core itself reads none of this -- the
/// acceptor and TLS wrapper are collaborators (1, 6).
#[derive(Debug, Clone, Parser)]
#[command(name = "wscore", about = "server-side websocket session engine demos")]
pub struct Config {
    /// address to bind the listener to
    #[arg(long, env = "WS_ADDR", default_value = "127.0.0.1")]
    pub addr: String,

    /// port to bind the listener to
    #[arg(long, env = "WS_PORT", default_value_t = 4567)]
    pub port: u16,

    /// PEM certificate chain, enables TLS when set alongside --key
    #[arg(long, env = "WS_CERT")]
    pub cert: Option<String>,

    /// PEM private key, enables TLS when set alongside --cert
    #[arg(long, env = "WS_KEY")]
    pub key: Option<String>,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn tls_enabled(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }
}
