use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::store::DEFAULT_HISTORY_LIMIT;

/// Server settings, read from flags or the environment.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "CHAT_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, short, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// How many messages and users the HTTP API keeps
    #[arg(long, env = "CHAT_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// How many events a websocket may fall behind before it starts missing some
    #[arg(
        long,
        env = "CHAT_BROADCAST_CAPACITY",
        default_value_t = 64,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub broadcast_capacity: u32,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
