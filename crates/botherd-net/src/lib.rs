// Transport-level networking: reachability probing and the seam to the
// game-protocol client that runs bot sessions.

pub mod client;
pub mod probe;
pub mod tcp_link;

mod error;

pub use client::{
    AuthMode, ConnectOptions, GameClient, Session, SessionCommand, SessionEvent, SessionHandle,
};
pub use error::NetError;
pub use probe::probe;
pub use tcp_link::TcpLinkClient;
