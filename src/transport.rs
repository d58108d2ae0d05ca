//! Point-to-point neighbor links.
//!
//! Every adjacent pair in the line shares exactly one TCP connection: the
//! left node dials, the right node accepts. The dialer writes a single
//! `Sync` frame right after connecting so the acceptor can tell which
//! neighbor the connection belongs to; after that the connection is a
//! persistent full-duplex link carrying length-prefixed JSON frames for the
//! lifetime of the process. Each half is owned by exactly one task: readers
//! decode frames into the node's main inbox, the node task keeps the write
//! half inside a [`Link`].

use std::{io, net::SocketAddr, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
    time::{sleep, timeout},
};
use tracing::{debug, warn};

use crate::message::{Message, MessageType};

pub const DEFAULT_BASE_PORT: u16 = 8000;

const BIND_ATTEMPTS: usize = 5;
const BIND_DELAY: Duration = Duration::from_millis(500);
const DIAL_ATTEMPTS: usize = 10;
const DIAL_BACKOFF: Duration = Duration::from_millis(100);
const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

// JSON inflates large bodies, so leave generous headroom over any payload a
// sorting round actually produces
const MAX_FRAME_LEN: u64 = 16 << 20;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("dial {addr} after {attempts} attempts: {source}")]
    Dial {
        addr: SocketAddr,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error("encode frame: {0}")]
    Encode(#[source] FrameError),
    #[error("decode frame: {0}")]
    Decode(#[source] FrameError),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("frame length {0} exceeds limit")]
    Oversize(u64),
}

pub fn node_addr(base_port: u16, id: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], base_port + id as u16))
}

/// Binds the node's listening socket, retrying a few times in case a
/// previous run still holds the port.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetError> {
    for _ in 1..BIND_ATTEMPTS {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err) => {
                debug!(%addr, %err, "bind retry");
                sleep(BIND_DELAY).await
            }
        }
    }
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetError::Bind { addr, source })
}

/// Connects to a neighbor with exponential backoff. Neighbor processes start
/// concurrently, so the first attempts routinely race the peer's listener.
pub async fn dial(addr: SocketAddr) -> Result<TcpStream, NetError> {
    let mut backoff = DIAL_BACKOFF;
    let mut last = io::Error::new(io::ErrorKind::TimedOut, "no attempt made");
    for attempt in 1..=DIAL_ATTEMPTS {
        match timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Ok(Err(err)) => last = err,
            Err(_) => last = io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        }
        if attempt != DIAL_ATTEMPTS {
            sleep(backoff).await;
            backoff *= 2;
        }
    }
    Err(NetError::Dial {
        addr,
        attempts: DIAL_ATTEMPTS,
        source: last,
    })
}

/// The write half of a neighbor connection, owned by the node task.
#[derive(Debug)]
pub struct Link {
    peer: usize,
    writer: OwnedWriteHalf,
}

impl Link {
    pub fn new(peer: usize, writer: OwnedWriteHalf) -> Self {
        Self { peer, writer }
    }

    pub fn peer(&self) -> usize {
        self.peer
    }

    /// Writes one frame: u64 length prefix followed by the JSON object.
    /// Algorithm callers ignore the result by contract; a failed send within
    /// a round surfaces as a peer that never delivers, not as local state.
    pub async fn send<T: Serialize>(&mut self, message: &Message<T>) -> Result<(), NetError> {
        let buf = serde_json::to_vec(message).map_err(|err| NetError::Encode(err.into()))?;
        self.writer
            .write_u64(buf.len() as u64)
            .await
            .map_err(|err| NetError::Encode(err.into()))?;
        self.writer
            .write_all(&buf)
            .await
            .map_err(|err| NetError::Encode(err.into()))?;
        self.writer
            .flush()
            .await
            .map_err(|err| NetError::Encode(err.into()))?;
        Ok(())
    }
}

async fn read_frame<T: DeserializeOwned>(
    stream: &mut OwnedReadHalf,
) -> Result<Option<Message<T>>, NetError> {
    let len = match stream.read_u64().await {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(NetError::Decode(err.into())),
    };
    if len > MAX_FRAME_LEN {
        return Err(NetError::Decode(FrameError::Oversize(len)));
    }
    let mut buf = vec![0; len as usize];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|err| NetError::Decode(err.into()))?;
    let message = serde_json::from_slice(&buf).map_err(|err| NetError::Decode(err.into()))?;
    Ok(Some(message))
}

/// Decodes frames into the main inbox until EOF, a malformed frame, or the
/// node going away. Reader tasks end quietly; links are never re-established.
pub async fn read_frames<T: DeserializeOwned>(
    mut stream: OwnedReadHalf,
    inbox: mpsc::Sender<Message<T>>,
) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(message)) => {
                if inbox.send(message).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "reader exit");
                break;
            }
        }
    }
}

/// Accepts neighbor connections for the lifetime of the node. Each accepted
/// connection must open with a `Sync` frame naming the dialer; the write
/// half goes to the setup coordinator through `links`, the read half keeps
/// feeding the main inbox from the same task.
pub async fn accept_loop<T>(
    listener: TcpListener,
    inbox: mpsc::Sender<Message<T>>,
    links: mpsc::Sender<Link>,
) where
    T: DeserializeOwned + Send + 'static,
{
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "accept");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        let inbox = inbox.clone();
        let links = links.clone();
        tokio::spawn(async move {
            let (mut read, write) = stream.into_split();
            let hello = match read_frame::<T>(&mut read).await {
                Ok(Some(hello)) if hello.kind == MessageType::Sync => hello,
                Ok(_) => {
                    warn!(%remote, "connection did not open with a sync frame");
                    return;
                }
                Err(err) => {
                    debug!(%remote, %err, "handshake");
                    return;
                }
            };
            if links.send(Link::new(hello.sender_id, write)).await.is_err() {
                return;
            }
            read_frames(read, inbox).await
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn persistent_link_keeps_frame_order() {
        let addr = node_addr(18110, 1);
        let listener = bind(addr).await.unwrap();
        let (inbox_tx, mut inbox_rx) = mpsc::channel(600);
        let (links_tx, mut links_rx) = mpsc::channel(2);
        tokio::spawn(accept_loop::<u64>(listener, inbox_tx, links_tx));

        let stream = dial(addr).await.unwrap();
        let (_read, write) = stream.into_split();
        let mut link = Link::new(1, write);
        link.send(&Message::<u64>::sync(0, 1)).await.unwrap();
        let accepted = timeout(Duration::from_secs(5), links_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.peer(), 0);

        for round in 0..500u32 {
            link.send(&Message::data(round, 0, 1, u64::from(round)))
                .await
                .unwrap();
        }
        for round in 0..500u32 {
            let received = timeout(Duration::from_secs(5), inbox_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.round, round);
            assert_eq!(received.body, u64::from(round));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dial_outlasts_a_late_listener() {
        let addr = node_addr(18120, 0);
        let dialer = tokio::spawn(dial(addr));
        sleep(Duration::from_secs(1)).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        let accepted = tokio::spawn(async move { listener.accept().await });

        let stream = timeout(Duration::from_secs(10), dialer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        accepted.await.unwrap().unwrap();
        drop(stream);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn handshake_names_the_dialer() {
        let addr = node_addr(18130, 3);
        let listener = bind(addr).await.unwrap();
        let (inbox_tx, _inbox_rx) = mpsc::channel::<Message<u64>>(16);
        let (links_tx, mut links_rx) = mpsc::channel(2);
        tokio::spawn(accept_loop(listener, inbox_tx, links_tx));

        let stream = dial(addr).await.unwrap();
        let (_read, write) = stream.into_split();
        let mut link = Link::new(3, write);
        link.send(&Message::<u64>::sync(2, 3)).await.unwrap();

        let accepted = timeout(Duration::from_secs(5), links_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.peer(), 2);
    }
}
