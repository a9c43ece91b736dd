//! DNS listener.
//!
//! Decodes incoming messages, hands their questions to the resolution
//! engine and encodes the answers back. Serves either UDP or TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::cache::AnswerCache;
use crate::config::Protocol;
use crate::dns::Upstream;
use crate::engine::ResolutionEngine;
use crate::error::Result;
use crate::network::VantageLocator;

/// Maximum EDNS UDP message size we accept.
const MAX_UDP_SIZE: usize = 4096;

/// UDP reply size a client without EDNS accepts.
const MIN_UDP_SIZE: usize = 512;

/// Idle timeout for TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns DNS messages into replies using the resolution engine.
pub struct QueryHandler<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    engine: ResolutionEngine<L, C, U>,
}

impl<L, C, U> QueryHandler<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    pub const fn new(engine: ResolutionEngine<L, C, U>) -> Self {
        Self { engine }
    }

    /// Handle a DNS message and return the reply.
    ///
    /// Questions that fail to resolve contribute no answers and turn the
    /// reply into a SERVFAIL; answers of the other questions are kept.
    #[instrument(skip(self, query), fields(id = query.id()))]
    pub async fn handle_query(&self, query: Message) -> Message {
        let mut response = reply_to(&query);

        if query.op_code() != OpCode::Query {
            debug!("Unsupported opcode {:?}", query.op_code());
            response.set_response_code(ResponseCode::NotImp);
            return response;
        }

        if query.queries().is_empty() {
            warn!("Query has no questions");
            return response;
        }

        let resolution = self.engine.resolve_all(query.queries()).await;
        if resolution.is_degraded() {
            response.set_response_code(ResponseCode::ServFail);
        }
        for answer in &resolution.answers {
            response.add_answer(answer.to_record());
        }

        response
    }

    /// Decode, handle and encode a raw DNS message.
    pub async fn handle_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let query = Message::from_vec(payload)?;
        let response = self.handle_query(query).await;
        Ok(response.to_vec()?)
    }

    /// Like [`Self::handle_bytes`], but keeps the reply within the client's
    /// UDP payload size. Oversized replies drop their answers and set TC.
    pub async fn handle_datagram(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let query = Message::from_vec(payload)?;
        let limit = udp_payload_limit(&query);
        let mut response = self.handle_query(query).await;

        let bytes = response.to_vec()?;
        if bytes.len() <= limit {
            return Ok(bytes);
        }

        debug!(size = bytes.len(), limit, "Truncating UDP response");
        response.take_answers();
        response.set_truncated(true);
        Ok(response.to_vec()?)
    }
}

impl<L, C, U> Clone for QueryHandler<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

/// Start a reply mirroring the query header and questions.
fn reply_to(query: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    response.add_queries(query.queries().iter().cloned());
    response
}

fn udp_payload_limit(query: &Message) -> usize {
    query
        .extensions()
        .as_ref()
        .map_or(MIN_UDP_SIZE, |edns| usize::from(edns.max_payload()))
        .clamp(MIN_UDP_SIZE, MAX_UDP_SIZE)
}

/// Bind the configured transport and serve until the task is dropped.
pub async fn run_server<L, C, U>(
    handler: QueryHandler<L, C, U>,
    addr: SocketAddr,
    protocol: Protocol,
) -> Result<()>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    info!("Server listening at port {} with protocol {}", addr.port(), protocol);

    match protocol {
        Protocol::Udp => serve_udp(handler, UdpSocket::bind(addr).await?).await,
        Protocol::Tcp => serve_tcp(handler, TcpListener::bind(addr).await?).await,
    }
}

/// Serve DNS over UDP, one task per datagram.
pub async fn serve_udp<L, C, U>(handler: QueryHandler<L, C, U>, socket: UdpSocket) -> Result<()>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_UDP_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP errors from earlier replies surface here on some platforms
                warn!("UDP receive error: {}", e);
                continue;
            }
        };

        let payload = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let handler = handler.clone();

        tokio::spawn(async move {
            let response = match handler.handle_datagram(&payload).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Failed to handle query from {}: {}", peer, e);
                    return;
                }
            };

            if let Err(e) = socket.send_to(&response, peer).await {
                warn!("Failed to send response to {}: {}", peer, e);
            }
        });
    }
}

/// Serve DNS over TCP, one task per connection.
pub async fn serve_tcp<L, C, U>(handler: QueryHandler<L, C, U>, listener: TcpListener) -> Result<()>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_tcp_connection(&handler, stream).await {
                debug!("TCP connection from {} closed: {}", peer, e);
            }
        });
    }
}

/// Handle length-prefixed messages on one connection until it closes.
async fn handle_tcp_connection<L, C, U>(
    handler: &QueryHandler<L, C, U>,
    mut stream: TcpStream,
) -> Result<()>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    loop {
        let len = match timeout(TCP_TIMEOUT, stream.read_u16()).await {
            Ok(Ok(len)) => usize::from(len),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(()),
        };

        let mut payload = vec![0u8; len];
        timeout(TCP_TIMEOUT, stream.read_exact(&mut payload))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;

        let response = handler.handle_bytes(&payload).await?;
        let response_len = u16::try_from(response.len())
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidData))?;

        stream.write_u16(response_len).await?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }
}
