use crate::auth::{ Identity, TokenSigner };
use crate::cli::Args;
use crate::fanout::ChannelHub;
use crate::models::websocket::{ ClientMessage, ServerFrame, EVENT_PONG };

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use url::form_urlencoded;

use log::{ info, warn, error, debug };
use futures::{ Sink, SinkExt, StreamExt };

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const CONNECTIONS_PER_SECOND: NonZeroU32 = NonZeroU32::MIN.saturating_add(9);

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(CONNECTIONS_PER_SECOND));
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;

    Ok(Arc::new(config))
}

pub async fn start_ws_server(
    addr: &str,
    hub: Arc<ChannelHub>,
    signer: Arc<TokenSigner>,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };

    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    serve(listener, tls_acceptor, hub, signer).await
}

/// Accept loop. Each connection is handshaken and served on its own task.
pub async fn serve(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    hub: Arc<ChannelHub>,
    signer: Arc<TokenSigner>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        debug!("Incoming connection from: {}", peer);
        let hub = Arc::clone(&hub);
        let signer = Arc::clone(&signer);
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        debug!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, hub, signer).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, hub, signer).await
            };

            if let Err(e) = process_result {
                warn!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

fn reject(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

/// Token from the `Authorization: Bearer` header, falling back to `?token=`.
fn handshake_token(req: &Request) -> Option<String> {
    let header = req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());
    if let Ok(token) = TokenSigner::bearer(header) {
        return Some(token.to_string());
    }

    let qs = req.uri().query().unwrap_or("");
    form_urlencoded
        ::parse(qs.as_bytes())
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    hub: Arc<ChannelHub>,
    signer: Arc<TokenSigner>,
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let mut identity: Option<Identity> = None;

    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let Some(token) = handshake_token(req) else {
            warn!("{}: missing auth token", peer);
            return Err(reject("No auth token"));
        };
        match signer.verify(&token, Utc::now()) {
            Ok(id) => {
                identity = Some(id);
                Ok(response)
            }
            Err(e) => {
                warn!("{}: {}", peer, e);
                Err(reject("Invalid auth token"))
            }
        }
    };

    let ws = accept_hdr_async(stream, auth_callback).await?;
    match identity {
        Some(identity) => {
            handle_connection(peer, ws, hub, identity).await;
            Ok(())
        }
        None => Err("handshake completed without identity".into()),
    }
}

async fn send_frame<T>(tx: &mut T, frame: &ServerFrame) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    let json = serde_json::to_string(frame)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    hub: Arc<ChannelHub>,
    identity: Identity,
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let mut subscription = hub.subscribe(&identity.employee_id);
    info!("Socket connected {} role: {} ({})", subscription.channel(), identity.role, peer);

    let (mut tx, mut rx) = websocket.split();

    loop {
        tokio::select! {
            outbound = subscription.receiver.recv() => {
                let Some(frame) = outbound else { break };
                if let Err(e) = send_frame(&mut tx, &frame).await {
                    error!("Error pushing {} to {}: {}", frame.event, peer, e);
                    break;
                }
            }
            inbound = rx.next() => {
                let message = match inbound {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        match e {
                            | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                            | tokio_tungstenite::tungstenite::Error::Protocol(_)
                            | tokio_tungstenite::tungstenite::Error::Utf8 => {
                                info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                            }
                            tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                                io_err.kind() == std::io::ErrorKind::ConnectionReset
                            => {
                                info!("WebSocket connection reset by peer {}", peer);
                            }
                            tokio_tungstenite::tungstenite::Error::Capacity(ref cap_err) => {
                                error!("WebSocket capacity error for {}: {}", peer, cap_err);
                                let _ = send_frame(&mut tx, &ServerFrame::error("Server capacity error")).await;
                            }
                            _ => {
                                error!("Error receiving message from {}: {}", peer, e);
                            }
                        }
                        break;
                    }
                    None => break,
                };

                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let _ = send_frame(&mut tx, &ServerFrame::error("Message too large")).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => ServerFrame::new(
                                EVENT_PONG,
                                serde_json::json!({ "timestamp": Utc::now().timestamp() })
                            ),
                            Err(e) => {
                                debug!("Unrecognised frame from {}: {}", peer, e);
                                ServerFrame::error(&format!("Failed to parse message: {}", e))
                            }
                        };
                        if let Err(e) = send_frame(&mut tx, &reply).await {
                            error!("Error replying to {}: {}", peer, e);
                            break;
                        }
                    }
                    Message::Close(_) => {
                        debug!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
        }
    }

    info!("Socket disconnected {}", subscription.channel());
}
