use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use agora_types::models::User;
use agora_types::AgoraError;
use agora_types::events::GatewayCommand;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::GatewayContext;
use crate::identity::resolve_identity;
use crate::relay::parse_frame;
use crate::session::JoinedSession;

/// Drive one WebSocket from handshake to teardown.
///
/// The token comes from the upgrade request when the client supplied one,
/// otherwise from a first `identify` frame. Token wait plus identity
/// resolution share one deadline; on failure the socket is closed and
/// nothing is registered.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext, upgrade_token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let handshake = tokio::time::timeout(ctx.settings.identity_timeout, async {
        let token = match upgrade_token {
            Some(token) => token,
            None => wait_for_identify(&mut receiver)
                .await
                .ok_or_else(|| AgoraError::Auth("connection closed before identify".into()))?,
        };
        resolve_identity(ctx.identity.as_ref(), &ctx.db, &token).await
    });

    let user: User = match handshake.await {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => {
            warn!("Gateway handshake rejected: {}", e);
            reject(&mut sender).await;
            return;
        }
        Err(_) => {
            warn!(
                "Gateway handshake timed out after {:?}",
                ctx.settings.identity_timeout
            );
            reject(&mut sender).await;
            return;
        }
    };

    let (joined, outbound) = JoinedSession::join(&ctx.dispatcher, &user);

    run_connection_loop(sender, receiver, &ctx, &joined, outbound).await;

    joined.leave();
}

/// Close with a bare policy code. The cause stays in the server log.
async fn reject(sender: &mut SplitSink<WebSocket, Message>) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::default(),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

/// First `identify` frame wins. Anything else sent before it is dropped.
async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match parse_frame(&text) {
                Ok(GatewayCommand::Identify { token }) => return Some(token),
                Ok(other) => debug!("dropping {:?} before identify", other),
                Err(e) => debug!("dropping malformed frame before identify: {}", e),
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: &GatewayContext,
    joined: &JoinedSession,
    mut outbound: tokio::sync::mpsc::UnboundedReceiver<crate::Frame>,
) {
    let session = joined.session().clone();
    let heartbeat_interval = ctx.settings.heartbeat_interval;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let label = session.label().to_string();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{} heartbeat timeout (missed {} pongs), dropping connection", label, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let relay = ctx.relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match parse_frame(&text) {
                    Ok(command) => relay.handle(&session, command).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            session.label(),
                            session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(
        "{} ({}) disconnected from gateway",
        joined.session().label(),
        joined.session().user_id
    );
}
