//! WebSocket 网关
//!
//! 每个客户端连接一个读循环任务 + 一个写泵任务；会话编排在该连接的任务里
//! 顺序推进（会话锁只在本轮持有者手里）。客户端断开后在途调用照常完成，
//! 事件发往已关闭通道是 no-op。

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::artifacts::ArtifactBuilder;
use crate::orchestrate::{EventSink, SessionOrchestrator, StreamEvent};

use super::message::ClientMessage;
use super::session::{Session, SessionManager};

/// 网关运行时：全部会话共享的只读组件
pub struct GatewayHub {
    bind_addr: String,
    session_manager: Arc<SessionManager>,
    orchestrator: Arc<SessionOrchestrator>,
    builder: Arc<dyn ArtifactBuilder>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl GatewayHub {
    pub fn new(
        bind_addr: String,
        session_manager: Arc<SessionManager>,
        orchestrator: Arc<SessionOrchestrator>,
        builder: Arc<dyn ArtifactBuilder>,
    ) -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);
        Self {
            bind_addr,
            session_manager,
            orchestrator,
            builder,
            shutdown: shutdown_tx,
        }
    }

    /// 启动网关监听循环
    pub async fn start(&self) -> Result<(), String> {
        let addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|e| format!("Invalid bind address: {}", e))?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;

        tracing::info!("Gateway listening on ws://{}", addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        let session_manager = Arc::clone(&self.session_manager);
        let orchestrator = Arc::clone(&self.orchestrator);
        let builder = Arc::clone(&self.builder);

        tokio::spawn(async move {
            let mut cleanup_timer = tokio::time::interval(tokio::time::Duration::from_secs(60));

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = cleanup_timer.tick() => {
                        let expired = session_manager.cleanup_expired().await;
                        if expired > 0 {
                            tracing::info!("Cleaned up {} expired sessions", expired);
                        }
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let session_manager = Arc::clone(&session_manager);
                                let orchestrator = Arc::clone(&orchestrator);
                                let builder = Arc::clone(&builder);
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(
                                        stream,
                                        addr,
                                        session_manager,
                                        orchestrator,
                                        builder,
                                    )
                                    .await
                                    {
                                        tracing::error!("Connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session_manager: Arc<SessionManager>,
    orchestrator: Arc<SessionOrchestrator>,
    builder: Arc<dyn ArtifactBuilder>,
) -> Result<(), String> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| format!("WebSocket handshake failed: {}", e))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tracing::info!("New WebSocket connection from {}", addr);

    // 写泵：连接断开后 send 失败即退出，未消费事件静默丢弃
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // 事件泵：编排事件序列化后进写泵
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StreamEvent>();
    let tx_for_events = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            if tx_for_events.send(json).is_err() {
                break;
            }
        }
    });
    let events = EventSink::new(event_tx);

    let mut current_session: Option<Arc<Mutex<Session>>> = None;

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        events.emit(StreamEvent::error(format!("Invalid message: {}", e)));
                        continue;
                    }
                };

                match client_msg {
                    ClientMessage::ChatMessage { message, user_id } => {
                        let user = user_id.unwrap_or_else(|| "default".to_string());
                        let (session_id, session) = session_manager.get_or_create(&user).await;
                        if current_session.is_none() {
                            events.emit(StreamEvent::connected(&session_id));
                        }
                        current_session = Some(Arc::clone(&session));

                        let orchestrator = Arc::clone(&orchestrator);
                        let events = events.clone();
                        tokio::spawn(async move {
                            let mut session = session.lock().await;
                            session.touch();
                            let _ = orchestrator
                                .handle_query(&mut session.state, &message, &events)
                                .await;
                        });
                    }

                    ClientMessage::ConfirmPlan {
                        plan,
                        original_query,
                        is_single_widget,
                    } => {
                        let Some(session) = current_session.clone() else {
                            events.emit(StreamEvent::error(
                                "No active session. Send a chat_message first.",
                            ));
                            continue;
                        };
                        let orchestrator = Arc::clone(&orchestrator);
                        let events = events.clone();
                        tokio::spawn(async move {
                            let mut session = session.lock().await;
                            session.touch();
                            let _ = orchestrator
                                .handle_confirmation(
                                    &mut session.state,
                                    plan,
                                    &original_query,
                                    is_single_widget,
                                    &events,
                                )
                                .await;
                        });
                    }

                    ClientMessage::BuildWidget { message } => {
                        let Some(session) = current_session.clone() else {
                            events.emit(StreamEvent::error(
                                "No active session. Send a chat_message first.",
                            ));
                            continue;
                        };
                        let builder = Arc::clone(&builder);
                        let events = events.clone();
                        tokio::spawn(async move {
                            let mut session = session.lock().await;
                            session.touch();
                            let datasets = session.state.datasets.clone();
                            if let Err(e) = builder
                                .build_dashboard(&message, &datasets, true, &events)
                                .await
                            {
                                events.emit(StreamEvent::error(format!(
                                    "Widget generation failed: {}",
                                    e
                                )));
                            }
                            events.emit(StreamEvent::end());
                        });
                    }

                    ClientMessage::Ping { timestamp } => {
                        let pong = serde_json::json!({ "type": "pong", "timestamp": timestamp });
                        let _ = tx.send(pong.to_string());
                    }
                }
            }

            WsMessage::Close(_) => {
                break;
            }

            _ => {}
        }
    }

    tracing::info!("WebSocket connection closed: {}", addr);
    Ok(())
}
