//! Hub：WebSocket 接入层
//!
//! 每个连接对应一个会话。第一帧完成握手（user id 取自帧内，缺省 anonymous），
//! 之后的 text 帧交给编排器；连接断开时关闭会话。后台定时清理空闲会话。

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::message::{InboundMessage, OutboundEvent};
use super::orchestrator::Orchestrator;
use crate::config::AppSection;
use crate::core::RelayError;

/// Hub 配置
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// WebSocket 监听地址
    pub bind_addr: String,
    /// 会话空闲超时；None 表示不回收
    pub session_idle_timeout: Option<Duration>,
    /// 清理周期
    pub cleanup_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            session_idle_timeout: Some(Duration::from_secs(3600)),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl HubConfig {
    pub fn from_app(app: &AppSection) -> Self {
        Self {
            bind_addr: app.bind_addr.clone(),
            session_idle_timeout: (app.session_idle_timeout_secs > 0)
                .then(|| Duration::from_secs(app.session_idle_timeout_secs)),
            ..Self::default()
        }
    }
}

pub struct Hub {
    config: HubConfig,
    orchestrator: Orchestrator,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    pub fn new(config: HubConfig, orchestrator: Orchestrator) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            orchestrator,
            shutdown,
        }
    }

    /// 绑定并开始接受连接，返回实际监听地址（端口 0 时由系统分配）
    pub async fn start(&self) -> std::io::Result<SocketAddr> {
        let addr: SocketAddr = self.config.bind_addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid bind address {}: {e}", self.config.bind_addr),
            )
        })?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Gateway listening on ws://{}", local_addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        let orchestrator = self.orchestrator.clone();
        let idle_timeout = self.config.session_idle_timeout;
        let mut cleanup_timer = tokio::time::interval(self.config.cleanup_interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = cleanup_timer.tick() => {
                        if let Some(timeout) = idle_timeout {
                            orchestrator.registry().evict_idle(timeout).await;
                        }
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let orchestrator = orchestrator.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, addr, orchestrator).await {
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
            tracing::info!("Gateway stopped accepting connections");
        });

        Ok(local_addr)
    }

    /// 停止接受新连接（已有连接照常运行到断开）
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn session_count(&self) -> usize {
        self.orchestrator.registry().count().await
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    orchestrator: Orchestrator,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();

    let session_id = format!("session_{}", uuid::Uuid::new_v4());
    let mut handshaken = false;
    tracing::info!(session_id = %session_id, "New WebSocket connection from {}", addr);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(event.to_json())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                let frame: InboundMessage = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        let _ = tx.send(OutboundEvent::error(format!("Invalid message: {e}")));
                        continue;
                    }
                };

                if !handshaken {
                    let user_id = frame.user_id().unwrap_or("anonymous");
                    orchestrator
                        .create_session(&session_id, user_id, tx.clone())
                        .await;
                    handshaken = true;
                }

                match &frame {
                    InboundMessage::Ping { timestamp } => {
                        let _ = tx.send(OutboundEvent::Pong {
                            timestamp: *timestamp,
                        });
                    }
                    InboundMessage::Unsupported => {
                        let _ = tx.send(OutboundEvent::error("Unsupported message type"));
                    }
                    InboundMessage::Text { .. } | InboundMessage::System { .. } => {
                        if let Some(text) = frame.text() {
                            dispatch(&orchestrator, &session_id, text, &tx).await;
                        }
                    }
                }
            }
            WsMessage::Binary(_) => {
                let _ = tx.send(OutboundEvent::error("Binary frames are not supported"));
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    orchestrator.close_session(&session_id).await;
    drop(tx);
    let _ = writer.await;
    tracing::info!(session_id = %session_id, "WebSocket connection closed: {}", addr);
    Ok(())
}

async fn dispatch(
    orchestrator: &Orchestrator,
    session_id: &str,
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundEvent>,
) {
    match orchestrator.on_user_message(session_id, text).await {
        Ok(disposition) => {
            tracing::debug!(session_id = %session_id, ?disposition, "Message accepted");
        }
        Err(RelayError::SessionNotFound(_)) => {
            let _ = tx.send(OutboundEvent::error(
                "Session expired, please reconnect to start a new one",
            ));
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Message rejected");
            let _ = tx.send(OutboundEvent::error(e.to_string()));
        }
    }
}
