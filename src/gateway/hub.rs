//! AuditHub：WebSocket 接入
//!
//! 接受连接后为每个连接启动独立任务，任务独占一个 Orchestrator，按到达顺序逐帧处理；
//! 另有一个写任务把 mpsc 通道里的出站消息写入 socket。
//! 一个会话的后端调用不会阻塞其他连接。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::message::{InboundMessage, OutboundMessage};
use crate::agent::AuditComponents;

/// Hub 配置
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// WebSocket 监听地址
    pub bind_addr: String,
    /// 接受握手的路径；空或 "/" 表示不限
    pub path: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            path: "/ws/auditor/".to_string(),
        }
    }
}

impl From<&crate::config::GatewaySection> for HubConfig {
    fn from(section: &crate::config::GatewaySection) -> Self {
        Self {
            bind_addr: section.bind_addr.clone(),
            path: section.path.clone(),
        }
    }
}

pub struct AuditHub {
    config: HubConfig,
    components: Arc<AuditComponents>,
    active: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
}

impl AuditHub {
    pub fn new(config: HubConfig, components: Arc<AuditComponents>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            components,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: shutdown_tx,
        }
    }

    /// 绑定并在后台运行接入循环，返回实际监听地址（端口为 0 时由系统分配）
    pub async fn start(&self) -> Result<SocketAddr, String> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .map_err(|e| format!("Invalid bind address: {}", e))?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))?;

        tracing::info!(
            "Aegis auditor listening on ws://{}{} ({})",
            local_addr,
            self.config.path,
            self.components.status_text()
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let components = Arc::clone(&self.components);
        let active = Arc::clone(&self.active);
        let path = self.config.path.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let components = Arc::clone(&components);
                                let active = Arc::clone(&active);
                                let path = path.clone();

                                tokio::spawn(async move {
                                    active.fetch_add(1, Ordering::SeqCst);
                                    if let Err(e) = handle_connection(stream, addr, components, &path).await {
                                        tracing::error!("Connection error from {}: {}", addr, e);
                                    }
                                    active.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                }
            }
            tracing::info!("Accept loop stopped");
        });

        Ok(local_addr)
    }

    /// 停止接入新连接；已建立的连接在客户端断开后结束
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn path_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim_end_matches('/');
    expected.is_empty() || expected == actual.trim_end_matches('/')
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    components: Arc<AuditComponents>,
    path: &str,
) -> Result<(), String> {
    let check_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if path_matches(path, req.uri().path()) {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some(format!("No auditor at {}", req.uri().path())));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .map_err(|e| format!("WebSocket handshake failed: {}", e))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session_id = format!("ws_{}", uuid::Uuid::new_v4());
    let mut orchestrator = components.new_orchestrator(session_id.clone());
    tracing::info!(session = %session_id, "New auditor connection from {}", addr);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let _ = tx.send(OutboundMessage::connection_established(components.status_text()).to_json());

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(session = %session_id, "WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => match InboundMessage::parse(&text) {
                Ok(Some(input)) => {
                    tracing::info!(session = %session_id, "Received: {}", input);
                    let outcome = orchestrator.handle_turn(&input).await;
                    let response =
                        OutboundMessage::audit_response(outcome.message, outcome.continuity_token);
                    if tx.send(response.to_json()).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(session = %session_id, "Empty message ignored");
                }
                Err(e) => {
                    let error = OutboundMessage::error(format!("❌ Error: {}", e));
                    if tx.send(error.to_json()).is_err() {
                        break;
                    }
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!(
        session = %orchestrator.session_id(),
        turns = orchestrator.history().len() / 2,
        "Auditor connection closed: {}",
        addr
    );
    Ok(())
}
