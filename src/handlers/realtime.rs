// src/handlers/realtime.rs

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{
    config::AppState,
    middleware::auth::AuthenticatedTenant,
    services::notifier::{RealtimeEvent, RealtimeHub},
};

/// Canal em tempo real do painel. Cada conexão só recebe eventos do próprio tenant.
pub async fn realtime_ws(
    State(app_state): State<AppState>,
    AuthenticatedTenant(claims): AuthenticatedTenant,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = app_state.realtime_hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, claims.tenant_id, claims.sub))
}

async fn handle_socket(socket: WebSocket, hub: RealtimeHub, tenant_id: Uuid, user_id: Uuid) {
    let mut events = hub.subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    tracing::info!(%tenant_id, %user_id, clients = hub.connected_clients(), "🔌 Painel conectado");

    let welcome = RealtimeEvent::new(tenant_id, "connection", json!({ "status": "connected", "user_id": user_id }));
    if send_event(&mut ws_sender, &welcome).await.is_err() {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.tenant_id == tenant_id => {
                    if send_event(&mut ws_sender, &event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%tenant_id, skipped, "Painel lento, eventos descartados");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // O cliente não manda nada útil; só esperamos o fechamento
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(%tenant_id, %user_id, "Painel desconectado");
}

async fn send_event<S>(sender: &mut S, event: &RealtimeEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let Ok(payload) = serde_json::to_string(event) else {
        return Err(());
    };
    sender.send(Message::Text(payload.into())).await.map_err(|_| ())
}
