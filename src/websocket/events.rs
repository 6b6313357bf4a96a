use crate::error::AppError;
use crate::models::User;
use crate::utils::jwt::decode_jwt;
use crate::websocket::hub::BroadcastHub;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use uuid::Uuid;

/// A committed report change, as pushed to the report's organization.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    pub kind: &'static str,
    pub report_id: Uuid,
    pub actor_id: Uuid,
    pub version: i32,
    pub summary: Vec<&'static str>,
}

impl ReportEvent {
    pub fn created(report_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            kind: "report.created",
            report_id,
            actor_id,
            version: 1,
            summary: vec!["created"],
        }
    }

    pub fn updated(
        report_id: Uuid,
        actor_id: Uuid,
        version: i32,
        summary: Vec<&'static str>,
    ) -> Self {
        Self {
            kind: "report.updated",
            report_id,
            actor_id,
            version,
            summary,
        }
    }

    pub fn deleted(report_id: Uuid, actor_id: Uuid, version: i32) -> Self {
        Self {
            kind: "report.deleted",
            report_id,
            actor_id,
            version,
            summary: vec!["deleted"],
        }
    }

    pub fn payload(&self) -> String {
        serde_json::json!({
            "type": self.kind,
            "data": {
                "report_id": self.report_id,
                "actor_id": self.actor_id,
                "version": self.version,
                "summary": self.summary,
            }
        })
        .to_string()
    }
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Realtime feed. Auth is handled here via query token (browsers cannot set
/// headers on ws requests); the connection joins its user's organization
/// stream.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
) -> Result<impl IntoResponse, AppError> {
    let claims = decode_jwt(&query.token).map_err(|_| AppError::Unauthorized)?;
    let user_id: Uuid = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    let user = User::find_by_id(user_id)
        .one(&db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user.organization_id, hub)))
}

async fn handle_socket(socket: WebSocket, organization_id: Uuid, hub: BroadcastHub) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (conn_id, mut rx) = hub.subscribe(organization_id);

    tracing::info!("WebSocket connected for organization {}", organization_id);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.unsubscribe(organization_id, conn_id);
    tracing::info!("WebSocket disconnected for organization {}", organization_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_change_envelope() {
        let report_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();
        let event = ReportEvent::updated(report_id, actor_id, 3, vec!["data", "state"]);
        let value: serde_json::Value = serde_json::from_str(&event.payload()).unwrap();
        assert_eq!(value["type"], "report.updated");
        assert_eq!(value["data"]["version"], 3);
        assert_eq!(value["data"]["summary"][1], "state");
        assert_eq!(value["data"]["report_id"], report_id.to_string());
    }

    #[test]
    fn created_event_is_version_one() {
        let event = ReportEvent::created(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(event.version, 1);
        assert_eq!(event.kind, "report.created");
    }
}
