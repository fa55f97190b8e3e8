//! HTTP API of a coordination server.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/members` | List cluster members |
//! | `DELETE` | `/members/{name}` | Remove a member by name |
//! | `GET` | `/leader` | Name and address of the current leader |
//!
//! The same routes are served under `/api/v1`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task;

use coordinator::{ConsensusStore, MembershipError, MembershipManager, Peer, Server};


/// Bound of every store request issued while serving an HTTP request.
pub const STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type AppState<S> = Arc<Server<S>>;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    #[serde(rename = "client-urls")]
    pub client_urls: Vec<String>,
    #[serde(rename = "peer-urls")]
    pub peer_urls: Vec<String>,
}

impl From<Peer> for MemberInfo {
    fn from(peer: Peer) -> Self {
        MemberInfo {
            name: peer.name,
            client_urls: peer.client_urls,
            peer_urls: peer.peer_urls,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberList {
    pub members: Vec<MemberInfo>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LeaderInfo {
    pub name: String,
    pub addr: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Creates the router of `server`, with its state attached.
pub fn router<S: ConsensusStore>(server: AppState<S>) -> Router {
    let routes = Router::new()
        .route("/members", get(list_members::<S>))
        .route("/members/{name}", delete(remove_member::<S>))
        .route("/leader", get(get_leader::<S>));

    routes
        .clone()
        .nest("/api/v1", routes)
        .with_state(server)
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

fn membership<S: ConsensusStore>(server: &Server<S>) -> MembershipManager<S> {
    MembershipManager::new(server.store().clone(), STORE_REQUEST_TIMEOUT)
}

/// `GET /members`: members in store order.
async fn list_members<S: ConsensusStore>(State(server): State<AppState<S>>) -> Response {
    let manager = membership(&server);

    match task::spawn_blocking(move || manager.list()).await {
        Ok(Ok(peers)) => {
            let members = peers.into_iter().map(MemberInfo::from).collect();
            (StatusCode::OK, Json(MemberList { members })).into_response()
        }
        Ok(Err(err)) => {
            warn!("Cannot list members: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// `DELETE /members/{name}`
async fn remove_member<S: ConsensusStore>(
    State(server): State<AppState<S>>,
    Path(name): Path<String>,
) -> Response {
    let manager = membership(&server);
    let member_name = name.clone();

    match task::spawn_blocking(move || manager.remove_by_name(&member_name)).await {
        Ok(Ok(_)) => (StatusCode::OK, Json(format!("removed, member: {}", name))).into_response(),
        Ok(Err(err @ MembershipError::NotFound(_))) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        Ok(Err(err)) => {
            warn!("Cannot remove member {}: {}", name, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// `GET /leader`: resolved from the store on every request.
async fn get_leader<S: ConsensusStore>(State(server): State<AppState<S>>) -> Response {
    match task::spawn_blocking(move || server.leader_with_timeout(STORE_REQUEST_TIMEOUT)).await {
        Ok(Ok(Some(claim))) => (
            StatusCode::OK,
            Json(LeaderInfo {
                name: claim.name,
                addr: claim.addr,
            }),
        )
            .into_response(),
        Ok(Ok(None)) => error_response(StatusCode::NOT_FOUND, "no leader"),
        Ok(Err(err)) => {
            warn!("Cannot resolve the leader: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
