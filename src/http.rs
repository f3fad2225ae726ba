//! Messages travel as JSON in `POST /rpc` requests. The same server answers `GET /status` with
//! this node's view of the cluster.

use super::node::{GetStatus, Node, NodeStatus};
use super::rpc::Message;
use super::transport::{Inbox, Transport, TransportError};
use super::Timestamp;
use actix::Addr;
use actix_web::middleware::Logger;
use actix_web::web::{Data, Json};
use actix_web::{get, post, HttpServer, Responder};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` covers the whole request, connecting included
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: &str, message: Message) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&message)?;
        let url = format!("{}/rpc", target.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        let code = resp.status();
        if !code.is_success() {
            return Err(TransportError::Rejected {
                target: target.to_string(),
                status: code.as_u16(),
            });
        }
        Ok(())
    }
}

/// Shared by every server worker
pub struct App {
    pub inbox: Inbox<HttpTransport>,
    pub node: Addr<Node<HttpTransport>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcReply {
    pub status: String,
    /// clock value of the receive event
    pub ts: Timestamp,
}

#[post("/rpc")]
pub async fn rpc(app: Data<App>, req: Json<Message>) -> actix_web::Result<impl Responder> {
    let ts = app.inbox.deliver(req.into_inner());
    Ok(Json(RpcReply {
        status: "ok".to_string(),
        ts,
    }))
}

#[get("/status")]
pub async fn get_status(app: Data<App>) -> actix_web::Result<impl Responder> {
    let node_status: NodeStatus = app
        .node
        .send(GetStatus)
        .await
        .map_err(actix_web::error::ErrorServiceUnavailable)?;
    Ok(Json(node_status))
}

pub fn server(
    app: Data<App>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        actix_web::App::new()
            .wrap(Logger::default())
            .app_data(app.clone())
            .service(rpc)
            .service(get_status)
    })
    .workers(2)
    .bind((host, port))?;
    Ok(server.run())
}
