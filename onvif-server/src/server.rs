//! Per-camera HTTP listener
//!
//! Serves the Device and Media SOAP endpoints and the placeholder snapshot on
//! the camera's own address and server port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{connect_info::ConnectInfo, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::CameraContext;
use crate::operations;
use crate::templates;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";
/// Open keep-alive connections are not waited on longer than this at stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct ServerState {
    ctx: CameraContext,
    placeholder: Bytes,
}

pub fn router(ctx: CameraContext, placeholder: Bytes) -> Router {
    let state = Arc::new(ServerState { ctx, placeholder });
    Router::new()
        .route("/onvif/device_service", post(handle_soap))
        .route("/onvif/media_service", post(handle_soap))
        .route("/snapshot.png", get(handle_placeholder))
        .with_state(state)
}

/// Both endpoints dispatch every operation; clients differ in which one they use.
async fn handle_soap(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
    body: String,
) -> Response {
    let camera_id = state.ctx.config.id;
    tracing::debug!(
        camera_id,
        "ONVIF {} from {}",
        operations::extract_soap_action(&body),
        addr
    );

    match operations::dispatch(&state.ctx, &body) {
        Ok(xml) => (StatusCode::OK, [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)], xml).into_response(),
        Err(fault) => {
            tracing::warn!(camera_id, "Fault for {}: {}", addr, fault);
            (
                fault.code.http_status(),
                [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)],
                templates::fault(&fault),
            )
                .into_response()
        }
    }
}

async fn handle_placeholder(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], state.placeholder.clone())
}

/// Running ONVIF listener for one camera
pub struct CameraServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CameraServer {
    /// Bind `ctx.ip:ctx.config.server_port` and start serving.
    pub async fn bind(ctx: CameraContext, placeholder: Bytes) -> std::io::Result<Self> {
        let addr = SocketAddr::from((ctx.ip, ctx.config.server_port));
        let listener = TcpListener::bind(addr).await?;
        Self::serve(listener, ctx, placeholder)
    }

    /// Serve on an already bound listener.
    pub fn serve(listener: TcpListener, ctx: CameraContext, placeholder: Bytes) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let camera_id = ctx.config.id;
        let app = router(ctx, placeholder);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(camera_id, "ONVIF server error: {}", e);
            }
        });

        tracing::info!(camera_id, "ONVIF server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, release the port.
    pub async fn stop(self) {
        self.cancel.cancel();
        let abort = self.task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("ONVIF server task failed: {}", e),
            Err(_) => {
                tracing::warn!("ONVIF server did not drain in time, aborting");
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::sample_context;
    use crate::PLACEHOLDER_PNG;

    async fn start() -> CameraServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        CameraServer::serve(listener, sample_context(), Bytes::from_static(PLACEHOLDER_PNG)).unwrap()
    }

    fn soap(body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl"><s:Body>{}</s:Body></s:Envelope>"#,
            body
        )
    }

    #[tokio::test]
    async fn test_both_endpoints_dispatch() {
        let server = start().await;
        let http = reqwest::Client::new();
        for path in ["/onvif/device_service", "/onvif/media_service"] {
            let resp = http
                .post(format!("http://{}{}", server.local_addr(), path))
                .body(soap("<trt:GetProfiles/>"))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
            assert!(resp.text().await.unwrap().contains("main_stream"));
        }
        server.stop().await;
    }

    #[tokio::test]
    async fn test_fault_status_codes() {
        let server = start().await;
        let http = reqwest::Client::new();
        let url = format!("http://{}/onvif/media_service", server.local_addr());

        let resp = http.post(&url).body(soap("<trt:SetOSD/>")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.text().await.unwrap().contains("ter:ActionNotSupported"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_auth_required_returns_401() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut ctx = sample_context();
        ctx.credentials = Some(ws_security::Credentials::new("admin", "secret"));
        let server = CameraServer::serve(listener, ctx, Bytes::from_static(PLACEHOLDER_PNG)).unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{}/onvif/device_service", server.local_addr()))
            .body(soap("<trt:GetStreamUri><trt:ProfileToken>main_stream</trt:ProfileToken></trt:GetStreamUri>"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert!(resp.text().await.unwrap().contains("ter:NotAuthorized"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_placeholder_served() {
        let server = start().await;
        let resp = reqwest::get(format!("http://{}/snapshot.png", server.local_addr()))
            .await
            .unwrap();
        assert_eq!(resp.headers()["content-type"], "image/png");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), PLACEHOLDER_PNG);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_port() {
        let server = start().await;
        let addr = server.local_addr();
        server.stop().await;
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }
}
