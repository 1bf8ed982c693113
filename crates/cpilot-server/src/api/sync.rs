//! Sync endpoints: a streaming trigger and a cancel switch.
//!
//! `POST /sync` responds with newline-delimited progress chunks: `data: {...}`
//! per progress event, then a terminal `result: {...}` on success or
//! `error: {...}` on failure. The sync keeps running server-side if the
//! client drops the stream; only `POST /sync/cancel` stops it.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::middleware::{RequestId, TenantId};
use crate::sync::run_sync;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct CancelResult {
    cancelled: bool,
}

#[derive(Debug, Serialize)]
struct ErrorChunk<'a> {
    code: &'a str,
    message: String,
}

fn chunk(prefix: &str, value: &impl Serialize) -> Bytes {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_owned());
    Bytes::from(format!("{prefix}: {json}\n"))
}

pub(super) async fn start_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Response {
    let Some(cancel) = state.sync_sessions.begin(tenant.0).await else {
        return ApiError::new(
            req_id.0,
            "conflict",
            "a sync is already running for this tenant",
        )
        .into_response();
    };
    let (line_tx, line_rx) = mpsc::channel::<Bytes>(32);

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let pool = state.pool.clone();
        let config = Arc::clone(&state.config);
        let user_id = tenant.0;
        let cancel_flag = Arc::clone(&cancel);

        let run = tokio::spawn(async move {
            run_sync(&pool, &config, user_id, &cancel_flag, &event_tx).await
        });

        while let Some(event) = event_rx.recv().await {
            // A closed receiver means the client dropped the stream; the sync
            // itself carries on.
            let _ = line_tx.send(chunk("data", &event)).await;
        }

        let terminal = match run.await {
            Ok(Ok(summary)) => chunk("result", &summary),
            Ok(Err(e)) => chunk(
                "error",
                &ErrorChunk {
                    code: e.code(),
                    message: e.to_string(),
                },
            ),
            Err(e) => {
                tracing::error!(user_id = tenant.0, error = %e, "sync task panicked");
                chunk(
                    "error",
                    &ErrorChunk {
                        code: "internal_error",
                        message: "sync task failed".to_owned(),
                    },
                )
            }
        };
        let _ = line_tx.send(terminal).await;

        state.sync_sessions.finish(tenant.0).await;
    });

    let body = Body::from_stream(stream::unfold(line_rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, std::convert::Infallible>(line), rx))
    }));

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response()
}

pub(super) async fn cancel_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<CancelResult>>, ApiError> {
    if !state.sync_sessions.cancel(tenant.0).await {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "no sync in progress for this tenant",
        ));
    }

    tracing::info!(user_id = tenant.0, "sync cancellation requested");

    Ok(Json(ApiResponse {
        data: CancelResult { cancelled: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}
