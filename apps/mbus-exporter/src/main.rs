//! M-Bus 电表 Prometheus 导出器：采集循环 + /metrics、/health 端点与请求追踪 ID。

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use mbus_acquire::{SerialRequestCommand, SerialRequestConfig, TelegramSource};
use mbus_config::AppConfig;
use mbus_export::{MeterCollector, encode_families};
use mbus_pipeline::{CollectorTask, LatestWins};
use mbus_telemetry::{init_tracing, new_request_ids};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, info, warn};

#[derive(Clone)]
struct AppState {
    collector: Arc<MeterCollector>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志
    init_tracing();
    // 从 MBUS_EXPORTER_CONFIG 指向的 YAML 文件加载运行配置
    let config = AppConfig::from_env()?;
    info!(
        device = %config.mbus.device,
        meter_id = config.mbus.meter_id,
        baud_rate = config.mbus.baud_rate,
        location = %config.exporter.location,
        "starting mbus exporter"
    );

    // 两条共享队列：电报 latest-wins 信箱 + 活动信号通道
    let telegrams = Arc::new(LatestWins::new());
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 采集循环
    let source: Arc<dyn TelegramSource> = Arc::new(SerialRequestCommand::new(SerialRequestConfig {
        command: config.mbus.command.clone(),
        baud_rate: config.mbus.baud_rate,
        device: config.mbus.device.clone(),
        meter_address: config.mbus.meter_id,
    }));
    let collector_task = CollectorTask::new(source, telegrams.clone(), signal_rx, shutdown_rx);
    tokio::spawn(collector_task.run());

    // 抓取侧收集器
    let collector = Arc::new(MeterCollector::new(
        telegrams,
        signal_tx,
        config.mbus.record_ids.clone(),
        config.mbus.gauges.clone(),
        config.exporter.location.clone(),
    ));
    let state = AppState { collector };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context));

    let addr = listen_addr(&config.exporter.address, config.exporter.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "metrics endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 协作式停机：采集循环睡满当轮延迟后在循环顶部观察到该标志
    let _ = shutdown_tx.send(true);
    info!("shutdown complete");
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    let families = state.collector.collect();
    match encode_families(&families) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            // 抓取端点不对外暴露失败，退化为空指标集
            warn!(error = %err, "metrics_encode_failed");
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], String::new()).into_response()
        }
    }
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutdown signal received");
}

/// 监听地址拼接：IPv6 地址需要方括号。
fn listen_addr(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}
