use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

static INGEST_AUTH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "streaming_service_ingest_auth_total",
            "RTMP publish admissions handled by the ingest gate",
        ),
        &["result"],
    )
    .expect("failed to create streaming_service_ingest_auth_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register streaming_service_ingest_auth_total");
    counter
});

static VIEWER_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "streaming_service_viewer_events_total",
            "Viewer join/leave events against live streams",
        ),
        &["event"],
    )
    .expect("failed to create streaming_service_viewer_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register streaming_service_viewer_events_total");
    counter
});

pub fn observe_ingest_auth(admitted: bool) {
    let result = if admitted { "admitted" } else { "rejected" };
    INGEST_AUTH_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_viewer_event(event: &str) {
    VIEWER_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
