use tracing::trace;

// Counters are emitted as trace events on `quotation.metrics`.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "quotation.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "quotation.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn image_embedded(profile: &'static str) {
    trace!(
        target = "quotation.metrics",
        profile = profile,
        "images_embedded_inc"
    );
}

pub fn image_absent(profile: &'static str, cause: &'static str) {
    trace!(
        target = "quotation.metrics",
        profile = profile,
        cause = cause,
        "images_absent_inc"
    );
}
