pub async fn liveness() -> &'static str {
    "ok"
}

pub async fn readiness() -> &'static str {
    "ok"
}
