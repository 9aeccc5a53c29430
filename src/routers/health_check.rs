pub(crate) async fn health_check() -> &'static str {
    "OK"
}
