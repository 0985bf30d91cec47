use axum::response::IntoResponse;

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = String)),
    tag = "passage"
)]
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
