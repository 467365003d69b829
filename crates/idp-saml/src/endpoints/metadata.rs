//! IdP metadata endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::state::{PrincipalResolver, SamlState, SessionStore};

/// GET handler for the IdP metadata document.
pub async fn idp_metadata<S: SessionStore, P: PrincipalResolver>(
    State(state): State<SamlState<S, P>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        state.idp.metadata_xml(),
    )
}
