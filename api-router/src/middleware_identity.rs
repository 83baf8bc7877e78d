use axum::{extract::Request, middleware::Next, response::Response};

/// Header set by the upstream authentication layer.
pub const AUTHENTICATED_USER_HEADER: &str = "X-Authenticated-User";

/// Username of the caller, when the request was authenticated upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: Option<String>,
}

pub async fn attach_identity(mut request: Request, next: Next) -> Response {
    let identity = Identity {
        username: extract_username(&request),
    };
    request.extensions_mut().insert(identity);

    next.run(request).await
}

fn extract_username(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHENTICATED_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
}
