pub mod config;

pub mod app {
    use std::sync::Arc;

    use agora_api::AppStateInner;
    use agora_db::Database;
    use agora_gateway::{GatewayContext, GatewaySettings, IdentityVerifier, connection};
    use axum::{
        Router,
        body::Body,
        extract::{Query, State, WebSocketUpgrade},
        http::Request,
        response::IntoResponse,
        routing::get,
    };
    use axum_extra::TypedHeader;
    use axum_extra::headers::{Authorization, authorization::Bearer};
    use serde::Deserialize;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    pub fn gateway_context(
        db: Database,
        identity: Arc<dyn IdentityVerifier>,
        settings: GatewaySettings,
    ) -> GatewayContext {
        GatewayContext::new(Arc::new(db), identity, settings)
    }

    /// `/api/*` plus the `/gateway` WebSocket endpoint.
    pub fn router(ctx: GatewayContext) -> Router {
        let api = agora_api::router(AppStateInner::from_gateway(&ctx));

        let ws_route = Router::new()
            .route("/gateway", get(ws_upgrade))
            .with_state(ctx);

        Router::new()
            .merge(api)
            .merge(ws_route)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
    }

    /// Request span without the query string, which may carry a gateway token.
    pub(crate) fn request_span(req: &Request<Body>) -> tracing::Span {
        tracing::debug_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            version = ?req.version(),
        )
    }

    #[derive(Debug, Deserialize)]
    struct GatewayQuery {
        token: Option<String>,
    }

    /// The token may ride on the upgrade (`?token=` or bearer header); without
    /// it the client must send `identify` as its first frame. Prefer the
    /// header: query strings end up in proxy and browser logs.
    async fn ws_upgrade(
        State(ctx): State<GatewayContext>,
        Query(query): Query<GatewayQuery>,
        bearer: Option<TypedHeader<Authorization<Bearer>>>,
        ws: WebSocketUpgrade,
    ) -> impl IntoResponse {
        let token = query
            .token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| bearer.map(|TypedHeader(auth)| auth.token().to_string()));

        ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx, token))
    }

    #[cfg(test)]
    mod tests {
        use std::io;
        use std::sync::{Arc, Mutex};

        use super::*;

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        #[test]
        fn request_span_omits_query_string() {
            let captured = Captured::default();
            let writer = captured.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();

            let req = Request::builder()
                .uri("/gateway?token=eyJhbGciOiJIUzI1NiJ9.secret.sig")
                .body(Body::empty())
                .unwrap();

            tracing::subscriber::with_default(subscriber, || {
                let span = request_span(&req);
                let _entered = span.enter();
                tracing::debug!("started processing request");
            });

            let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
            assert!(output.contains("path=/gateway"), "{}", output);
            assert!(!output.contains("token"), "{}", output);
            assert!(!output.contains("secret.sig"), "{}", output);
        }
    }
}
