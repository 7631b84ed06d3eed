use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, StatusCode};
use pingora_core::upstreams::peer::HttpPeer;
use pingora_error::{Error, ErrorType::InternalError, Result};
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};

use crate::config::Config;
use crate::proxy::classify::Classifier;
use crate::proxy::pool::BackendPool;
use crate::proxy::resolver::AffinityResolver;
use crate::proxy::table::RoutingTable;
use crate::proxy::{AffinityError, ProxyContext};

const MISSING_REFERER_BODY: &str = "Error:\nPlease enable referer in your browser!\n";

/// Proxy service.
///
/// Resolves the owning backend for every request and hands it to pingora
/// for forwarding; the request itself passes through untouched.
pub struct HttpService {
    resolver: Arc<AffinityResolver>,
}

#[async_trait]
impl ProxyHttp for HttpService {
    type CTX = ProxyContext;

    /// Creates a new context for each request
    fn new_ctx(&self) -> Self::CTX {
        Self::CTX::default()
    }

    /// Resolves the backend for the request, answering affinity-dependent
    /// requests without a referer directly with a 400.
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let resolved = {
            let req = session.req_header();
            let referer = req
                .headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok());
            self.resolver.resolve(req.uri.path(), referer)
        };

        match resolved {
            Ok(backend) => {
                ctx.backend = Some(backend);
                Ok(false)
            }
            Err(AffinityError::MissingReferer) => {
                let mut resp = ResponseHeader::build(StatusCode::BAD_REQUEST, None)?;
                resp.insert_header(header::CONTENT_TYPE, "text/plain")?;
                resp.insert_header(
                    header::CONTENT_LENGTH,
                    MISSING_REFERER_BODY.len().to_string(),
                )?;
                session.write_response_header(Box::new(resp), false).await?;
                session
                    .write_response_body(Some(Bytes::from_static(MISSING_REFERER_BODY.as_bytes())), true)
                    .await?;
                Ok(true)
            }
            Err(e) => Error::e_explain(InternalError, format!("Routing failed: {e}")),
        }
    }

    /// Hands the resolved backend to pingora as the upstream peer.
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let backend = ctx
            .backend
            .as_ref()
            .ok_or_else(|| Error::new_str("No backend resolved for request"))?;
        Ok(Box::new(HttpPeer::new(
            backend.addr(),
            false,
            backend.host.clone(),
        )))
    }

    async fn logging(&self, session: &mut Session, e: Option<&Error>, ctx: &mut Self::CTX) {
        let req = session.req_header();
        let status = session
            .response_written()
            .map_or(0, |resp| resp.status.as_u16());
        let backend = ctx
            .backend
            .as_ref()
            .map_or_else(|| "-".to_string(), |b| b.addr());

        if let Some(e) = e {
            log::warn!(
                "{} {} -> {} status={} elapsed={}ms error={}",
                req.method,
                req.uri.path(),
                backend,
                status,
                ctx.request_start.elapsed().as_millis(),
                e
            );
        } else {
            log::info!(
                "{} {} -> {} status={} elapsed={}ms",
                req.method,
                req.uri.path(),
                backend,
                status,
                ctx.request_start.elapsed().as_millis()
            );
        }
    }
}

/// Initializes the proxy service from the given configuration.
///
/// Fails fast on an empty backend pool or an unparsable routing-table file.
pub fn build_http_service(config: &Config) -> std::result::Result<HttpService, AffinityError> {
    let pool = BackendPool::new(config.backends.clone())?;
    let table = RoutingTable::load(&config.routing_table)?;
    log::info!(
        "Affinity router ready: {} backends, {} persisted sessions",
        pool.len(),
        table.len()
    );

    let resolver = AffinityResolver::new(pool, table, Classifier::from(config.affinity.clone()));
    Ok(HttpService {
        resolver: Arc::new(resolver),
    })
}
