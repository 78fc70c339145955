//! Request handler that answers A/AAAA queries for libvirt guests.
//!
//! The handler is one stage of a hickory request pipeline. For every query it
//! either answers authoritatively from the libvirt state directory, delegates
//! the untouched request to the next stage, or fails with SERVFAIL:
//!
//! ```text
//! class != IN ──────────────────────────────▶ next stage
//! type not A/AAAA ──────────────────────────▶ next stage
//! read state dir ── error / deadline ───────▶ SERVFAIL
//!       │
//!       └─ no addresses at all ─────────────▶ next stage
//!       │
//! subnet rules ─▶ family projection ─▶ authoritative answer (may be empty)
//!                                          └─ write fails ─▶ SERVFAIL
//! ```

use async_trait::async_trait;
use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::{DNSClass, Name};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::iter;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::answer::{AddressFamily, ResolvedAnswer};
use crate::config::DnsConfig;
use crate::error::GuestDnsError;
use crate::filter;
use crate::metrics::{self, QueryResult, Timer};
use crate::resolver;
use crate::state;

/// Answers libvirt guest names and passes everything else to `next`.
pub struct GuestHandler<N> {
    config: Arc<DnsConfig>,
    trim_suffix: Option<String>,
    shutdown: CancellationToken,
    next: N,
}

impl<N: RequestHandler> GuestHandler<N> {
    /// Create a handler in front of `next`.
    pub fn new(config: DnsConfig, next: N) -> Self {
        let trim_suffix = config.normalized_trim_suffix();
        Self {
            config: Arc::new(config),
            trim_suffix,
            shutdown: CancellationToken::new(),
            next,
        }
    }

    /// Abort in-flight resolutions when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// The configuration this handler serves.
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Guest name to look up for a query name: trailing dot and the
    /// configured suffix (matched case-insensitively) are removed. Labels
    /// stay in their wire form; punycode is not decoded.
    pub fn lookup_key(&self, qname: &Name) -> String {
        let name = qname.to_ascii();
        let name = name.strip_suffix('.').unwrap_or(&name);

        let Some(suffix) = self.trim_suffix.as_deref() else {
            return name.to_string();
        };
        if name.len() <= suffix.len() {
            return name.to_string();
        }
        let split = name.len() - suffix.len();
        match (name.get(..split), name.get(split..)) {
            (Some(key), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => key.to_string(),
            _ => name.to_string(),
        }
    }

    /// Read the state directory and return every address leased to `domain`.
    ///
    /// The blocking read runs on the blocking pool. It is cancelled when the
    /// per-query deadline passes, when the handler shuts down, or when the
    /// returned future is dropped.
    pub async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>, GuestDnsError> {
        let cancel = self.shutdown.child_token();
        if cancel.is_cancelled() {
            return Err(GuestDnsError::Cancelled);
        }
        let _guard = cancel.clone().drop_guard();

        let state_dir = self.config.state_dir.clone();
        let domain = domain.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let timer = Timer::start();
            let bridges = state::load_state_dir(&state_dir, &cancel)?;
            metrics::record_state_load(timer.elapsed(), bridges.len());
            Ok::<_, GuestDnsError>(resolver::guest_addresses(&domain, &bridges))
        });

        let deadline = self.config.query_timeout();
        tokio::select! {
            joined = task => joined?,
            _ = tokio::time::sleep(deadline) => Err(GuestDnsError::DeadlineExceeded(deadline)),
            _ = self.shutdown.cancelled() => Err(GuestDnsError::Cancelled),
        }
    }

    async fn delegate<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
        rtype: &str,
        timer: &Timer,
    ) -> ResponseInfo {
        metrics::record_query(rtype, QueryResult::Delegated, timer.elapsed());
        self.next.handle_request(request, response_handle).await
    }
}

#[async_trait]
impl<N: RequestHandler> RequestHandler for GuestHandler<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();

        let request_info = match request.request_info() {
            Ok(info) => info,
            Err(e) => {
                debug!(error = %e, "request has no single query, delegating");
                return self
                    .delegate(request, response_handle, "unknown", &timer)
                    .await;
            }
        };
        let query = request_info.query;
        let rtype = query.query_type();
        let rtype_str = rtype.to_string();

        if query.query_class() != DNSClass::IN {
            trace!(class = %query.query_class(), "not an Internet-class query, delegating");
            return self
                .delegate(request, response_handle, &rtype_str, &timer)
                .await;
        }

        let Some(family) = AddressFamily::from_record_type(rtype) else {
            trace!(rtype = %rtype, "not an address query, delegating");
            return self
                .delegate(request, response_handle, &rtype_str, &timer)
                .await;
        };

        let qname = query.original().name().clone();
        let key = self.lookup_key(&qname);

        let ips = match self.resolve(&key).await {
            Ok(ips) => ips,
            Err(e) => {
                error!(name = %key, error = %e, "couldn't look up IPs of libvirt domains");
                metrics::record_state_load_error(failure_kind(&e));
                metrics::record_query(&rtype_str, QueryResult::Failed, timer.elapsed());
                return server_failure(request, &mut response_handle).await;
            }
        };

        // Only when the guest has no addresses of any family do we step aside.
        if ips.is_empty() {
            debug!(name = %key, "no leased addresses, delegating");
            return self
                .delegate(request, response_handle, &rtype_str, &timer)
                .await;
        }

        let kept = filter::apply(&ips, &self.config.rules);
        let answer = ResolvedAnswer::project(qname, self.config.ttl, family, &kept);
        let records = answer.records();

        debug!(
            name = %key,
            rtype = %rtype,
            resolved = ips.len(),
            kept = kept.len(),
            answers = records.len(),
            "answering libvirt guest query"
        );

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_response_code(ResponseCode::NoError);
        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            records.iter(),
            iter::empty(),
            iter::empty(),
            iter::empty(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => {
                let result = if records.is_empty() {
                    QueryResult::Empty
                } else {
                    QueryResult::Answered
                };
                metrics::record_addresses_returned(records.len());
                metrics::record_query(&rtype_str, result, timer.elapsed());
                info
            }
            Err(e) => {
                error!(name = %key, error = %e, "couldn't write message");
                metrics::record_query(&rtype_str, QueryResult::Failed, timer.elapsed());
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

/// Reply SERVFAIL with no records.
async fn server_failure<R: ResponseHandler>(
    request: &Request,
    response_handle: &mut R,
) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);
    let response = MessageResponseBuilder::from_message_request(request).build_no_records(header);

    match response_handle.send_response(response).await {
        Ok(info) => info,
        Err(e) => {
            error!(error = %e, "couldn't write SERVFAIL response");
            header.into()
        }
    }
}

fn failure_kind(error: &GuestDnsError) -> &'static str {
    match error {
        GuestDnsError::DirectoryUnavailable { .. } => "directory",
        GuestDnsError::ReadState { .. } => "read",
        GuestDnsError::RecordDecode { .. } => "decode",
        GuestDnsError::Cancelled => "cancelled",
        GuestDnsError::DeadlineExceeded(_) => "deadline",
        _ => "other",
    }
}
