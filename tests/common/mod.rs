//! Shared test infrastructure for guest handler integration tests.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::iter;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse, MessageResponseBuilder};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use serde_json::json;
use tempfile::TempDir;

use libvirt_dns::config::DnsConfig;
use libvirt_dns::filter::SubnetRule;
use libvirt_dns::handler::GuestHandler;

// --- Constants ---

pub const TEST_TTL: u32 = 60;

/// Address the stub next stage answers with, so delegation is visible.
pub const NEXT_STAGE_MARKER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 53);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, which can then be parsed with
/// `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

/// A response handler whose client has gone away.
#[derive(Clone, Default)]
pub struct BrokenResponseHandler {
    attempts: Arc<AtomicUsize>,
}

impl BrokenResponseHandler {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseHandler for BrokenResponseHandler {
    async fn send_response<'a>(
        &mut self,
        _response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

// --- Next stage ---

/// Stand-in for the next pipeline stage: counts calls and answers every
/// query with a single A record for [`NEXT_STAGE_MARKER`].
#[derive(Clone, Default)]
pub struct NextStage {
    calls: Arc<AtomicUsize>,
}

impl NextStage {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandler for NextStage {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let name = request
            .request_info()
            .map(|info| info.query.original().name().clone())
            .unwrap_or_else(|_| Name::root());
        let records = [Record::from_rdata(name, 5, RData::A(A::from(NEXT_STAGE_MARKER)))];

        let mut header = Header::response_from_request(request.header());
        header.set_response_code(ResponseCode::NoError);
        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            records.iter(),
            iter::empty(),
            iter::empty(),
            iter::empty(),
        );
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(_) => header.into(),
        }
    }
}

// --- State directory builder ---

/// Writes libvirt-style `<bridge>.macs` / `<bridge>.status` files into a
/// temporary directory.
pub struct StateDir {
    dir: TempDir,
}

impl StateDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `<bridge>.macs` from `(domain, macs)` pairs.
    pub fn macs(&self, bridge: &str, entries: &[(&str, &[&str])]) -> &Self {
        let value: Vec<_> = entries
            .iter()
            .map(|(domain, macs)| json!({ "domain": domain, "macs": macs }))
            .collect();
        self.raw(&format!("{bridge}.macs"), &serde_json::to_string(&value).unwrap())
    }

    /// Write `<bridge>.status` from `(mac, ip)` pairs.
    pub fn leases(&self, bridge: &str, entries: &[(&str, &str)]) -> &Self {
        let value: Vec<_> = entries
            .iter()
            .map(|(mac, ip)| {
                json!({
                    "ip-address": ip,
                    "mac-address": mac,
                    "hostname": "ignored",
                    "expiry-time": 1_700_000_000u64,
                })
            })
            .collect();
        self.raw(
            &format!("{bridge}.status"),
            &serde_json::to_string(&value).unwrap(),
        )
    }

    /// Write arbitrary file contents.
    pub fn raw(&self, file_name: &str, contents: &str) -> &Self {
        fs::write(self.dir.path().join(file_name), contents).expect("failed to write state file");
        self
    }
}

/// Create a named pipe; reading it blocks until a writer appears.
#[cfg(unix)]
pub fn mkfifo(path: &std::path::Path) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed: {}", io::Error::last_os_error());
}

// --- Config / handler builders ---

pub fn test_dns_config(state: &StateDir) -> DnsConfig {
    let mut config = DnsConfig::guest("127.0.0.1:5353".parse().unwrap());
    config.state_dir = state.path();
    config.ttl = TEST_TTL;
    config
}

pub fn keep(cidr: &str) -> SubnetRule {
    SubnetRule::Keep {
        cidr: cidr.parse().unwrap(),
    }
}

/// Build a handler in front of a fresh [`NextStage`]; returns both so tests
/// can check whether delegation happened.
pub fn build_handler(config: DnsConfig) -> (GuestHandler<NextStage>, NextStage) {
    let next = NextStage::default();
    (GuestHandler::new(config, next.clone()), next)
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, class: DNSClass, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(class);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` as if received over UDP.
pub fn build_request(name: &str, record_type: RecordType, class: DNSClass, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, class, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute an IN-class query through the handler and return the parsed response.
pub async fn execute_query<H: RequestHandler>(
    handler: &H,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    execute_query_with_class(handler, name, record_type, DNSClass::IN, id).await
}

pub async fn execute_query_with_class<H: RequestHandler>(
    handler: &H,
    name: &str,
    record_type: RecordType,
    class: DNSClass,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, class, id);
    let response = TestResponseHandler::new();
    handler.handle_request(&request, response.clone()).await;
    response.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract AAAA addresses from a response.
pub fn extract_aaaa_ips(msg: &Message) -> Vec<Ipv6Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::AAAA(aaaa) => Some(Ipv6Addr::from(*aaaa)),
            _ => None,
        })
        .collect()
}

/// Every address in the answer section, regardless of family.
pub fn extract_ips(msg: &Message) -> Vec<IpAddr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(IpAddr::V4(Ipv4Addr::from(*a))),
            RData::AAAA(aaaa) => Some(IpAddr::V6(Ipv6Addr::from(*aaaa))),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert the response came from the stub next stage.
pub fn assert_delegated(msg: &Message, next: &NextStage) {
    assert_eq!(next.calls(), 1, "expected exactly one delegation");
    assert_eq!(extract_a_ips(msg), vec![NEXT_STAGE_MARKER]);
    assert!(!msg.header().authoritative());
}

/// Assert an authoritative NOERROR answer with exactly the expected A records.
pub fn assert_a_answer(msg: &Message, expected: &[Ipv4Addr]) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.header().authoritative(), "answer must be authoritative");
    let mut actual = extract_a_ips(msg);
    actual.sort();
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}
