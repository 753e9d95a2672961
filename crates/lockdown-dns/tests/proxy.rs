use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use domain::base::iana::Rtype;
use domain::base::name::FlattenInto;
use domain::base::{Message, MessageBuilder, Name};
use domain::rdata::A;
use lockdown_audit::AuditSink;
use lockdown_dns::{run, ProxyConfig};
use lockdown_kernel::{AppKey, KernelError, KernelSync};
use lockdown_policy::PolicyStore;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

#[derive(Default)]
struct FakeKernel {
    allowed_ips: Vec<String>,
}

impl KernelSync for FakeKernel {
    fn sync_allowed_apps(&mut self, _apps: &[AppKey]) -> Result<(), KernelError> {
        Ok(())
    }

    fn allow_ip(&mut self, ipv4_str: &str) -> Result<(), KernelError> {
        self.allowed_ips.push(ipv4_str.to_owned());
        Ok(())
    }
}

fn build_query(name: &str) -> Vec<u8> {
    let domain = Name::<Vec<u8>>::vec_from_str(name).unwrap();
    let mut builder = MessageBuilder::new_vec().question();
    builder.header_mut().set_rd(true);
    builder.header_mut().set_random_id();
    builder.push((domain, Rtype::A)).unwrap();
    builder.into_message().into_octets()
}

fn build_a_response(query: &[u8], ip: Ipv4Addr) -> Vec<u8> {
    let query = Message::from_octets(query.to_vec()).unwrap();
    let name: Name<Vec<u8>> = query.sole_question().unwrap().into_qname().flatten_into();

    let mut answer = MessageBuilder::new_vec()
        .start_answer(&query, domain::base::iana::Rcode::NOERROR)
        .unwrap();
    answer
        .push((name, 300u32, A::new(ip)))
        .unwrap();
    answer.into_message().into_octets()
}

/// A minimal fake upstream resolver that always answers with one fixed A
/// record, for tests that exercise the allowed-name path end to end.
async fn spawn_fake_upstream(answer_ip: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let response = build_a_response(&buf[..len], answer_ip);
            let _ = socket.send_to(&response, from).await;
        }
    });

    addr
}

async fn write_policy(path: &std::path::Path, json: &str) {
    tokio::fs::write(path, json).await.unwrap();
}

#[tokio::test]
async fn denied_name_returns_nxdomain_without_touching_upstream() {
    let policy_dir = tempfile::tempdir().unwrap();
    let policy_path = policy_dir.path().join("policy.json");
    write_policy(
        &policy_path,
        r#"{"allowed_domains":["codeforces.com"],"allowed_apps":[],"allowed_ips":[]}"#,
    )
    .await;

    let store = Arc::new(PolicyStore::new());
    let mut kernel = FakeKernel::default();
    store.reload(&policy_path, &mut kernel).unwrap();

    let kernel = Arc::new(Mutex::new(kernel)) as Arc<Mutex<dyn KernelSync + Send>>;

    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("audit.json.log");
    let (audit, audit_handle) = AuditSink::spawn(&audit_path).await.unwrap();

    let proxy_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = UdpSocket::bind(proxy_addr).await.unwrap();
    let bound = listener.local_addr().unwrap();
    drop(listener);

    let config = ProxyConfig {
        bind: bound,
        // Deliberately unreachable: a denied query must never reach here.
        upstream: "127.0.0.1:1".parse().unwrap(),
        upstream_timeout: Duration::from_millis(200),
    };

    tokio::spawn(run(config, store, kernel, audit.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(bound).await.unwrap();
    let query = build_query("evil.example.com.");
    client.send(&query).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let len = tokio::time::timeout(Duration::from_secs(1), client.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let reply = Message::from_octets(buf[..len].to_vec()).unwrap();
    assert_eq!(reply.header().rcode(), domain::base::iana::Rcode::NXDOMAIN);

    drop(audit);
    audit_handle.await.unwrap();

    let log = tokio::fs::read_to_string(&audit_path).await.unwrap();
    assert!(log.contains("\"domain\":\"evil.example.com\""));
    assert!(log.contains("\"allowed\":false"));
}

#[tokio::test]
async fn allowed_name_inserts_ip_before_replying() {
    let policy_dir = tempfile::tempdir().unwrap();
    let policy_path = policy_dir.path().join("policy.json");
    write_policy(
        &policy_path,
        r#"{"allowed_domains":["codeforces.com"],"allowed_apps":[],"allowed_ips":[]}"#,
    )
    .await;

    let store = Arc::new(PolicyStore::new());
    let mut kernel = FakeKernel::default();
    store.reload(&policy_path, &mut kernel).unwrap();

    let kernel = Arc::new(Mutex::new(kernel));
    let kernel_dyn = Arc::clone(&kernel) as Arc<Mutex<dyn KernelSync + Send>>;

    let audit_dir = tempfile::tempdir().unwrap();
    let (audit, audit_handle) = AuditSink::spawn(audit_dir.path().join("audit.json.log"))
        .await
        .unwrap();

    let upstream = spawn_fake_upstream(Ipv4Addr::new(1, 2, 3, 4)).await;

    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bound = listener.local_addr().unwrap();
    drop(listener);

    let config = ProxyConfig {
        bind: bound,
        upstream,
        upstream_timeout: Duration::from_secs(1),
    };

    tokio::spawn(run(config, store, kernel_dyn, audit.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(bound).await.unwrap();
    client.send(&build_query("www.codeforces.com.")).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let len = tokio::time::timeout(Duration::from_secs(1), client.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let reply = Message::from_octets(buf[..len].to_vec()).unwrap();
    assert_eq!(reply.header().rcode(), domain::base::iana::Rcode::NOERROR);

    // By the time the reply is on the wire, allow_ip must already have run.
    let kernel = kernel.lock().await;
    assert_eq!(kernel.allowed_ips, vec!["1.2.3.4".to_owned()]);
    drop(kernel);

    drop(audit);
    audit_handle.await.unwrap();
}

#[tokio::test]
async fn upstream_failure_yields_empty_reply_and_allowed_audit() {
    let policy_dir = tempfile::tempdir().unwrap();
    let policy_path = policy_dir.path().join("policy.json");
    write_policy(
        &policy_path,
        r#"{"allowed_domains":["codeforces.com"],"allowed_apps":[],"allowed_ips":[]}"#,
    )
    .await;

    let store = Arc::new(PolicyStore::new());
    let mut kernel = FakeKernel::default();
    store.reload(&policy_path, &mut kernel).unwrap();
    let kernel = Arc::new(Mutex::new(kernel)) as Arc<Mutex<dyn KernelSync + Send>>;

    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("audit.json.log");
    let (audit, audit_handle) = AuditSink::spawn(&audit_path).await.unwrap();

    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bound = listener.local_addr().unwrap();
    drop(listener);

    // Port 9 (discard) on loopback reliably refuses UDP connections
    // immediately on most platforms; a short timeout keeps the test fast
    // either way.
    let config = ProxyConfig {
        bind: bound,
        upstream: "127.0.0.1:9".parse().unwrap(),
        upstream_timeout: Duration::from_millis(200),
    };

    tokio::spawn(run(config, store, kernel, audit.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(bound).await.unwrap();
    client.send(&build_query("codeforces.com.")).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let len = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let reply = Message::from_octets(buf[..len].to_vec()).unwrap();
    assert_eq!(reply.header().rcode(), domain::base::iana::Rcode::NOERROR);
    assert_eq!(reply.header_counts().ancount(), 0);

    drop(audit);
    audit_handle.await.unwrap();

    let log = tokio::fs::read_to_string(&audit_path).await.unwrap();
    assert!(log.contains("\"allowed\":true"));
}
