//! Integration tests for the reconciliation client against an in-memory balancer.

use lbsync_client::{
    find_api_error, ClientConfig, ClientError, HttpClient, HttpMethod, HttpRequest, HttpResponse,
    LoopbackClient, MemoryBalancer, RequestContext, UpstreamClient,
};
use lbsync_protocol::{ServerRecord, StreamUpstreamServer, UpstreamServer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type MemoryClient = UpstreamClient<LoopbackClient<Arc<MemoryBalancer>>>;

fn connect(balancer: &Arc<MemoryBalancer>) -> MemoryClient {
    UpstreamClient::new(
        ClientConfig::new("http://lb.local/api"),
        LoopbackClient::new(Arc::clone(balancer)),
    )
    .unwrap()
}

fn addresses<T: ServerRecord>(servers: &[T]) -> Vec<String> {
    servers.iter().map(|s| s.server().to_string()).collect()
}

/// Cancels a context once a given number of mutating requests went through.
struct CancelAfter {
    inner: LoopbackClient<Arc<MemoryBalancer>>,
    ctx: RequestContext,
    mutations_left: AtomicUsize,
}

impl HttpClient for CancelAfter {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mutating = request.method != HttpMethod::Get;
        let response = self.inner.execute(request);
        if mutating && self.mutations_left.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.ctx.cancel();
        }
        response
    }
}

#[test]
fn replace_all_servers() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.1:80"));
    balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.2:80"));

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(
            &RequestContext::new(),
            "backend",
            &[UpstreamServer::new("10.0.0.3:80"), UpstreamServer::new("10.0.0.4:80")],
        )
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(addresses(&outcome.added), vec!["10.0.0.3:80", "10.0.0.4:80"]);
    assert_eq!(addresses(&outcome.deleted), vec!["10.0.0.1:80", "10.0.0.2:80"]);
    assert!(outcome.updated.is_empty());
    assert_eq!(
        addresses(&balancer.http_servers("backend").unwrap()),
        vec!["10.0.0.3:80", "10.0.0.4:80"]
    );
}

#[test]
fn second_pass_is_a_no_op() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.create_http_upstream("backend");

    let client = connect(&balancer);
    let desired = [
        UpstreamServer::new("10.0.0.1"),
        UpstreamServer::new("10.0.0.2:8080").with_weight(3),
        UpstreamServer::new("unix:/var/run/app.sock"),
    ];

    let first = client
        .reconcile_http_servers(&RequestContext::new(), "backend", &desired)
        .unwrap();
    assert_eq!(first.added.len(), 3);

    let mutations = balancer.mutation_count();
    let second = client
        .reconcile_http_servers(&RequestContext::new(), "backend", &desired)
        .unwrap();
    assert!(second.is_clean());
    assert!(second.is_unchanged());
    assert_eq!(balancer.mutation_count(), mutations);
}

#[test]
fn changed_parameter_is_patched() {
    let balancer = Arc::new(MemoryBalancer::new());
    let id = balancer.insert_http_server("backend", UpstreamServer::new("127.0.0.1:80"));
    balancer.insert_http_server("backend", UpstreamServer::new("127.0.0.2:80"));

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(
            &RequestContext::new(),
            "backend",
            &[UpstreamServer::new("127.0.0.1").with_max_conns(1)],
        )
        .unwrap();

    assert!(outcome.is_clean());
    assert!(outcome.added.is_empty());
    assert_eq!(addresses(&outcome.deleted), vec!["127.0.0.2:80"]);
    assert_eq!(outcome.updated.len(), 1);
    assert_eq!(outcome.updated[0].id, id);

    let servers = balancer.http_servers("backend").unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].id, id);
    assert_eq!(servers[0].max_conns, Some(1));
}

#[test]
fn ambiguous_desired_entries_are_skipped() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.create_http_upstream("backend");

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(
            &RequestContext::new(),
            "backend",
            &[
                UpstreamServer::new("127.0.0.1:80").with_route("/test"),
                UpstreamServer::new("127.0.0.1").with_route("/test"),
                UpstreamServer::new("127.0.0.2:80").with_route("/test1"),
                UpstreamServer::new("127.0.0.2:80").with_route("/test2"),
                UpstreamServer::new("127.0.0.2:80").with_route("/test3"),
            ],
        )
        .unwrap();

    assert_eq!(addresses(&outcome.added), vec!["127.0.0.1:80"]);
    let err = outcome.error.unwrap();
    assert!(matches!(
        &err,
        ClientError::ParameterMismatch { server, .. } if server == "127.0.0.2:80"
    ));
    assert_eq!(
        addresses(&balancer.http_servers("backend").unwrap()),
        vec!["127.0.0.1:80"]
    );
}

#[test]
fn ambiguous_existing_server_survives() {
    let balancer = Arc::new(MemoryBalancer::new());
    let id = balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.2:80"));
    balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.3:80"));

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(
            &RequestContext::new(),
            "backend",
            &[
                UpstreamServer::new("10.0.0.2").with_weight(1),
                UpstreamServer::new("10.0.0.2:80").with_weight(2),
                UpstreamServer::new("10.0.0.1"),
            ],
        )
        .unwrap();

    assert_eq!(addresses(&outcome.added), vec!["10.0.0.1:80"]);
    assert_eq!(addresses(&outcome.deleted), vec!["10.0.0.3:80"]);
    assert!(outcome.updated.is_empty());
    assert!(outcome.error.unwrap().is_validation());

    let servers = balancer.http_servers("backend").unwrap();
    assert_eq!(addresses(&servers), vec!["10.0.0.2:80", "10.0.0.1:80"]);
    assert_eq!(servers[0].id, id);
    assert_eq!(servers[0].weight, Some(1));
}

#[test]
fn failed_add_does_not_stop_the_batch() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.9:80"));
    balancer.fail_server("10.0.0.2", 500, "InternalError");

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(
            &RequestContext::new(),
            "backend",
            &[UpstreamServer::new("10.0.0.1"), UpstreamServer::new("10.0.0.2")],
        )
        .unwrap();

    assert_eq!(addresses(&outcome.added), vec!["10.0.0.1:80"]);
    assert_eq!(addresses(&outcome.deleted), vec!["10.0.0.9:80"]);

    let err = outcome.error.unwrap();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.code(), Some("InternalError"));
    assert!(err.to_string().contains("10.0.0.2:80"));

    let boxed: Box<dyn std::error::Error> = Box::new(err);
    assert_eq!(find_api_error(boxed.as_ref()).map(|e| e.status), Some(500));
}

#[test]
fn every_failure_is_reported() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.insert_http_server("backend", UpstreamServer::new("10.0.0.1:80"));
    balancer.fail_server("10.0.0.1", 503, "Unavailable");
    balancer.fail_server("10.0.0.2", 500, "InternalError");

    let client = connect(&balancer);
    let outcome = client
        .reconcile_http_servers(&RequestContext::new(), "backend", &[UpstreamServer::new("10.0.0.2")])
        .unwrap();

    assert!(outcome.is_unchanged());
    let err = outcome.error.unwrap();
    assert_eq!(err.errors().len(), 2);
    let statuses: Vec<u16> = err.api_errors().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![500, 503]);
}

#[test]
fn cancellation_stops_the_batch() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.create_http_upstream("backend");

    let ctx = RequestContext::new();
    let transport = CancelAfter {
        inner: LoopbackClient::new(Arc::clone(&balancer)),
        ctx: ctx.clone(),
        mutations_left: AtomicUsize::new(1),
    };
    let client = UpstreamClient::new(ClientConfig::new("http://lb.local/api"), transport).unwrap();

    let outcome = client
        .reconcile_http_servers(
            &ctx,
            "backend",
            &[
                UpstreamServer::new("10.0.0.1"),
                UpstreamServer::new("10.0.0.2"),
                UpstreamServer::new("10.0.0.3"),
            ],
        )
        .unwrap();

    assert_eq!(addresses(&outcome.added), vec!["10.0.0.1:80"]);
    let err = outcome.error.unwrap();
    assert!(err.is_cancellation());
    assert_eq!(err.errors().len(), 1);
    assert_eq!(balancer.mutation_count(), 1);
    assert_eq!(balancer.http_servers("backend").unwrap().len(), 1);
}

#[test]
fn expired_deadline_fails_before_listing() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.create_http_upstream("backend");

    let client = connect(&balancer);
    let ctx = RequestContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
    let err = client
        .reconcile_http_servers(&ctx, "backend", &[UpstreamServer::new("10.0.0.1")])
        .unwrap_err();

    assert!(err.is_cancellation());
    assert!(balancer.requests().is_empty());
}

#[test]
fn missing_upstream_is_an_error() {
    let balancer = Arc::new(MemoryBalancer::new());
    let client = connect(&balancer);

    let err = client
        .reconcile_http_servers(&RequestContext::new(), "nope", &[UpstreamServer::new("10.0.0.1")])
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), Some("UpstreamNotFound"));

    assert!(client
        .check_if_upstream_exists(&RequestContext::new(), "nope")
        .is_err());
}

#[test]
fn stream_upstream_reconciliation() {
    let balancer = Arc::new(MemoryBalancer::new());
    let id = balancer.insert_stream_server("dns", StreamUpstreamServer::new("10.0.0.1:53"));
    balancer.insert_stream_server("dns", StreamUpstreamServer::new("10.0.0.2:53"));

    let client = connect(&balancer);
    let outcome = client
        .reconcile_stream_servers(
            &RequestContext::new(),
            "dns",
            &[
                StreamUpstreamServer::new("10.0.0.1:53").with_slow_start("10s"),
                StreamUpstreamServer::new("10.0.0.3:53"),
            ],
        )
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(addresses(&outcome.added), vec!["10.0.0.3:53"]);
    assert_eq!(addresses(&outcome.deleted), vec!["10.0.0.2:53"]);
    assert_eq!(outcome.updated.len(), 1);
    assert_eq!(outcome.updated[0].id, id);

    let servers = balancer.stream_servers("dns").unwrap();
    assert_eq!(servers[0].slow_start, "10s");
    assert!(balancer.http_servers("dns").is_none());
}

#[test]
fn negotiates_newest_common_version() {
    let balancer = Arc::new(MemoryBalancer::with_versions(vec![4, 5, 6, 7]));
    balancer.create_http_upstream("backend");

    let client = UpstreamClient::new(
        ClientConfig::new("http://lb.local/api").with_max_api_version(),
        LoopbackClient::new(Arc::clone(&balancer)),
    )
    .unwrap();
    assert_eq!(client.resolved_version(), 7);

    client
        .reconcile_http_servers(&RequestContext::new(), "backend", &[UpstreamServer::new("10.0.0.1")])
        .unwrap();
    assert!(balancer
        .requests()
        .iter()
        .skip(1)
        .all(|(_, path)| path.starts_with("/7/")));
}

#[test]
fn check_api_against_old_balancer() {
    let balancer = Arc::new(MemoryBalancer::with_versions(vec![4, 5, 6, 7]));
    let result = UpstreamClient::new(
        ClientConfig::new("http://lb.local/api").with_check_api(),
        LoopbackClient::new(Arc::clone(&balancer)),
    );
    assert!(matches!(
        result.err(),
        Some(ClientError::VersionNotAdvertised { requested: 9, .. })
    ));
}

#[test]
fn single_server_operations() {
    let balancer = Arc::new(MemoryBalancer::new());
    balancer.create_http_upstream("backend");
    let client = connect(&balancer);
    let ctx = RequestContext::new();

    client
        .add_http_server(&ctx, "backend", &UpstreamServer::new("10.0.0.1").with_weight(2))
        .unwrap();
    let err = client
        .add_http_server(&ctx, "backend", &UpstreamServer::new("10.0.0.1:80"))
        .unwrap_err();
    assert!(matches!(err, ClientError::ServerExists { .. }));

    let mut server = client.get_http_servers(&ctx, "backend").unwrap().remove(0);
    assert_eq!(server.weight, Some(2));
    server.weight = Some(5);
    client.update_http_server(&ctx, "backend", &server).unwrap();
    assert_eq!(balancer.http_servers("backend").unwrap()[0].weight, Some(5));

    client.delete_http_server(&ctx, "backend", "10.0.0.1").unwrap();
    assert!(balancer.http_servers("backend").unwrap().is_empty());

    let err = client
        .delete_http_server(&ctx, "backend", "10.0.0.1")
        .unwrap_err();
    assert!(matches!(err, ClientError::ServerNotFound { .. }));
}
