//! The upstream reconciliation client.

use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::diff::{dedupe_servers, diff_servers, ServerDiff};
use crate::error::{ClientError, ClientResult};
use crate::http::{ControlEndpoint, HttpClient};
use crate::negotiate::{fetch_versions, resolve_version, select_max_version};
use lbsync_protocol::{
    normalize_address, ApiVersion, ServerRecord, StreamUpstreamServer, UpstreamServer,
    MAX_API_VERSION,
};
use tracing::{info, warn};

/// Outcome of a reconciliation call.
///
/// The success lists contain exactly the operations the remote
/// acknowledged. `error` joins every per-server failure, ambiguous desired
/// entries, and a cancellation that stopped the batch early.
#[derive(Debug)]
pub struct ReconcileOutcome<T> {
    /// Servers the remote accepted as new.
    pub added: Vec<T>,
    /// Servers the remote removed.
    pub deleted: Vec<T>,
    /// Servers whose parameters the remote updated.
    pub updated: Vec<T>,
    /// Combined failure, if anything went wrong.
    pub error: Option<ClientError>,
}

impl<T> ReconcileOutcome<T> {
    fn new() -> Self {
        Self {
            added: Vec::new(),
            deleted: Vec::new(),
            updated: Vec::new(),
            error: None,
        }
    }

    /// Returns true if every operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if the remote acknowledged no change.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Converts into the success lists, failing on any recorded error.
    pub fn into_result(self) -> ClientResult<(Vec<T>, Vec<T>, Vec<T>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.added, self.deleted, self.updated)),
        }
    }
}

/// Client for the server-membership part of a load balancer control API.
///
/// The API version is resolved once in [`UpstreamClient::new`] and never
/// changes afterwards. Reconciliation calls share no other state, so two
/// concurrent calls against the same upstream race at the remote; callers
/// that need ordering must serialize them.
pub struct UpstreamClient<C: HttpClient> {
    endpoint: ControlEndpoint<C>,
    version: ApiVersion,
}

impl<C: HttpClient> UpstreamClient<C> {
    /// Creates a client, validating `config` and resolving the API version.
    ///
    /// Version checks or negotiation (if requested) are bounded by
    /// `config.timeout`.
    pub fn new(config: ClientConfig, client: C) -> ClientResult<Self> {
        config.validate()?;

        let endpoint = ControlEndpoint::new(config.base_url(), client, config.timeout);
        let ctx = RequestContext::with_timeout(config.timeout);
        let version = resolve_version(&endpoint, &config, &ctx)?;

        info!(endpoint = %endpoint.base_url(), version, "upstream client ready");
        Ok(Self { endpoint, version })
    }

    /// API version used for every request.
    pub fn resolved_version(&self) -> ApiVersion {
        self.version
    }

    /// Returns the underlying control endpoint.
    pub fn endpoint(&self) -> &ControlEndpoint<C> {
        &self.endpoint
    }

    /// Newest version the remote advertises, capped at what this build understands.
    ///
    /// This is the version a client built with
    /// [`ClientConfig::with_max_api_version`] would adopt now.
    pub fn max_remote_version(&self, ctx: &RequestContext) -> ClientResult<ApiVersion> {
        let advertised = fetch_versions(&self.endpoint, ctx)
            .map_err(|e| e.context("failed to get supported API versions"))?;
        select_max_version(&advertised).ok_or_else(|| ClientError::VersionNotAdvertised {
            requested: MAX_API_VERSION,
            advertised,
        })
    }

    /// Fails unless the HTTP upstream exists.
    pub fn check_if_upstream_exists(&self, ctx: &RequestContext, upstream: &str) -> ClientResult<()> {
        self.get_servers::<UpstreamServer>(ctx, upstream).map(|_| ())
    }

    /// Lists the servers of an HTTP upstream.
    pub fn get_http_servers(
        &self,
        ctx: &RequestContext,
        upstream: &str,
    ) -> ClientResult<Vec<UpstreamServer>> {
        self.get_servers(ctx, upstream)
    }

    /// Lists the servers of a stream upstream.
    pub fn get_stream_servers(
        &self,
        ctx: &RequestContext,
        upstream: &str,
    ) -> ClientResult<Vec<StreamUpstreamServer>> {
        self.get_servers(ctx, upstream)
    }

    /// Adds a server to an HTTP upstream.
    pub fn add_http_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &UpstreamServer,
    ) -> ClientResult<()> {
        self.add_server(ctx, upstream, server)
    }

    /// Adds a server to a stream upstream.
    pub fn add_stream_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &StreamUpstreamServer,
    ) -> ClientResult<()> {
        self.add_server(ctx, upstream, server)
    }

    /// Removes a server from an HTTP upstream by address.
    pub fn delete_http_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &str,
    ) -> ClientResult<()> {
        self.delete_server::<UpstreamServer>(ctx, upstream, server)
    }

    /// Removes a server from a stream upstream by address.
    pub fn delete_stream_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &str,
    ) -> ClientResult<()> {
        self.delete_server::<StreamUpstreamServer>(ctx, upstream, server)
    }

    /// Updates an HTTP server's parameters; `server.id` selects the server.
    pub fn update_http_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &UpstreamServer,
    ) -> ClientResult<()> {
        self.update_server(ctx, upstream, server)
    }

    /// Updates a stream server's parameters; `server.id` selects the server.
    pub fn update_stream_server(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &StreamUpstreamServer,
    ) -> ClientResult<()> {
        self.update_server(ctx, upstream, server)
    }

    /// Makes the HTTP upstream's servers match `desired`.
    pub fn reconcile_http_servers(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        desired: &[UpstreamServer],
    ) -> ClientResult<ReconcileOutcome<UpstreamServer>> {
        self.reconcile(ctx, upstream, desired)
    }

    /// Makes the stream upstream's servers match `desired`.
    pub fn reconcile_stream_servers(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        desired: &[StreamUpstreamServer],
    ) -> ClientResult<ReconcileOutcome<StreamUpstreamServer>> {
        self.reconcile(ctx, upstream, desired)
    }

    /// Makes an upstream's servers match `desired`.
    ///
    /// Returns `Err` only when the current server list cannot be fetched.
    /// Every later failure is recorded in [`ReconcileOutcome::error`] while
    /// the remaining operations still run. Cancellation or an expired
    /// deadline stops the batch and is recorded the same way.
    pub fn reconcile<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        desired: &[T],
    ) -> ClientResult<ReconcileOutcome<T>> {
        let (diff, mut errors) = self.prepare(ctx, upstream, desired)?;

        let mut outcome = ReconcileOutcome::new();
        let mut stopped = false;

        for server in diff.to_add {
            if stopped {
                break;
            }
            match self.post_server(ctx, upstream, &server) {
                Ok(()) => outcome.added.push(server),
                Err(e) => stopped = record_failure(&mut errors, e, Operation::Add, &server, upstream),
            }
        }

        for server in diff.to_delete {
            if stopped {
                break;
            }
            match self.delete_server_by_id::<T>(ctx, upstream, server.id()) {
                Ok(()) => outcome.deleted.push(server),
                Err(e) => stopped = record_failure(&mut errors, e, Operation::Delete, &server, upstream),
            }
        }

        for server in diff.to_update {
            if stopped {
                break;
            }
            match self.update_server(ctx, upstream, &server) {
                Ok(()) => outcome.updated.push(server),
                Err(e) => stopped = record_failure(&mut errors, e, Operation::Update, &server, upstream),
            }
        }

        outcome.error = ClientError::join(errors);

        info!(
            upstream,
            kind = %T::KIND,
            added = outcome.added.len(),
            deleted = outcome.deleted.len(),
            updated = outcome.updated.len(),
            clean = outcome.is_clean(),
            "reconciled upstream servers"
        );
        Ok(outcome)
    }

    /// Computes what [`reconcile`](Self::reconcile) would do, without
    /// issuing any mutating request.
    ///
    /// The success lists hold the operations that would be sent; `error`
    /// holds ambiguous desired entries.
    pub fn plan<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        desired: &[T],
    ) -> ClientResult<ReconcileOutcome<T>> {
        let (diff, errors) = self.prepare(ctx, upstream, desired)?;
        Ok(ReconcileOutcome {
            added: diff.to_add,
            deleted: diff.to_delete,
            updated: diff.to_update,
            error: ClientError::join(errors),
        })
    }

    fn prepare<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        desired: &[T],
    ) -> ClientResult<(ServerDiff<T>, Vec<ClientError>)> {
        let deduped = dedupe_servers(desired);
        let mut remote = self.get_servers::<T>(ctx, upstream)?;

        // An ambiguous address is left exactly as the remote has it.
        remote.retain(|server| !deduped.conflicting.iter().any(|c| c == server.server()));

        let diff = diff_servers(&deduped.servers, &remote);
        let conflicts = deduped
            .conflicting
            .into_iter()
            .map(|server| ClientError::ParameterMismatch {
                server,
                upstream: upstream.to_string(),
            })
            .collect();
        Ok((diff, conflicts))
    }

    fn servers_path<T: ServerRecord>(&self, upstream: &str) -> String {
        format!(
            "{}/{}/upstreams/{}/servers",
            self.version,
            T::KIND.path_segment(),
            upstream
        )
    }

    fn server_path<T: ServerRecord>(&self, upstream: &str, id: u64) -> String {
        format!("{}/{}", self.servers_path::<T>(upstream), id)
    }

    fn get_servers<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
    ) -> ClientResult<Vec<T>> {
        self.endpoint
            .get(ctx, &self.servers_path::<T>(upstream))
            .map_err(|e| {
                e.context(format!(
                    "failed to get servers of {upstream} {} upstream",
                    T::KIND
                ))
            })
    }

    fn id_of_server<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &str,
    ) -> ClientResult<Option<u64>> {
        let address = normalize_address(server);
        let servers = self.get_servers::<T>(ctx, upstream)?;
        Ok(servers
            .iter()
            .find(|s| s.server() == address)
            .map(ServerRecord::id))
    }

    fn add_server<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &T,
    ) -> ClientResult<()> {
        if self.id_of_server::<T>(ctx, upstream, server.server())?.is_some() {
            return Err(ClientError::ServerExists {
                server: server.server().to_string(),
                upstream: upstream.to_string(),
            });
        }
        self.post_server(ctx, upstream, server)
            .map_err(|e| e.context(format!("failed to add {} server to {upstream} upstream", server.server())))
    }

    fn post_server<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &T,
    ) -> ClientResult<()> {
        self.endpoint
            .post(ctx, &self.servers_path::<T>(upstream), server)
    }

    fn delete_server<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &str,
    ) -> ClientResult<()> {
        let id = self
            .id_of_server::<T>(ctx, upstream, server)?
            .ok_or_else(|| ClientError::ServerNotFound {
                server: server.to_string(),
                upstream: upstream.to_string(),
            })?;
        self.delete_server_by_id::<T>(ctx, upstream, id)
            .map_err(|e| e.context(format!("failed to remove {server} server from {upstream} upstream")))
    }

    fn delete_server_by_id<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        id: u64,
    ) -> ClientResult<()> {
        self.endpoint
            .delete(ctx, &self.server_path::<T>(upstream, id))
    }

    fn update_server<T: ServerRecord>(
        &self,
        ctx: &RequestContext,
        upstream: &str,
        server: &T,
    ) -> ClientResult<()> {
        // The id travels in the path only.
        let mut body = server.clone();
        body.set_id(0);
        self.endpoint
            .patch(ctx, &self.server_path::<T>(upstream, server.id()), &body)
    }
}

/// A mutating server operation issued during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Delete,
    Update,
}

impl Operation {
    fn describe(self, server: &str, upstream: &str) -> String {
        match self {
            Operation::Add => format!("failed to add {server} server to {upstream} upstream"),
            Operation::Delete => {
                format!("failed to delete {server} server from {upstream} upstream")
            }
            Operation::Update => {
                format!("failed to update {server} server in {upstream} upstream")
            }
        }
    }
}

/// Records a failed operation; returns true if the batch must stop.
fn record_failure<T: ServerRecord>(
    errors: &mut Vec<ClientError>,
    err: ClientError,
    op: Operation,
    server: &T,
    upstream: &str,
) -> bool {
    let stop = err.is_cancellation();
    warn!(
        upstream,
        server = server.server(),
        operation = ?op,
        error = %err,
        "server operation failed"
    );
    errors.push(err.context(op.describe(server.server(), upstream)));
    stop
}
