//! API version negotiation.

use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::{ClientError, ClientResult};
use crate::http::{ControlEndpoint, HttpClient};
use lbsync_protocol::{parse_versions, ApiVersion, MAX_API_VERSION, MIN_API_VERSION};
use tracing::{debug, warn};

/// Fetches the versions advertised at the API root.
pub(crate) fn fetch_versions<C: HttpClient>(
    endpoint: &ControlEndpoint<C>,
    ctx: &RequestContext,
) -> ClientResult<Vec<ApiVersion>> {
    let body = endpoint.get_root(ctx)?;
    Ok(parse_versions(&body)?)
}

/// Picks `min(MAX_API_VERSION, highest advertised)`.
///
/// Returns `None` when nothing was advertised or the result falls below the
/// oldest version this build understands.
pub fn select_max_version(advertised: &[ApiVersion]) -> Option<ApiVersion> {
    let highest = advertised.iter().copied().max()?;
    let candidate = highest.min(MAX_API_VERSION);
    (candidate >= MIN_API_VERSION).then_some(candidate)
}

/// Determines the version a new client will use.
///
/// The configuration must already be validated.
pub(crate) fn resolve_version<C: HttpClient>(
    endpoint: &ControlEndpoint<C>,
    config: &ClientConfig,
    ctx: &RequestContext,
) -> ClientResult<ApiVersion> {
    if config.check_api {
        let advertised = fetch_versions(endpoint, ctx)
            .map_err(|e| e.context("failed to check supported API versions"))?;
        if !advertised.contains(&config.api_version) {
            return Err(ClientError::VersionNotAdvertised {
                requested: config.api_version,
                advertised,
            });
        }
        debug!(version = config.api_version, "API version confirmed by server");
        return Ok(config.api_version);
    }

    if config.max_api {
        let negotiated = match fetch_versions(endpoint, ctx) {
            Ok(advertised) => select_max_version(&advertised),
            Err(e) => {
                warn!(error = %e, "could not read supported API versions");
                None
            }
        };
        return Ok(match negotiated {
            Some(version) => {
                debug!(version, "negotiated API version");
                version
            }
            None => {
                warn!(
                    version = config.api_version,
                    "no usable API version advertised, using configured version"
                );
                config.api_version
            }
        });
    }

    Ok(config.api_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_version_below_build_max() {
        assert_eq!(select_max_version(&[4, 5, 6, 7]), Some(7));
    }

    #[test]
    fn max_version_capped_at_build_max() {
        assert_eq!(
            select_max_version(&[4, 5, 6, 7, 8, 9, 25]),
            Some(MAX_API_VERSION)
        );
    }

    #[test]
    fn no_usable_version() {
        assert_eq!(select_max_version(&[]), None);
        assert_eq!(select_max_version(&[1, 2, 3]), None);
    }

    #[test]
    fn unordered_listing() {
        assert_eq!(select_max_version(&[8, 4, 6]), Some(8));
    }
}
