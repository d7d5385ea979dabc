// VPN route resolution over a fresh routing table snapshot

use std::net::IpAddr;

use super::classify::is_private;
use super::{LinkNameResolver, Route, RouteTableReader};
use crate::error::ResolveError;

/// Answers the two VPN questions from the kernel routing table.
///
/// Every query takes a new snapshot from the reader; nothing is cached and nothing is retried.
/// When several routes qualify, the first one in listing order is returned.
pub struct RouteResolver<R, L> {
    reader: R,
    links: L,
}

impl<R: RouteTableReader, L: LinkNameResolver> RouteResolver<R, L> {
    pub fn new(reader: R, links: L) -> Self {
        RouteResolver { reader, links }
    }

    /// Public address of the VPN server: the public host route that shares the default route's link
    pub fn vpn_destination_ip(&self) -> Result<IpAddr, ResolveError> {
        let snapshot = self.reader.list_routes()?;
        let routes = &snapshot.routes;

        let default_link = routes
            .iter()
            .find(|route| route.is_default())
            .map(|route| route.link_index)
            .ok_or(ResolveError::DefaultRouteNotFound {
                route_count: routes.len(),
            })?;
        tracing::debug!("default route uses link index {}", default_link);

        let destination = routes
            .iter()
            .filter(|route| route.link_index == default_link && route.is_host_route())
            .filter_map(|route| route.destination.map(|dst| dst.ip()))
            .find(|ip| !is_private(*ip))
            .ok_or(ResolveError::VpnDestinationNotFound {
                route_count: routes.len(),
            })?;

        tracing::info!("VPN destination IP is {}", destination);
        Ok(destination)
    }

    /// Next hop inside the tunnel: the gateway of the default route bound to `tunnel_interface`
    pub fn vpn_local_gateway_ip(&self, tunnel_interface: &str) -> Result<IpAddr, ResolveError> {
        if tunnel_interface.is_empty() {
            return Err(ResolveError::InvalidInterfaceName);
        }

        let snapshot = self.reader.list_routes()?;

        for route in &snapshot.routes {
            let link = self
                .links
                .link_by_index(route.link_index)
                .map_err(|source| ResolveError::LinkLookupFailed {
                    index: route.link_index,
                    source,
                })?;

            if link.name != tunnel_interface || !covers_default(route) {
                continue;
            }
            match route.gateway {
                Some(gateway) => {
                    tracing::info!("VPN local gateway IP on {} is {}", tunnel_interface, gateway);
                    return Ok(gateway);
                }
                None => {
                    tracing::debug!("default route on {} has no gateway, skipping", tunnel_interface);
                }
            }
        }

        Err(ResolveError::VpnLocalGatewayNotFound {
            route_count: snapshot.len(),
        })
    }
}

/// A default route, or one whose network address is unspecified
/// (0.0.0.0/1 and ::/1 as installed by VPN clients that keep the real default route)
fn covers_default(route: &Route) -> bool {
    route.is_default() || route.destination.is_some_and(|dst| dst.network().is_unspecified())
}
