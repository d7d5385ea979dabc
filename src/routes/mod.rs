// Routes module - route snapshots, link lookups and the VPN route resolver

pub mod classify;
pub mod link;
pub mod parser;
pub mod resolver;

use ipnetwork::IpNetwork;
use serde::Serialize;
use std::net::IpAddr;

use crate::error::{LinkError, RouteTableError};

/// A single kernel routing table entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub link_index: u32,
    /// `None` for a default route; readers may also report it as `0.0.0.0/0` or `::/0`
    pub destination: Option<IpNetwork>,
    pub gateway: Option<IpAddr>,
    pub metric: Option<u32>,
    pub flags: Vec<String>,
}

impl Route {
    /// True when the route matches the whole address space
    pub fn is_default(&self) -> bool {
        self.destination.is_none_or(|dst| dst.prefix() == 0)
    }

    /// True when the destination prefix matches exactly one address (/32 or /128)
    pub fn is_host_route(&self) -> bool {
        self.destination
            .is_some_and(|dst| dst.prefix() == max_prefix(dst.ip()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub hostname: String,
    pub timestamp: String,
    pub routes: Vec<Route>,
}

impl RouteSnapshot {
    pub fn new(routes: Vec<Route>) -> Self {
        RouteSnapshot {
            hostname: get_hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            routes,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A network interface, identified by its kernel index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub index: u32,
    pub name: String,
}

/// Lists every route of the main table, across address families
pub trait RouteTableReader {
    fn list_routes(&self) -> Result<RouteSnapshot, RouteTableError>;
}

/// Maps a link index to its attributes
pub trait LinkNameResolver {
    fn link_by_index(&self, index: u32) -> Result<Link, LinkError>;
}

pub(crate) fn max_prefix(ip: IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

pub(crate) fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
