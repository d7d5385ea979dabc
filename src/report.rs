// Output rendering for resolver results

use serde::Serialize;
use std::net::IpAddr;

use crate::config::OutputFormat;
use crate::error::AppResult;
use crate::routes::{get_hostname, RouteSnapshot};

#[derive(Debug, Serialize)]
pub struct DestinationReport {
    pub hostname: String,
    pub timestamp: String,
    pub vpn_destination_ip: IpAddr,
}

#[derive(Debug, Serialize)]
pub struct GatewayReport {
    pub hostname: String,
    pub timestamp: String,
    pub interface: String,
    pub vpn_local_gateway_ip: IpAddr,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_count: Option<usize>,
}

impl DestinationReport {
    pub fn new(vpn_destination_ip: IpAddr) -> Self {
        DestinationReport {
            hostname: get_hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            vpn_destination_ip,
        }
    }
}

impl GatewayReport {
    pub fn new(interface: &str, vpn_local_gateway_ip: IpAddr) -> Self {
        GatewayReport {
            hostname: get_hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            interface: interface.to_string(),
            vpn_local_gateway_ip,
        }
    }
}

pub fn render_destination(report: &DestinationReport, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Text => Ok(report.vpn_destination_ip.to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

pub fn render_gateway(report: &GatewayReport, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Text => Ok(report.vpn_local_gateway_ip.to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

pub fn render_error(report: &ErrorReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => report.message.clone(),
        // Serializing plain strings and numbers cannot fail
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_else(|_| report.message.clone()),
    }
}

/// One route per line, like `ip route show` but with link indexes
pub fn render_routes(snapshot: &RouteSnapshot, format: OutputFormat) -> AppResult<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(snapshot)?);
    }

    let mut out = String::new();
    if snapshot.is_empty() {
        out.push_str("no routes\n");
        return Ok(out);
    }
    for route in &snapshot.routes {
        match route.destination {
            Some(dst) => out.push_str(&dst.to_string()),
            None => out.push_str("default"),
        }
        if let Some(gw) = route.gateway {
            out.push_str(&format!(" via {}", gw));
        }
        out.push_str(&format!(" link {}", route.link_index));
        if let Some(metric) = route.metric {
            out.push_str(&format!(" metric {}", metric));
        }
        for flag in &route.flags {
            out.push(' ');
            out.push_str(flag);
        }
        out.push('\n');
    }
    Ok(out)
}
