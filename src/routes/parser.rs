// Route table reader backed by iproute2 (`ip route show`)

use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Command;

use super::link::SysfsLinks;
use super::{max_prefix, Route, RouteSnapshot, RouteTableReader};
use crate::error::RouteTableError;

/// Route types `ip route show` prints in front of the destination
const ROUTE_TYPES: &[&str] = &[
    "unicast", "local", "broadcast", "multicast", "throw", "unreachable", "prohibit", "blackhole", "nat", "anycast",
];

/// Flags `ip route show` prints as bare words
const ROUTE_FLAGS: &[&str] = &["onlink", "linkdown", "pervasive", "dead", "offload", "trap", "notify", "rt_offload"];

#[derive(Debug, Clone, Copy)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn flag(self) -> &'static str {
        match self {
            Family::V4 => "-4",
            Family::V6 => "-6",
        }
    }
}

/// A route as listed by iproute2, before its device is resolved to a link index
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct ListedRoute {
    dst: String,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
    #[serde(default)]
    metric: Option<u32>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    nexthops: Vec<Nexthop>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct Nexthop {
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
}

impl ListedRoute {
    /// Multipath routes carry their device and gateway on the nexthops; the first one wins
    fn flatten_nexthops(&mut self) {
        if self.dev.is_some() {
            return;
        }
        if let Some(first) = self.nexthops.first() {
            self.dev = first.dev.clone();
            self.gateway = self.gateway.take().or_else(|| first.gateway.clone());
        }
    }
}

/// Reads the main routing table of both address families through the `ip` command
#[derive(Debug, Clone)]
pub struct SystemRouteTable {
    ip_command: PathBuf,
    links: SysfsLinks,
}

impl SystemRouteTable {
    pub fn new(ip_command: impl Into<PathBuf>, links: SysfsLinks) -> Self {
        SystemRouteTable {
            ip_command: ip_command.into(),
            links,
        }
    }

    fn list_family(&self, family: Family) -> Result<Vec<ListedRoute>, RouteTableError> {
        // Try using `ip -json route show` first
        match self.run_ip(&[family.flag(), "-json", "route", "show"]) {
            Ok(stdout) => parse_ip_json(&stdout),
            Err(RouteTableError::CommandFailed { command, stderr, .. }) => {
                tracing::warn!(
                    "{} failed ({}), falling back to plain route listing",
                    command,
                    stderr
                );
                let stdout = self.run_ip(&[family.flag(), "route", "show"])?;
                Ok(parse_ip_route(&stdout))
            }
            Err(e) => Err(e),
        }
    }

    fn run_ip(&self, args: &[&str]) -> Result<String, RouteTableError> {
        let command = format!("{} {}", self.ip_command.display(), args.join(" "));
        tracing::trace!("running {}", command);

        let output = Command::new(&self.ip_command)
            .args(args)
            .output()
            .map_err(|source| RouteTableError::CommandExecution {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RouteTableError::CommandFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn to_route(&self, mut listed: ListedRoute) -> Result<Option<Route>, RouteTableError> {
        listed.flatten_nexthops();

        let Some(dev) = listed.dev else {
            tracing::debug!("skipping route to {} without an output device", listed.dst);
            return Ok(None);
        };

        let destination = parse_destination(&listed.dst)?;
        let gateway = listed
            .gateway
            .map(|gw| gw.parse::<IpAddr>().map_err(|_| RouteTableError::InvalidGateway(gw)))
            .transpose()?;
        let link_index = self
            .links
            .index_of(&dev)
            .map_err(|source| RouteTableError::UnknownDevice { device: dev, source })?;

        Ok(Some(Route {
            link_index,
            destination,
            gateway,
            metric: listed.metric,
            flags: listed.flags,
        }))
    }
}

impl RouteTableReader for SystemRouteTable {
    fn list_routes(&self) -> Result<RouteSnapshot, RouteTableError> {
        let mut routes = Vec::new();
        for family in [Family::V4, Family::V6] {
            for listed in self.list_family(family)? {
                if let Some(route) = self.to_route(listed)? {
                    routes.push(route);
                }
            }
        }
        tracing::debug!("listed {} route(s)", routes.len());
        Ok(RouteSnapshot::new(routes))
    }
}

fn parse_ip_json(json_str: &str) -> Result<Vec<ListedRoute>, RouteTableError> {
    if json_str.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json_str)?)
}

/// Parse non-JSON output from `ip route show`
fn parse_ip_route(output: &str) -> Vec<ListedRoute> {
    let mut routes: Vec<ListedRoute> = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Continuation line of a multipath route
        if parts.first() == Some(&"nexthop") {
            if let Some(route) = routes.last_mut() {
                let mut nexthop = Nexthop::default();
                parse_route_options(&parts[1..], &mut nexthop.gateway, &mut nexthop.dev, &mut None, &mut Vec::new());
                route.nexthops.push(nexthop);
            }
            continue;
        }

        let mut rest = parts.as_slice();
        if let Some(first) = rest.first() {
            if ROUTE_TYPES.contains(first) {
                rest = &rest[1..];
            }
        }
        let Some((dst, options)) = rest.split_first() else {
            continue;
        };

        let mut route = ListedRoute {
            dst: dst.to_string(),
            ..Default::default()
        };
        parse_route_options(options, &mut route.gateway, &mut route.dev, &mut route.metric, &mut route.flags);
        routes.push(route);
    }

    routes
}

fn parse_route_options(
    parts: &[&str],
    gateway: &mut Option<String>,
    dev: &mut Option<String>,
    metric: &mut Option<u32>,
    flags: &mut Vec<String>,
) {
    let mut i = 0;
    while i < parts.len() {
        match (parts[i], parts.get(i + 1)) {
            ("via", Some(gw)) => {
                // `via inet6 fe80::1` names the family before the address
                if (*gw == "inet" || *gw == "inet6") && i + 2 < parts.len() {
                    *gateway = Some(parts[i + 2].to_string());
                    i += 3;
                } else {
                    *gateway = Some(gw.to_string());
                    i += 2;
                }
            }
            ("dev", Some(iface)) => {
                *dev = Some(iface.to_string());
                i += 2;
            }
            ("metric", Some(m)) => {
                *metric = m.parse().ok();
                i += 2;
            }
            (word, _) if ROUTE_FLAGS.contains(&word) => {
                flags.push(word.to_string());
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }
}

/// `default`, `0.0.0.0/0` and `::/0` have no destination; a bare address is a host route
fn parse_destination(dst: &str) -> Result<Option<IpNetwork>, RouteTableError> {
    if dst == "default" {
        return Ok(None);
    }

    let invalid = |reason: String| RouteTableError::InvalidDestination {
        value: dst.to_string(),
        reason,
    };

    let (addr, prefix) = match dst.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (dst, None),
    };
    let ip: IpAddr = addr.parse().map_err(|_| invalid("not an IP address".to_string()))?;
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().map_err(|_| invalid(format!("bad prefix length {:?}", p)))?,
        None => max_prefix(ip),
    };
    let network = IpNetwork::new(ip, prefix).map_err(|e| invalid(e.to_string()))?;

    if network.prefix() == 0 {
        return Ok(None);
    }
    Ok(Some(network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::link::tests::fake_sysfs;

    const IP4_JSON: &str = r#"[
        {"dst":"default","gateway":"192.168.1.1","dev":"eth0","protocol":"dhcp","metric":100,"flags":[]},
        {"dst":"8.8.8.8","gateway":"192.168.1.1","dev":"eth0","flags":[]},
        {"dst":"10.8.0.0/24","dev":"tun0","protocol":"kernel","scope":"link","prefsrc":"10.8.0.2","flags":["linkdown"]},
        {"type":"unreachable","dst":"10.99.0.0/16","flags":[]}
    ]"#;

    #[test]
    fn test_parse_ip_json() {
        let routes = parse_ip_json(IP4_JSON).unwrap();
        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].dst, "default");
        assert_eq!(routes[0].gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(routes[0].metric, Some(100));
        assert_eq!(routes[2].flags, vec!["linkdown".to_string()]);
        assert_eq!(routes[3].dev, None);
    }

    #[test]
    fn test_parse_ip_json_empty() {
        assert!(parse_ip_json("").unwrap().is_empty());
        assert!(parse_ip_json("[]\n").unwrap().is_empty());
        assert!(parse_ip_json("not json").is_err());
    }

    #[test]
    fn test_parse_ip_route() {
        let output = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n\
                      8.8.8.8 via 192.168.1.1 dev eth0\n\
                      0.0.0.0/1 via 10.8.0.1 dev tun0 onlink\n\
                      blackhole 10.99.0.0/16\n\
                      \n";
        let routes = parse_ip_route(output);
        assert_eq!(routes.len(), 4);

        assert_eq!(routes[0].dst, "default");
        assert_eq!(routes[0].gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(routes[0].dev.as_deref(), Some("eth0"));
        assert_eq!(routes[0].metric, Some(100));

        assert_eq!(routes[2].dst, "0.0.0.0/1");
        assert_eq!(routes[2].flags, vec!["onlink".to_string()]);

        assert_eq!(routes[3].dst, "10.99.0.0/16");
        assert_eq!(routes[3].dev, None);
    }

    #[test]
    fn test_parse_ip_route_multipath_and_v6_gateway() {
        let output = "default proto static metric 50\n\
                      \tnexthop via 192.168.1.1 dev eth0 weight 1\n\
                      \tnexthop via 192.168.2.1 dev eth1 weight 1\n\
                      2001:db8::/64 via inet6 fe80::1 dev eth0\n";
        let mut routes = parse_ip_route(output);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].nexthops.len(), 2);

        routes[0].flatten_nexthops();
        assert_eq!(routes[0].dev.as_deref(), Some("eth0"));
        assert_eq!(routes[0].gateway.as_deref(), Some("192.168.1.1"));

        assert_eq!(routes[1].gateway.as_deref(), Some("fe80::1"));
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(parse_destination("default").unwrap(), None);
        assert_eq!(parse_destination("0.0.0.0/0").unwrap(), None);
        assert_eq!(parse_destination("::/0").unwrap(), None);

        let host = parse_destination("8.8.8.8").unwrap().unwrap();
        assert_eq!(host.prefix(), 32);
        let host6 = parse_destination("2001:4860:4860::8888").unwrap().unwrap();
        assert_eq!(host6.prefix(), 128);

        let half = parse_destination("0.0.0.0/1").unwrap().unwrap();
        assert_eq!(half.prefix(), 1);

        assert!(parse_destination("10.0.0.0/33").is_err());
        assert!(parse_destination("eth0").is_err());
        assert!(parse_destination("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_to_route() {
        let dir = fake_sysfs(&[("eth0", "2"), ("tun0", "7")]);
        let table = SystemRouteTable::new("ip", SysfsLinks::new(dir.path()));

        let routes: Vec<Route> = parse_ip_json(IP4_JSON)
            .unwrap()
            .into_iter()
            .filter_map(|listed| table.to_route(listed).unwrap())
            .collect();

        // The unreachable route has no device and is dropped
        assert_eq!(routes.len(), 3);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].link_index, 2);
        assert_eq!(routes[0].gateway, Some("192.168.1.1".parse().unwrap()));
        assert!(routes[1].is_host_route());
        assert_eq!(routes[2].link_index, 7);
        assert_eq!(routes[2].gateway, None);
    }

    #[test]
    fn test_to_route_unknown_device() {
        let dir = fake_sysfs(&[("eth0", "2")]);
        let table = SystemRouteTable::new("ip", SysfsLinks::new(dir.path()));
        let listed = ListedRoute {
            dst: "10.0.0.0/8".to_string(),
            dev: Some("tun3".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            table.to_route(listed),
            Err(RouteTableError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn test_to_route_invalid_gateway() {
        let dir = fake_sysfs(&[("eth0", "2")]);
        let table = SystemRouteTable::new("ip", SysfsLinks::new(dir.path()));
        let listed = ListedRoute {
            dst: "default".to_string(),
            gateway: Some("gateway.local".to_string()),
            dev: Some("eth0".to_string()),
            ..Default::default()
        };
        assert!(matches!(table.to_route(listed), Err(RouteTableError::InvalidGateway(_))));
    }

    #[test]
    fn test_missing_ip_command() {
        let dir = fake_sysfs(&[]);
        let table = SystemRouteTable::new("/nonexistent/bin/ip", SysfsLinks::new(dir.path()));
        assert!(matches!(
            table.list_routes(),
            Err(RouteTableError::CommandExecution { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_routes_with_fake_ip_command() {
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            std::io::Write::write_all(&mut file, format!("#!/bin/sh\n{}", body).as_bytes()).unwrap();
            file.sync_all().unwrap();
            drop(file);
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        let sysfs = fake_sysfs(&[("eth0", "2"), ("tun0", "7")]);
        let bin = tempfile::tempdir().unwrap();

        let json_ip = write_script(
            bin.path(),
            "ip-json",
            r#"case "$*" in
  "-4 -json route show") echo '[{"dst":"default","gateway":"192.168.1.1","dev":"eth0","flags":[]},{"dst":"203.0.113.9","gateway":"192.168.1.1","dev":"eth0","flags":[]}]' ;;
  "-6 -json route show") echo '[{"dst":"fe80::/64","dev":"eth0","flags":[]}]' ;;
  *) exit 1 ;;
esac
"#,
        );
        // iproute2 without JSON support
        let text_ip = write_script(
            bin.path(),
            "ip-text",
            r#"case "$*" in
  "-4 route show") printf 'default via 10.8.0.1 dev tun0\n10.8.0.0/24 dev tun0 scope link\n' ;;
  "-6 route show") ;;
  *) echo "Option \"-json\" is unknown" >&2; exit 255 ;;
esac
"#,
        );

        // Both scripts are written and closed before either one is executed
        let table = SystemRouteTable::new(&json_ip, SysfsLinks::new(sysfs.path()));
        let snapshot = table.list_routes().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.routes[0].is_default());
        assert_eq!(snapshot.routes[1].destination, Some("203.0.113.9/32".parse().unwrap()));
        assert_eq!(snapshot.routes[2].destination, Some("fe80::/64".parse().unwrap()));

        let table = SystemRouteTable::new(&text_ip, SysfsLinks::new(sysfs.path()));
        let snapshot = table.list_routes().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.routes[0].link_index, 7);
        assert_eq!(snapshot.routes[0].gateway, Some("10.8.0.1".parse().unwrap()));
    }
}
