//! Network interface discovery
//!
//! Finds the interface carrying the default route by reading
//! `/proc/net/route`.

use std::path::Path;

use tokio::fs;
use tracing::{debug, info};

use crate::error::SourceError;

/// RTF_UP flag from the kernel routing table
const RTF_UP: u32 = 0x0001;

/// Extract the default-route interface from `/proc/net/route` contents
///
/// The file has a header row followed by tab-separated columns
/// `Iface Destination Gateway Flags ...`; the default route has destination
/// `00000000`.
pub fn parse_default_route(content: &str) -> Option<String> {
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }

        let flags = u32::from_str_radix(parts[3], 16).unwrap_or(0);
        if parts[1] == "00000000" && flags & RTF_UP != 0 {
            return Some(parts[0].to_string());
        }
    }

    None
}

/// Discover the interface that carries the default route
pub async fn discover_default_interface(proc_path: &Path) -> Result<String, SourceError> {
    let route_file = proc_path.join("net/route");
    let content = fs::read_to_string(&route_file)
        .await
        .map_err(|source| SourceError::Io {
            path: route_file.clone(),
            source,
        })?;

    match parse_default_route(&content) {
        Some(interface) => {
            info!(interface = %interface, "Discovered default network interface");
            Ok(interface)
        }
        None => {
            debug!(path = %route_file.display(), "No default route in routing table");
            Err(SourceError::MissingInterface("default route".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";

    #[test]
    fn test_parse_default_route() {
        assert_eq!(parse_default_route(ROUTE_TABLE), Some("eth0".to_string()));
    }

    #[test]
    fn test_parse_default_route_missing() {
        let table = "Iface\tDestination\tGateway \tFlags\n\
                     lo\t0000007F\t00000000\t0001\n";
        assert_eq!(parse_default_route(table), None);
    }

    #[test]
    fn test_parse_default_route_ignores_down_routes() {
        let table = "Iface\tDestination\tGateway \tFlags\n\
                     wlan0\t00000000\t0101A8C0\t0002\n";
        assert_eq!(parse_default_route(table), None);
    }
}
