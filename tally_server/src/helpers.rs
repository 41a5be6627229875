use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};

/// Get the remote IP address from the request. The first address in the `X-Forwarded-For` header is used iif
/// `use_x_forwarded_for` is set in the configuration. Otherwise, or if the header is missing, the peer address from
/// the connection info is used.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer = req.peer_addr().map(|a| a.ip());
        trace!("Using Peer address for remote address: {:?}", peer);
        peer
    })
}
