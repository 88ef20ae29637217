//! IPv4 helpers behind the suggested-IP field used for device provisioning.
//!
//! A device address is entered as a fixed network prefix (the octets covered
//! by the location's netmask) plus an editable host part.
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkParseError {
    #[error("expected CIDR notation like 10.0.0.0/24")]
    MissingPrefix,
    #[error("invalid address: {0}")]
    Address(String),
    #[error("prefix length must be between 0 and 32")]
    PrefixLength,
}

/// An IPv4 network in CIDR form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Network {
    base: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Network {
    pub fn parse(s: &str) -> Result<Self, NetworkParseError> {
        let (addr, len) = s.trim().split_once('/').ok_or(NetworkParseError::MissingPrefix)?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| NetworkParseError::Address(addr.to_string()))?;
        let prefix: u8 = len.parse().map_err(|_| NetworkParseError::PrefixLength)?;
        if prefix > 32 {
            return Err(NetworkParseError::PrefixLength);
        }
        let net = Self { base: addr, prefix };
        Ok(Self { base: Ipv4Addr::from(u32::from(addr) & net.mask()), prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(self.prefix)) }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.base
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) | !self.mask())
    }

    /// The first host address, conventionally held by the gateway.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base).saturating_add(1))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.base)
    }

    /// Number of leading octets fixed by the netmask.
    pub fn fixed_octets(&self) -> usize {
        usize::from(self.prefix / 8)
    }
}

impl std::fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

/// Split view of an address inside a network: `10.10.0.` + `7`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuggestedIp {
    pub network_part: String,
    pub host_part: String,
}

impl SuggestedIp {
    /// Split `ip` at the network boundary. Text that does not parse keeps the
    /// network prefix and is treated as the host part verbatim.
    pub fn split(network: &Ipv4Network, ip: &str) -> Self {
        let fixed = network.fixed_octets();
        let octets = network.network().octets();
        let network_part: String = octets[..fixed].iter().map(|o| format!("{o}.")).collect();
        let host_part = match ip.parse::<Ipv4Addr>() {
            Ok(addr) if network.contains(addr) => addr.octets()[fixed..]
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join("."),
            _ => ip.strip_prefix(network_part.as_str()).unwrap_or(ip).to_string(),
        };
        Self { network_part, host_part }
    }

    pub fn join(&self) -> String {
        format!("{}{}", self.network_part, self.host_part)
    }
}

fn parse_used(used: &[String]) -> Vec<Ipv4Addr> {
    used.iter().filter_map(|s| s.parse().ok()).collect()
}

/// First address in `network` that is neither reserved nor already in `used`.
pub fn suggest(network: &Ipv4Network, used: &[String]) -> Option<Ipv4Addr> {
    if network.prefix() >= 31 {
        return None;
    }
    let used = parse_used(used);
    let first = u32::from(network.gateway()).checked_add(1)?;
    let last = u32::from(network.broadcast()).checked_sub(1)?;
    (first..=last).map(Ipv4Addr::from).find(|ip| !used.contains(ip))
}

/// Check that `ip` can be assigned to a new device in `network`.
pub fn validate_assignment(network: &Ipv4Network, ip: &str, used: &[String]) -> Result<Ipv4Addr, String> {
    let addr: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|_| format!("'{ip}' is not a valid IPv4 address"))?;
    if !network.contains(addr) {
        return Err(format!("{addr} is outside {network}"));
    }
    if addr == network.network() || addr == network.broadcast() {
        return Err(format!("{addr} is reserved"));
    }
    if addr == network.gateway() {
        return Err(format!("{addr} is the gateway address"));
    }
    if parse_used(used).contains(&addr) {
        return Err(format!("{addr} is already assigned"));
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Network {
        Ipv4Network::parse(s).unwrap()
    }

    #[test]
    fn parse_normalizes_host_bits() {
        let n = net("10.10.3.7/16");
        assert_eq!(n.to_string(), "10.10.0.0/16");
        assert_eq!(n.broadcast(), Ipv4Addr::new(10, 10, 255, 255));
        assert!(Ipv4Network::parse("10.0.0.0").is_err());
        assert!(Ipv4Network::parse("10.0.0.0/33").is_err());
    }

    #[test]
    fn suggest_skips_gateway_and_used() {
        let n = net("10.10.0.0/24");
        let used = vec!["10.10.0.2".to_string(), "10.10.0.3".to_string()];
        assert_eq!(suggest(&n, &used), Some(Ipv4Addr::new(10, 10, 0, 4)));
        assert_eq!(suggest(&net("10.0.0.0/31"), &[]), None);
    }

    #[test]
    fn split_and_join_at_octet_boundary() {
        let n = net("10.10.0.0/24");
        let s = SuggestedIp::split(&n, "10.10.0.42");
        assert_eq!(s.network_part, "10.10.0.");
        assert_eq!(s.host_part, "42");
        assert_eq!(s.join(), "10.10.0.42");

        let wide = SuggestedIp::split(&net("10.10.0.0/16"), "10.10.4.2");
        assert_eq!(wide.host_part, "4.2");
    }

    #[test]
    fn validate_rejects_reserved_and_foreign() {
        let n = net("10.10.0.0/24");
        assert!(validate_assignment(&n, "10.10.0.0", &[]).is_err());
        assert!(validate_assignment(&n, "10.10.0.1", &[]).is_err());
        assert!(validate_assignment(&n, "10.10.0.255", &[]).is_err());
        assert!(validate_assignment(&n, "10.11.0.5", &[]).is_err());
        assert!(validate_assignment(&n, "10.10.0.5", &["10.10.0.5".into()]).is_err());
        assert_eq!(validate_assignment(&n, " 10.10.0.5 ", &[]), Ok(Ipv4Addr::new(10, 10, 0, 5)));
    }
}
