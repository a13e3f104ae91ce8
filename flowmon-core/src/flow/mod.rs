//! Flow identity: who a packet belongs to.
//!
//! A flow is the set of packets sharing one five-tuple of
//! (protocol, source address, source port, destination address,
//! destination port). Flows are unidirectional: `A → B` and `B → A` are
//! two distinct flows.
//!
//! Classification is a pure function from a packet's [`Headers`] to the
//! canonical [`FlowKey`]: it never fails and it never compares anything
//! but values, so equal inputs always land in the same flow.

mod id;

pub use self::id::FlowId;

use std::{fmt, net::IpAddr, str::FromStr};
use thiserror::Error;

/// Transport protocol tag of a flow.
///
/// A closed set: the two transports the classifier knows by name plus
/// [`Protocol::Other`] carrying the raw IP protocol number for everything
/// else (ICMP, OSPF, ...). There is no dynamic protocol registry to query
/// and nothing to misspell.
///
/// # Example
///
/// ```
/// use flowmon_core::Protocol;
///
/// assert_eq!(Protocol::from_ip_number(17), Protocol::Udp);
/// assert_eq!(Protocol::from_ip_number(6), Protocol::Tcp);
/// assert_eq!(Protocol::from_ip_number(1), Protocol::Other(1));
///
/// // parsed, for CLI flags and config files
/// let udp: Protocol = "udp".parse().unwrap();
/// assert_eq!(udp, Protocol::Udp);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// user datagram protocol (IP protocol number 17)
    Udp,
    /// transmission control protocol (IP protocol number 6)
    Tcp,
    /// any other IP protocol, tagged by its protocol number
    Other(u8),
}

impl Protocol {
    const TCP_NUMBER: u8 = 6;
    const UDP_NUMBER: u8 = 17;

    /// map an IP protocol number to its tag
    pub const fn from_ip_number(number: u8) -> Self {
        match number {
            Self::TCP_NUMBER => Protocol::Tcp,
            Self::UDP_NUMBER => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }

    /// the IP protocol number behind this tag
    pub const fn ip_number(self) -> u8 {
        match self {
            Protocol::Tcp => Self::TCP_NUMBER,
            Protocol::Udp => Self::UDP_NUMBER,
            Protocol::Other(other) => other,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Other(number) => write!(f, "IP({number})"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ProtocolParseError;

    /// Parses `"udp"`, `"tcp"` (case-insensitive) or a bare IP protocol
    /// number. Numbers that happen to be 6 or 17 resolve to the named
    /// variants.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("udp") {
            return Ok(Protocol::Udp);
        }
        if s.eq_ignore_ascii_case("tcp") {
            return Ok(Protocol::Tcp);
        }
        s.parse::<u8>()
            .map(Protocol::from_ip_number)
            .map_err(|_| ProtocolParseError::Unknown(s.to_owned()))
    }
}

/// Error returned when parsing a [`Protocol`] from a string.
#[derive(Debug, Clone, Error)]
pub enum ProtocolParseError {
    /// Neither a known protocol name nor an IP protocol number.
    #[error("unknown protocol `{0}' (expected udp, tcp or an IP protocol number)")]
    Unknown(String),
}

/// The header fields the classifier reads, as one borrowed-nothing value.
///
/// Producers build a `Headers` per packet from whatever representation
/// their stack uses and hand it to [`FlowMonitor::report_tx`]. The three
/// constructors cover the shapes that occur in practice; ports are
/// optional because raw IP traffic has none.
///
/// [`FlowMonitor::report_tx`]: crate::FlowMonitor::report_tx
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headers {
    protocol: Protocol,
    source: IpAddr,
    source_port: Option<u16>,
    destination: IpAddr,
    destination_port: Option<u16>,
}

impl Headers {
    /// headers of a UDP datagram
    pub const fn udp(
        source: IpAddr,
        source_port: u16,
        destination: IpAddr,
        destination_port: u16,
    ) -> Self {
        Self {
            protocol: Protocol::Udp,
            source,
            source_port: Some(source_port),
            destination,
            destination_port: Some(destination_port),
        }
    }

    /// headers of a TCP segment
    pub const fn tcp(
        source: IpAddr,
        source_port: u16,
        destination: IpAddr,
        destination_port: u16,
    ) -> Self {
        Self {
            protocol: Protocol::Tcp,
            source,
            source_port: Some(source_port),
            destination,
            destination_port: Some(destination_port),
        }
    }

    /// headers of a raw IP packet that carries no transport ports
    /// (ICMP, routing protocols, tunnels, ...)
    ///
    /// The classifier maps the missing ports to the sentinel `0`, so this
    /// traffic is still classifiable; see [`Headers::classify`].
    pub const fn ip(protocol: Protocol, source: IpAddr, destination: IpAddr) -> Self {
        Self {
            protocol,
            source,
            source_port: None,
            destination,
            destination_port: None,
        }
    }

    /// Classify these headers into their canonical [`FlowKey`].
    ///
    /// Never fails. Headers without ports fall back to port `0` on both
    /// ends rather than being rejected, so every packet the producer can
    /// describe lands in some flow.
    ///
    /// ```
    /// use flowmon_core::{Headers, Protocol};
    /// use std::net::IpAddr;
    ///
    /// let src: IpAddr = "10.0.0.1".parse().unwrap();
    /// let dst: IpAddr = "10.0.0.2".parse().unwrap();
    ///
    /// let ping = Headers::ip(Protocol::Other(1), src, dst).classify();
    /// assert_eq!(ping.source_port, 0);
    /// assert_eq!(ping.destination_port, 0);
    /// ```
    pub const fn classify(self) -> FlowKey {
        FlowKey {
            protocol: self.protocol,
            source: self.source,
            source_port: match self.source_port {
                Some(port) => port,
                None => 0,
            },
            destination: self.destination,
            destination_port: match self.destination_port {
                Some(port) => port,
                None => 0,
            },
        }
    }
}

/// The canonical identity of a flow: the classic five-tuple.
///
/// Two packets belong to the same flow iff all five fields are equal.
/// Keys are plain values: hashable, ordered, copiable, and independent of
/// when or where they were built, which is what makes classification
/// deterministic.
///
/// # Example
///
/// ```
/// use flowmon_core::{FlowKey, Headers};
/// use std::net::IpAddr;
///
/// let a: IpAddr = "10.0.0.1".parse().unwrap();
/// let b: IpAddr = "10.0.0.2".parse().unwrap();
///
/// let forward = Headers::udp(a, 49152, b, 9).classify();
/// let reverse = Headers::udp(b, 9, a, 49152).classify();
///
/// // flows are unidirectional
/// assert_ne!(forward, reverse);
/// assert_eq!(forward.to_string(), "10.0.0.1:49152 -> 10.0.0.2:9");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    /// transport protocol tag
    pub protocol: Protocol,
    /// sender address
    pub source: IpAddr,
    /// sender port, `0` when the protocol has none
    pub source_port: u16,
    /// receiver address
    pub destination: IpAddr,
    /// receiver port, `0` when the protocol has none
    pub destination_port: u16,
}

impl From<Headers> for FlowKey {
    fn from(headers: Headers) -> Self {
        headers.classify()
    }
}

impl fmt::Display for FlowKey {
    /// `SrcAddr:SrcPort -> DstAddr:DstPort`, the shape used by the text
    /// report.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_port, self.destination, self.destination_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    // ---- 1. protocol ----

    #[test]
    fn protocol_numbers_round_trip() {
        for number in 0..=u8::MAX {
            let protocol = Protocol::from_ip_number(number);
            assert_eq!(protocol.ip_number(), number);
        }
    }

    #[test]
    fn protocol_display() {
        assert_eq!(Protocol::Udp.to_string(), "UDP");
        assert_eq!(Protocol::Tcp.to_string(), "TCP");
        assert_eq!(Protocol::Other(1).to_string(), "IP(1)");
    }

    #[test]
    fn protocol_parse() {
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("17".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("6".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("89".parse::<Protocol>().unwrap(), Protocol::Other(89));

        assert!("icmpv6-ish".parse::<Protocol>().is_err());
        assert!("".parse::<Protocol>().is_err());
        assert!("300".parse::<Protocol>().is_err());
    }

    // ---- 2. classification ----

    #[test]
    fn classify_is_deterministic() {
        let headers = Headers::udp(addr("10.0.0.1"), 49152, addr("10.0.0.2"), 9);

        assert_eq!(headers.classify(), headers.classify());
        assert_eq!(FlowKey::from(headers), headers.classify());
    }

    #[test]
    fn classify_portless_falls_back_to_zero() {
        let headers = Headers::ip(Protocol::Other(1), addr("10.0.0.1"), addr("10.0.0.2"));
        let key = headers.classify();

        assert_eq!(key.source_port, 0);
        assert_eq!(key.destination_port, 0);
        assert_eq!(key.protocol, Protocol::Other(1));
    }

    #[test]
    fn flows_are_unidirectional() {
        let forward = Headers::tcp(addr("10.0.0.1"), 1234, addr("10.0.0.2"), 80).classify();
        let reverse = Headers::tcp(addr("10.0.0.2"), 80, addr("10.0.0.1"), 1234).classify();

        assert_ne!(forward, reverse);
    }

    #[test]
    fn ports_isolate_flows() {
        let a = Headers::udp(addr("10.0.0.1"), 49152, addr("10.0.0.2"), 9).classify();
        let b = Headers::udp(addr("10.0.0.1"), 49153, addr("10.0.0.2"), 9).classify();

        assert_ne!(a, b);
    }

    #[test]
    fn protocols_isolate_flows() {
        let udp = Headers::udp(addr("10.0.0.1"), 5000, addr("10.0.0.2"), 5000).classify();
        let tcp = Headers::tcp(addr("10.0.0.1"), 5000, addr("10.0.0.2"), 5000).classify();

        assert_ne!(udp, tcp);
    }

    #[test]
    fn explicit_port_zero_equals_sentinel() {
        // a producer that maps "no port" to 0 itself lands in the same
        // flow as one using the portless constructor
        let explicit = Headers {
            protocol: Protocol::Other(1),
            source: addr("10.0.0.1"),
            source_port: Some(0),
            destination: addr("10.0.0.2"),
            destination_port: Some(0),
        };
        let portless = Headers::ip(Protocol::Other(1), addr("10.0.0.1"), addr("10.0.0.2"));

        assert_eq!(explicit.classify(), portless.classify());
    }

    // ---- 3. display ----

    #[test]
    fn key_display_v4() {
        let key = Headers::udp(addr("192.168.1.10"), 49152, addr("192.168.1.20"), 9).classify();
        assert_eq!(key.to_string(), "192.168.1.10:49152 -> 192.168.1.20:9");
    }

    #[test]
    fn key_display_v6() {
        let key = Headers::tcp(addr("fe80::1"), 22, addr("fe80::2"), 60000).classify();
        assert_eq!(key.to_string(), "fe80::1:22 -> fe80::2:60000");
    }
}
