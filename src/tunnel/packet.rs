//! Packets carried inside tunnel frames
//!
//! Each frame payload is expected to be one raw IP packet. Only IPv4
//! headers are decoded; anything else is passed through unparsed.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{self, Debug};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Minimum IPv4 header length
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// IANA protocol number for TCP
pub const IP_PROTO_TCP: u8 = 6;
/// IANA protocol number for UDP
pub const IP_PROTO_UDP: u8 = 17;
/// IANA protocol number for ICMP
pub const IP_PROTO_ICMP: u8 = 1;

/// Decoded fixed part of an IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (IHL * 4)
    pub header_len: usize,
    /// Total length field
    pub total_len: u16,
    /// Time to live
    pub ttl: u8,
    /// Transport protocol number
    pub protocol: u8,
    /// Source address
    pub source: Ipv4Addr,
    /// Destination address
    pub destination: Ipv4Addr,
    /// Fragment offset in 8-byte units
    pub fragment_offset: u16,
}

impl Ipv4Header {
    /// Decode the header at the start of `packet`
    ///
    /// Returns `None` for anything that is not a well-formed IPv4 header.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < IPV4_MIN_HEADER_LEN || packet[0] >> 4 != 4 {
            return None;
        }

        let header_len = usize::from(packet[0] & 0x0F) * 4;
        if header_len < IPV4_MIN_HEADER_LEN || header_len > packet.len() {
            return None;
        }

        Some(Ipv4Header {
            header_len,
            total_len: u16::from_be_bytes([packet[2], packet[3]]),
            ttl: packet[8],
            protocol: packet[9],
            source: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
            destination: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
            fragment_offset: u16::from_be_bytes([packet[6], packet[7]]) & 0x1FFF,
        })
    }

    /// Short protocol name for logs
    pub fn protocol_name(&self) -> &'static str {
        match self.protocol {
            IP_PROTO_TCP => "TCP",
            IP_PROTO_UDP => "UDP",
            IP_PROTO_ICMP => "ICMP",
            _ => "other",
        }
    }
}

/// Transport-level identity of a packet
///
/// Ports are 0 for protocols without them and for non-initial fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// Transport protocol number
    pub protocol: u8,
    /// Source endpoint
    pub source: SocketAddr,
    /// Destination endpoint
    pub destination: SocketAddr,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.source, self.destination, self.protocol)
    }
}

/// One frame payload and its decoded header, if any
#[derive(Debug, Clone)]
pub struct TunnelPacket {
    payload: Bytes,
    header: Option<Ipv4Header>,
}

impl TunnelPacket {
    /// Wrap a frame payload, decoding its IPv4 header when present
    pub fn new(payload: Bytes) -> Self {
        let header = Ipv4Header::parse(&payload);
        TunnelPacket { payload, header }
    }

    /// Raw payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Decoded IPv4 header
    pub fn header(&self) -> Option<&Ipv4Header> {
        self.header.as_ref()
    }

    /// Flow identity, for IPv4 packets
    pub fn flow_key(&self) -> Option<FlowKey> {
        let header = self.header?;
        let (src_port, dst_port) = self.ports(&header).unwrap_or((0, 0));

        Some(FlowKey {
            protocol: header.protocol,
            source: SocketAddrV4::new(header.source, src_port).into(),
            destination: SocketAddrV4::new(header.destination, dst_port).into(),
        })
    }

    fn ports(&self, header: &Ipv4Header) -> Option<(u16, u16)> {
        if !matches!(header.protocol, IP_PROTO_TCP | IP_PROTO_UDP) || header.fragment_offset != 0
        {
            return None;
        }
        let transport = self.payload.get(header.header_len..header.header_len + 4)?;
        Some((
            u16::from_be_bytes([transport[0], transport[1]]),
            u16::from_be_bytes([transport[2], transport[3]]),
        ))
    }
}

/// Consumer of packets arriving over the tunnel
#[async_trait]
pub trait PacketProcessor: Debug + Send + Sync + 'static {
    /// Handle one packet
    async fn process(&self, packet: TunnelPacket);
}

/// Counters kept by [`PacketInspector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectorStats {
    /// Decoded IPv4 packets
    pub inspected: u64,
    /// Packets that were too short or not IPv4
    pub skipped: u64,
    /// Payload bytes seen
    pub bytes: u64,
}

/// Logs and counts packets, forwarding nothing
#[derive(Debug, Default)]
pub struct PacketInspector {
    inspected: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
}

impl PacketInspector {
    /// Create an inspector with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters
    pub fn stats(&self) -> InspectorStats {
        InspectorStats {
            inspected: self.inspected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl PacketProcessor for PacketInspector {
    async fn process(&self, packet: TunnelPacket) {
        self.bytes.fetch_add(packet.len() as u64, Ordering::Relaxed);

        match (packet.header(), packet.flow_key()) {
            (Some(header), Some(flow)) => {
                self.inspected.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Packet {} -> {}, {} bytes, {}",
                    flow.source,
                    flow.destination,
                    packet.len(),
                    header.protocol_name()
                );
            }
            _ => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Skipping non-IPv4 packet of {} bytes", packet.len());
            }
        }
    }
}
