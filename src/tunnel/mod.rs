//! Framed packet tunnel
//!
//! Tunnel clients send raw IP packets, each wrapped in a 4-byte big-endian
//! length prefix. Packets are decoded and handed to a [`PacketProcessor`];
//! the bundled [`PacketInspector`] only logs and counts them.

mod codec;
mod packet;
mod server;

pub use codec::{encode_frame, read_frame, write_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use packet::{
    FlowKey, InspectorStats, Ipv4Header, PacketInspector, PacketProcessor, TunnelPacket,
    IPV4_MIN_HEADER_LEN, IP_PROTO_ICMP, IP_PROTO_TCP, IP_PROTO_UDP,
};
pub use server::{serve_tunnel, TunnelServer};
