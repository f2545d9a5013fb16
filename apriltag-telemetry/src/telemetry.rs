//! Telemetry schema and publishing to the network table.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{datagram_socket::SendComplete, pose::PoseAngles, Error, Result};

/// Tag ID published when a frame contains no detection.
pub const SENTINEL_TAG_ID: i32 = 2228;

/// The default UDP address of the network table bridge.
///
/// The datagrams are not NetworkTables protocol messages. A bridge process
/// on the robot receives them and writes the entries into the table. The port
/// is in the range reserved for team use on the robot network.
pub const DEFAULT_BRIDGE_ADDR: &str = "10.22.28.2:5800";

/// The default name of the network table.
pub const DEFAULT_TABLE_NAME: &str = "AprilTag";

/// The keys written to the network table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKey {
    TagId,
    Pitch,
    Tx,
    Tz,
}

impl TableKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKey::TagId => "Tag ID",
            TableKey::Pitch => "Pitch",
            TableKey::Tx => "TX",
            TableKey::Tz => "TZ",
        }
    }
}

/// Round `a` to `decimals` decimal places.
pub fn round_to(a: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (a * scale).round() / scale
}

/// The telemetry published for an accepted detection.
///
/// Yaw, roll and ty are computed but not published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub tag_id: i32,
    /// Pitch in degrees, rounded to 2 decimals.
    pub pitch_deg: f64,
    /// Rounded to 4 decimals.
    pub tx: f64,
    /// Rounded to 4 decimals.
    pub tz: f64,
}

impl TelemetryRecord {
    pub fn new(tag_id: i32, pose: &PoseAngles) -> Self {
        Self {
            tag_id,
            pitch_deg: round_to(pose.pitch_deg, 2),
            tx: round_to(pose.tx, 4),
            tz: round_to(pose.tz, 4),
        }
    }
}

impl std::fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Tag ID: {} TZ: {:.4} TX: {:.4} Pitch: {:.2}",
            self.tag_id, self.tz, self.tx, self.pitch_deg
        )
    }
}

/// One publish action: either a record or the "no detection" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Detection(TelemetryRecord),
    NoDetection,
}

impl Telemetry {
    /// The key/value pairs written for this message, in write order.
    pub fn entries(&self) -> Vec<(TableKey, f64)> {
        match self {
            Telemetry::Detection(rec) => vec![
                (TableKey::TagId, rec.tag_id as f64),
                (TableKey::Pitch, rec.pitch_deg),
                (TableKey::Tx, rec.tx),
                (TableKey::Tz, rec.tz),
            ],
            Telemetry::NoDetection => vec![(TableKey::TagId, SENTINEL_TAG_ID as f64)],
        }
    }
}

/// Writes telemetry to the shared table.
pub trait TelemetryPublisher {
    /// Publish without waiting for delivery confirmation.
    fn publish(&mut self, msg: &Telemetry) -> Result<()>;
}

impl<P: TelemetryPublisher + ?Sized> TelemetryPublisher for Box<P> {
    fn publish(&mut self, msg: &Telemetry) -> Result<()> {
        (**self).publish(msg)
    }
}

/// A single number written to the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub key: String,
    pub value: f64,
}

/// The datagram sent for each publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableUpdate {
    pub table: String,
    pub entries: Vec<TableEntry>,
}

impl TableUpdate {
    pub fn new(table: &str, msg: &Telemetry) -> Self {
        Self {
            table: table.to_string(),
            entries: msg
                .entries()
                .into_iter()
                .map(|(key, value)| TableEntry {
                    key: key.as_str().to_string(),
                    value,
                })
                .collect(),
        }
    }

    /// Encode as self-describing CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut vec = Vec::new();
        {
            let mut serializer = serde_cbor::ser::Serializer::new(&mut vec);
            serializer.self_describe()?;
            self.serialize(&mut serializer)?;
        }
        Ok(vec)
    }
}

/// Resolve `bridge_addr` (`HOST:PORT`) to a socket address.
pub fn resolve_bridge_addr(bridge_addr: &str) -> Result<SocketAddr> {
    bridge_addr
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve bridge address \"{bridge_addr}\": {e}")))?
        .next()
        .ok_or_else(|| Error::Config(format!("no address found for \"{bridge_addr}\"")))
}

/// Publishes each message as a CBOR datagram over UDP to the network table
/// bridge.
pub struct UdpTablePublisher {
    socket: UdpSocket,
    table: String,
}

impl UdpTablePublisher {
    pub fn connect(bridge_addr: SocketAddr, table: &str) -> Result<Self> {
        let local: SocketAddr = if bridge_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(bridge_addr)?;
        socket.set_nonblocking(true)?;
        debug!(
            "publishing table \"{table}\" from {} to {bridge_addr}",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            table: table.to_string(),
        })
    }
}

impl TelemetryPublisher for UdpTablePublisher {
    fn publish(&mut self, msg: &Telemetry) -> Result<()> {
        let buf = TableUpdate::new(&self.table, msg).to_cbor()?;
        self.socket.send_complete(&buf)
    }
}
