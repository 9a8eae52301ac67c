//! Public-address discovery through a reflection service.
//!
//! One binding-request round trip over UDP (RFC 5389 subset): we send a
//! 20-byte request and read the mapped address out of the response,
//! preferring XOR-MAPPED-ADDRESS and falling back to MAPPED-ADDRESS for
//! older servers. Anything beyond that single attribute is ignored.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Binding message header size.
const HEADER_LEN: usize = 20;

/// Magic cookie value (RFC 5389).
const MAGIC_COOKIE: u32 = 0x2112A442;

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_RESPONSE: u16 = 0x0101;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

/// Ask `server` how our packets appear from outside. Returns the observed
/// address, or an error after `wait` with no usable response.
pub async fn reflect(server: &str, wait: Duration) -> anyhow::Result<SocketAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(server).await?;

    let txid: [u8; 12] = rand::random();
    socket.send(&binding_request(&txid)).await?;

    let mut buf = [0u8; 1500];
    let n = timeout(wait, socket.recv(&mut buf))
        .await
        .map_err(|_| anyhow::anyhow!("No reflection response within {:?}", wait))??;
    parse_binding_response(&buf[..n], &txid)
}

/// Best guess at the primary local address: the source address the OS picks
/// for a packet toward a public host. Nothing is actually sent.
pub async fn primary_local_ip() -> anyhow::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect("8.8.8.8:80").await?;
    Ok(socket.local_addr()?.ip())
}

/// Encode a binding request with no attributes.
pub fn binding_request(txid: &[u8; 12]) -> [u8; HEADER_LEN] {
    let mut packet = [0u8; HEADER_LEN];
    packet[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Length bytes stay zero: the request carries no attributes.
    packet[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    packet[8..20].copy_from_slice(txid);
    packet
}

/// Extract the mapped address from a binding response to `txid`.
pub fn parse_binding_response(packet: &[u8], txid: &[u8; 12]) -> anyhow::Result<SocketAddr> {
    if packet.len() < HEADER_LEN {
        anyhow::bail!("Packet too small for a binding response");
    }
    let msg_type = u16::from_be_bytes([packet[0], packet[1]]);
    if msg_type != BINDING_RESPONSE {
        anyhow::bail!("Unexpected message type: {:#06x}", msg_type);
    }
    let msg_len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    let cookie = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    if cookie != MAGIC_COOKIE {
        anyhow::bail!("Invalid magic cookie");
    }
    if &packet[8..HEADER_LEN] != txid {
        anyhow::bail!("Transaction id mismatch");
    }
    if packet.len() < HEADER_LEN + msg_len {
        anyhow::bail!("Packet too small for its declared attributes");
    }

    let end = HEADER_LEN + msg_len;
    let mut offset = HEADER_LEN;
    let mut plain = None;
    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([packet[offset], packet[offset + 1]]);
        let attr_len = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
        offset += 4;
        if offset + attr_len > end {
            anyhow::bail!("Attribute overruns packet");
        }
        let value = &packet[offset..offset + attr_len];
        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => return decode_address(value, Some(txid)),
            ATTR_MAPPED_ADDRESS => plain = Some(decode_address(value, None)?),
            _ => {}
        }
        // Attribute values are padded to a 4-byte boundary.
        offset += attr_len + (4 - attr_len % 4) % 4;
    }
    plain.ok_or_else(|| anyhow::anyhow!("Response carries no mapped address"))
}

/// Decode an address attribute value, un-XORing when `xor_txid` is given.
fn decode_address(value: &[u8], xor_txid: Option<&[u8; 12]>) -> anyhow::Result<SocketAddr> {
    if value.len() < 8 {
        anyhow::bail!("Address attribute too short");
    }
    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if xor_txid.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let ip = match family {
        1 => {
            let mut octets = [value[4], value[5], value[6], value[7]];
            if xor_txid.is_some() {
                for (octet, key) in octets.iter_mut().zip(cookie) {
                    *octet ^= key;
                }
            }
            IpAddr::from(octets)
        }
        2 => {
            if value.len() < 20 {
                anyhow::bail!("Address attribute too short for IPv6");
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            if let Some(txid) = xor_txid {
                for (octet, key) in octets.iter_mut().zip(cookie.iter().chain(txid)) {
                    *octet ^= key;
                }
            }
            IpAddr::from(octets)
        }
        other => anyhow::bail!("Unsupported address family: {}", other),
    };
    Ok(SocketAddr::new(ip, port))
}
