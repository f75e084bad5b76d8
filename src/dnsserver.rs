// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authoritative DNS server for the cross-cluster zones.
//!
//! The handler answers `A`, `CNAME` and `SOA` queries for its configured
//! zones straight out of the [`DnsCache`]; everything else is refused with
//! a sensible response code. The server side runs one UDP receive loop and
//! one TCP accept loop on tokio, both strictly read-only on the cache.
//!
//! Responses are always authoritative, never recursive, and carry a fixed
//! 30 second TTL. Reverse lookups, record enumeration, zone transfer and
//! recursion are deliberately not implemented.

use crate::constants::{
    DNS_RECORD_TTL_SECS, DNS_UDP_BUFFER_SIZE, SOA_EXPIRE_SECS, SOA_NEGATIVE_TTL_SECS,
    SOA_REFRESH_SECS, SOA_RETRY_SECS,
};
use crate::dnscache::{AddressSet, DnsCache};
use crate::metrics;
use anyhow::{Context as _, Result};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME, SOA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Answers DNS queries for a fixed set of zones from the record cache.
pub struct DnsHandler {
    cache: Arc<DnsCache>,
    zones: Vec<Name>,
}

impl DnsHandler {
    /// Create a handler serving the given zones.
    ///
    /// # Errors
    ///
    /// Returns an error when a zone name does not parse.
    pub fn new(cache: Arc<DnsCache>, zones: &[String]) -> Result<Self> {
        let zones = zones
            .iter()
            .map(|zone| {
                Name::from_str(&format!("{}.", zone.trim_end_matches('.')))
                    .with_context(|| format!("invalid zone name {zone:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { cache, zones })
    }

    /// Build the response for one request message.
    ///
    /// Failures are encoded as DNS response codes; this function never
    /// errors and never panics on hostile input.
    #[must_use]
    pub fn handle(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_authoritative(true)
            .set_recursion_desired(request.recursion_desired())
            .set_recursion_available(false);

        let Some(query) = request.queries().first().cloned() else {
            response.set_response_code(ResponseCode::FormErr);
            metrics::record_dns_query("FORMERR");
            return response;
        };
        response.add_query(query.clone());

        match self.answer(&query) {
            Ok(answers) => {
                response.set_response_code(ResponseCode::NoError);
                response.add_answers(answers);
                metrics::record_dns_query("NOERROR");
            }
            Err(code) => {
                response.set_response_code(code);
                metrics::record_dns_query(code.to_str());
            }
        }

        response
    }

    /// Resolve one query to its answer records, or to a failure code.
    fn answer(&self, query: &Query) -> std::result::Result<Vec<Record>, ResponseCode> {
        let name = query.name();

        let Some(zone) = self.zones.iter().find(|zone| zone.zone_of(name)) else {
            debug!(name = %name, "Query outside configured zones");
            return Err(ResponseCode::ServFail);
        };

        match query.query_type() {
            RecordType::SOA => Ok(vec![self.soa_record(zone)]),
            RecordType::A => self.a_records(name),
            RecordType::CNAME => self.cname_record(name),
            other => {
                debug!(name = %name, query_type = %other, "Unsupported query type");
                Err(ResponseCode::NXDomain)
            }
        }
    }

    /// One A record per IPv4 address across all entries for the name.
    /// Entries contributing CNAMEs are not emitted here.
    fn a_records(&self, name: &Name) -> std::result::Result<Vec<Record>, ResponseCode> {
        let entries = self.cache.lookup(&name.to_utf8());

        let answers: Vec<Record> = entries
            .iter()
            .filter_map(|entry| match entry.addresses {
                AddressSet::Ipv4(ref addresses) => Some(addresses),
                AddressSet::Fqdn(_) => None,
            })
            .flatten()
            .map(|address| {
                Record::from_rdata(name.clone(), DNS_RECORD_TTL_SECS, RData::A(A(*address)))
            })
            .collect();

        if answers.is_empty() {
            return Err(ResponseCode::NXDomain);
        }
        Ok(answers)
    }

    /// A CNAME answer exists only when the name resolves to a single
    /// FQDN-typed entry; its first target is the canonical name.
    fn cname_record(&self, name: &Name) -> std::result::Result<Vec<Record>, ResponseCode> {
        let entries = self.cache.lookup(&name.to_utf8());

        match entries.as_slice() {
            [entry] => match entry.addresses {
                AddressSet::Fqdn(ref targets) if !targets.is_empty() => {
                    let target = Name::from_str(&targets[0]).map_err(|_| ResponseCode::ServFail)?;
                    Ok(vec![Record::from_rdata(
                        name.clone(),
                        DNS_RECORD_TTL_SECS,
                        RData::CNAME(CNAME(target)),
                    )])
                }
                _ => Err(ResponseCode::NXDomain),
            },
            _ => Err(ResponseCode::NXDomain),
        }
    }

    /// Synthesise the zone SOA with a time-based serial.
    fn soa_record(&self, zone: &Name) -> Record {
        let mname = zone.clone();
        let rname = Name::from_str("hostmaster")
            .expect("static name")
            .append_domain(zone)
            .unwrap_or_else(|_| zone.clone());

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let serial = chrono::Utc::now().timestamp() as u32;

        Record::from_rdata(
            zone.clone(),
            DNS_RECORD_TTL_SECS,
            RData::SOA(SOA::new(
                mname,
                rname,
                serial,
                SOA_REFRESH_SECS,
                SOA_RETRY_SECS,
                SOA_EXPIRE_SECS,
                SOA_NEGATIVE_TTL_SECS,
            )),
        )
    }
}

/// UDP + TCP server front for a [`DnsHandler`].
pub struct DnsServer {
    handler: Arc<DnsHandler>,
    listen_address: String,
}

impl DnsServer {
    /// Create a server answering on the given address over UDP and TCP.
    #[must_use]
    pub fn new(handler: Arc<DnsHandler>, listen_address: String) -> Self {
        Self {
            handler,
            listen_address,
        }
    }

    /// Bind both sockets and serve until either loop fails.
    ///
    /// # Errors
    ///
    /// Returns an error when binding fails or a receive loop dies.
    pub async fn run(&self) -> Result<()> {
        let udp = UdpSocket::bind(&self.listen_address)
            .await
            .with_context(|| format!("binding UDP {}", self.listen_address))?;
        let tcp = TcpListener::bind(&self.listen_address)
            .await
            .with_context(|| format!("binding TCP {}", self.listen_address))?;

        info!(address = %self.listen_address, "DNS server listening (udp+tcp)");

        tokio::select! {
            result = self.serve_udp(udp) => result,
            result = self.serve_tcp(tcp) => result,
        }
    }

    async fn serve_udp(&self, socket: UdpSocket) -> Result<()> {
        let mut buffer = vec![0u8; DNS_UDP_BUFFER_SIZE];
        loop {
            let (length, peer) = socket
                .recv_from(&mut buffer)
                .await
                .context("receiving UDP datagram")?;

            let request = match Message::from_vec(&buffer[..length]) {
                Ok(request) => request,
                Err(error) => {
                    debug!(peer = %peer, error = %error, "Dropping unparseable datagram");
                    continue;
                }
            };

            let response = self.handler.handle(&request);
            match response.to_vec() {
                Ok(bytes) => {
                    if let Err(error) = socket.send_to(&bytes, peer).await {
                        debug!(peer = %peer, error = %error, "Failed to send UDP response");
                    }
                }
                Err(error) => warn!(error = %error, "Failed to encode DNS response"),
            }
        }
    }

    async fn serve_tcp(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await.context("accepting TCP connection")?;
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(error) = serve_tcp_connection(stream, &handler).await {
                    debug!(peer = %peer, error = %error, "TCP connection closed with error");
                }
            });
        }
    }
}

/// Serve length-prefixed DNS messages on one TCP connection until EOF.
async fn serve_tcp_connection(mut stream: TcpStream, handler: &DnsHandler) -> Result<()> {
    loop {
        let length = match stream.read_u16().await {
            Ok(length) => usize::from(length),
            // Clean EOF between messages.
            Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        let mut buffer = vec![0u8; length];
        stream.read_exact(&mut buffer).await?;

        let request = Message::from_vec(&buffer).context("parsing TCP DNS message")?;
        let response = handler.handle(&request);
        let bytes = response.to_vec().context("encoding TCP DNS response")?;

        stream.write_u16(u16::try_from(bytes.len())?).await?;
        stream.write_all(&bytes).await?;
    }
}

#[cfg(test)]
#[path = "dnsserver_tests.rs"]
mod dnsserver_tests;
