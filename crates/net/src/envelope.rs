// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Transport envelope: an ASCII header line of space-separated integers
//! followed by a length-delimited body. Requests carry
//! `version service body_size`, responses `version service status body_size`.

use crate::error::NetError;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceType {
    Compute = 1,
    Cofhe = 2,
    Setup = 3,
}

impl ServiceType {
    pub fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            1 => Ok(ServiceType::Compute),
            2 => Ok(ServiceType::Cofhe),
            3 => Ok(ServiceType::Setup),
            other => Err(NetError::Protocol(format!("unknown service type {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Error = 1,
}

impl Status {
    pub fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(Status::Ok),
            1 => Ok(Status::Error),
            other => Err(NetError::Protocol(format!("unknown status {other}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    pub version: u32,
    pub service: ServiceType,
    pub body: Vec<u8>,
}

impl RequestEnvelope {
    pub fn new(service: ServiceType, body: Vec<u8>) -> Self {
        RequestEnvelope {
            version: PROTOCOL_VERSION,
            service,
            body,
        }
    }

    pub fn header_line(&self) -> String {
        format!(
            "{} {} {}\n",
            self.version,
            self.service as u32,
            self.body.len()
        )
    }

    /// Parses `version service body_size` from a header line; the body is
    /// read separately.
    pub fn parse_header(line: &str) -> Result<(u32, ServiceType, usize), NetError> {
        let mut it = line.split_whitespace();
        let version = parse_field(&mut it, "protocol version")?;
        let service = ServiceType::from_code(parse_field(&mut it, "service type")?)?;
        let size = parse_field(&mut it, "body size")? as usize;
        Ok((version, service, size))
    }
}

#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub version: u32,
    pub service: ServiceType,
    pub status: Status,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn new(service: ServiceType, status: Status, body: Vec<u8>) -> Self {
        ResponseEnvelope {
            version: PROTOCOL_VERSION,
            service,
            status,
            body,
        }
    }

    pub fn header_line(&self) -> String {
        format!(
            "{} {} {} {}\n",
            self.version,
            self.service as u32,
            self.status as u32,
            self.body.len()
        )
    }

    pub fn parse_header(line: &str) -> Result<(u32, ServiceType, Status, usize), NetError> {
        let mut it = line.split_whitespace();
        let version = parse_field(&mut it, "protocol version")?;
        let service = ServiceType::from_code(parse_field(&mut it, "service type")?)?;
        let status = Status::from_code(parse_field(&mut it, "status")?)?;
        let size = parse_field(&mut it, "body size")? as usize;
        Ok((version, service, status, size))
    }
}

fn parse_field<'a>(
    it: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<u32, NetError> {
    it.next()
        .ok_or_else(|| NetError::Protocol(format!("missing {what}")))?
        .parse::<u32>()
        .map_err(|e| NetError::Protocol(format!("bad {what}: {e}")))
}
