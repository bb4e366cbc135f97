// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Service payloads. Each message reuses the envelope's framing shape: an
//! ASCII header line of integers, then a length-delimited body. Operand
//! data stays opaque bytes here; the crypto layer owns its meaning.

use crate::envelope::Status;
use crate::error::NetError;
use crate::frame::{check_size, split_frame};

fn parse_u32(tok: Option<&str>, what: &str) -> Result<u32, NetError> {
    tok.ok_or_else(|| NetError::Protocol(format!("missing {what}")))?
        .parse::<u32>()
        .map_err(|e| NetError::Protocol(format!("bad {what}: {e}")))
}

fn parse_u64(tok: Option<&str>, what: &str) -> Result<u64, NetError> {
    tok.ok_or_else(|| NetError::Protocol(format!("missing {what}")))?
        .parse::<u64>()
        .map_err(|e| NetError::Protocol(format!("bad {what}: {e}")))
}

// ---- compute service ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Unary = 0,
    Binary = 1,
    Ternary = 2,
}

impl OpKind {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(OpKind::Unary),
            1 => Ok(OpKind::Binary),
            2 => Ok(OpKind::Ternary),
            other => Err(NetError::Protocol(format!("unknown operation kind {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Decrypt = 0,
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Divide = 4,
}

impl Operation {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(Operation::Decrypt),
            1 => Ok(Operation::Add),
            2 => Ok(Operation::Subtract),
            3 => Ok(Operation::Multiply),
            4 => Ok(Operation::Divide),
            other => Err(NetError::Protocol(format!("unknown operation {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Single = 0,
    Tensor = 1,
    TensorId = 2,
}

impl OperandKind {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(OperandKind::Single),
            1 => Ok(OperandKind::Tensor),
            2 => Ok(OperandKind::TensorId),
            other => Err(NetError::Protocol(format!("unknown operand kind {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encryption {
    Plain = 0,
    Cipher = 1,
}

impl Encryption {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(Encryption::Plain),
            1 => Ok(Encryption::Cipher),
            other => Err(NetError::Protocol(format!(
                "unknown operand encryption {other}"
            ))),
        }
    }
}

/// One operand of a compute operation: its kind, its encryption, and the
/// serialized value (text scalar or binary tensor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub encryption: Encryption,
    pub data: Vec<u8>,
}

impl Operand {
    pub fn new(kind: OperandKind, encryption: Encryption, data: Vec<u8>) -> Self {
        Operand {
            kind,
            encryption,
            data,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(
            format!(
                "{} {} {}\n",
                self.kind as u32,
                self.encryption as u32,
                self.data.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&self.data);
        out.push(b'\n');
    }

    /// Parses `count` consecutive operands.
    fn parse_many(mut data: &[u8], count: usize) -> Result<Vec<Operand>, NetError> {
        let mut operands = Vec::with_capacity(count);
        for _ in 0..count {
            let (header, rest) = split_frame(data)?;
            let mut it = header.split_whitespace();
            let kind = OperandKind::from_code(parse_u32(it.next(), "operand kind")?)?;
            let encryption = Encryption::from_code(parse_u32(it.next(), "operand encryption")?)?;
            let size = parse_u64(it.next(), "operand size")? as usize;
            if rest.len() < size + 1 {
                return Err(NetError::Protocol("operand data truncated".into()));
            }
            operands.push(Operand {
                kind,
                encryption,
                data: rest[..size].to_vec(),
            });
            // skip the value and its trailing separator
            data = &rest[size + 1..];
        }
        Ok(operands)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputeRequest {
    pub op_kind: OpKind,
    pub operation: Operation,
    pub operands: Vec<Operand>,
}

impl ComputeRequest {
    pub fn new(op_kind: OpKind, operation: Operation, operands: Vec<Operand>) -> Self {
        ComputeRequest {
            op_kind,
            operation,
            operands,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!(
                "{} {} {}\n",
                self.op_kind as u32,
                self.operation as u32,
                self.operands.len()
            )
            .as_bytes(),
        );
        for operand in &self.operands {
            operand.write_to(&mut out);
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let op_kind = OpKind::from_code(parse_u32(it.next(), "operation kind")?)?;
        let operation = Operation::from_code(parse_u32(it.next(), "operation")?)?;
        let count = parse_u64(it.next(), "operand count")? as usize;
        if count > 3 {
            return Err(NetError::Protocol(format!("operand count {count} too large")));
        }
        let operands = Operand::parse_many(rest, count)?;
        Ok(ComputeRequest {
            op_kind,
            operation,
            operands,
        })
    }
}

/// `status size \n data` — shared shape for all service responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: Status,
    pub data: Vec<u8>,
}

impl ServiceResponse {
    pub fn ok(data: Vec<u8>) -> Self {
        ServiceResponse {
            status: Status::Ok,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServiceResponse {
            status: Status::Error,
            data: message.into().into_bytes(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{} {}\n", self.status as u32, self.data.len()).as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let status = Status::from_code(parse_u32(it.next(), "status")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        Ok(ServiceResponse {
            status,
            data: rest.to_vec(),
        })
    }

    /// The payload on success, the error message as an `Err` otherwise.
    pub fn into_result(self) -> Result<Vec<u8>, NetError> {
        match self.status {
            Status::Ok => Ok(self.data),
            Status::Error => Err(NetError::Protocol(format!(
                "peer reported: {}",
                String::from_utf8_lossy(&self.data)
            ))),
        }
    }
}

pub type ComputeResponse = ServiceResponse;

// ---- cofhe service ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CofheRequestKind {
    PartialDecryption = 0,
    Smpc = 1,
}

impl CofheRequestKind {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(CofheRequestKind::PartialDecryption),
            1 => Ok(CofheRequestKind::Smpc),
            other => Err(NetError::Protocol(format!(
                "unknown cofhe request kind {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CofheRequest {
    pub kind: CofheRequestKind,
    pub data: Vec<u8>,
}

impl CofheRequest {
    pub fn new(kind: CofheRequestKind, data: Vec<u8>) -> Self {
        CofheRequest { kind, data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{} {}\n", self.kind as u32, self.data.len()).as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let kind = CofheRequestKind::from_code(parse_u32(it.next(), "request kind")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        Ok(CofheRequest {
            kind,
            data: rest.to_vec(),
        })
    }
}

/// Partial decryption of a single value or a tensor. `combination` is the
/// lexicographic rank of the threshold combination the requester assembled,
/// telling the holder which of its shares applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialDecryptionRequest {
    pub combination: u64,
    pub kind: OperandKind,
    pub data: Vec<u8>,
}

impl PartialDecryptionRequest {
    pub fn new(combination: u64, kind: OperandKind, data: Vec<u8>) -> Self {
        PartialDecryptionRequest {
            combination,
            kind,
            data,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!(
                "{} {} {}\n",
                self.combination, self.kind as u32, self.data.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let combination = parse_u64(it.next(), "combination rank")?;
        let kind = OperandKind::from_code(parse_u32(it.next(), "data kind")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        Ok(PartialDecryptionRequest {
            combination,
            kind,
            data: rest.to_vec(),
        })
    }
}

// ---- setup service ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupRequestKind {
    BeaverTriplet = 0,
    JoinAsNode = 1,
    NetworkDetails = 2,
}

impl SetupRequestKind {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(SetupRequestKind::BeaverTriplet),
            1 => Ok(SetupRequestKind::JoinAsNode),
            2 => Ok(SetupRequestKind::NetworkDetails),
            other => Err(NetError::Protocol(format!(
                "unknown setup request kind {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupRequest {
    pub kind: SetupRequestKind,
    pub data: Vec<u8>,
}

impl SetupRequest {
    pub fn new(kind: SetupRequestKind, data: Vec<u8>) -> Self {
        SetupRequest { kind, data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{} {}\n", self.kind as u32, self.data.len()).as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let kind = SetupRequestKind::from_code(parse_u32(it.next(), "request kind")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        Ok(SetupRequest {
            kind,
            data: rest.to_vec(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeaverTripletRequest {
    pub count: u64,
}

impl BeaverTripletRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\n", self.count).into_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, _) = split_frame(data)?;
        let count = parse_u64(header.split_whitespace().next(), "triple count")?;
        Ok(BeaverTripletRequest { count })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinRole {
    Cofhe = 0,
    Compute = 1,
}

impl JoinRole {
    fn from_code(code: u32) -> Result<Self, NetError> {
        match code {
            0 => Ok(JoinRole::Cofhe),
            1 => Ok(JoinRole::Compute),
            other => Err(NetError::Protocol(format!("unknown join role {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    pub role: JoinRole,
    pub host: String,
    pub port: u16,
}

impl JoinRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = format!("{} {}", self.host, self.port);
        let mut out = format!("{} {}\n", self.role as u32, body.len()).into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let role = JoinRole::from_code(parse_u32(it.next(), "join role")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        let body = std::str::from_utf8(rest)
            .map_err(|_| NetError::Protocol("join body is not ASCII".into()))?;
        let mut fields = body.split_whitespace();
        let host = fields
            .next()
            .ok_or_else(|| NetError::Protocol("missing join host".into()))?
            .to_string();
        let port = fields
            .next()
            .ok_or_else(|| NetError::Protocol("missing join port".into()))?
            .parse::<u16>()
            .map_err(|e| NetError::Protocol(format!("bad join port: {e}")))?;
        Ok(JoinRequest { role, host, port })
    }
}

/// Join handshake answer. A joining cofhe node receives the network public
/// key plus its share list, one serialized share per line; a compute node
/// receives only the acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinResponse {
    pub status: Status,
    pub role: JoinRole,
    pub public_key: String,
    pub secret_key_shares: Vec<String>,
    pub error: String,
}

impl JoinResponse {
    pub fn for_cofhe(public_key: String, secret_key_shares: Vec<String>) -> Self {
        JoinResponse {
            status: Status::Ok,
            role: JoinRole::Cofhe,
            public_key,
            secret_key_shares,
            error: String::new(),
        }
    }

    pub fn for_compute() -> Self {
        JoinResponse {
            status: Status::Ok,
            role: JoinRole::Compute,
            public_key: String::new(),
            secret_key_shares: Vec::new(),
            error: String::new(),
        }
    }

    pub fn rejected(role: JoinRole, error: impl Into<String>) -> Self {
        JoinResponse {
            status: Status::Error,
            role,
            public_key: String::new(),
            secret_key_shares: Vec::new(),
            error: error.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = String::new();
        match (self.status, self.role) {
            (Status::Ok, JoinRole::Cofhe) => {
                body.push_str(&self.public_key);
                body.push('\n');
                for share in &self.secret_key_shares {
                    body.push_str(share);
                    body.push('\n');
                }
            }
            (Status::Ok, JoinRole::Compute) => {}
            (Status::Error, _) => {
                body.push_str(&self.error);
                body.push('\n');
            }
        }
        let mut out =
            format!("{} {} {}\n", self.status as u32, self.role as u32, body.len()).into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, rest) = split_frame(data)?;
        let mut it = header.split_whitespace();
        let status = Status::from_code(parse_u32(it.next(), "status")?)?;
        let role = JoinRole::from_code(parse_u32(it.next(), "role")?)?;
        let size = parse_u64(it.next(), "data size")? as usize;
        check_size(rest, size)?;
        let body = std::str::from_utf8(rest)
            .map_err(|_| NetError::Protocol("join response body is not ASCII".into()))?;
        match (status, role) {
            (Status::Ok, JoinRole::Cofhe) => {
                let mut lines = body.lines();
                let public_key = lines
                    .next()
                    .ok_or_else(|| NetError::Protocol("missing public key".into()))?
                    .to_string();
                let secret_key_shares = lines.map(str::to_string).collect();
                Ok(JoinResponse {
                    status,
                    role,
                    public_key,
                    secret_key_shares,
                    error: String::new(),
                })
            }
            (Status::Ok, JoinRole::Compute) => Ok(JoinResponse::for_compute()),
            (Status::Error, _) => Ok(JoinResponse::rejected(role, body.trim_end())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkDetailsRequestKind {
    Get = 0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkDetailsRequest {
    pub kind: NetworkDetailsRequestKind,
}

impl NetworkDetailsRequest {
    pub fn get() -> Self {
        NetworkDetailsRequest {
            kind: NetworkDetailsRequestKind::Get,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{} 0\n", self.kind as u32).into_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, NetError> {
        let (header, _) = split_frame(data)?;
        let code = parse_u32(header.split_whitespace().next(), "request kind")?;
        match code {
            0 => Ok(NetworkDetailsRequest::get()),
            other => Err(NetError::Protocol(format!(
                "unknown network details request {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_request_round_trip() {
        let req = ComputeRequest::new(
            OpKind::Binary,
            Operation::Multiply,
            vec![
                Operand::new(OperandKind::Single, Encryption::Cipher, b"1 2 3 4 5 6".to_vec()),
                Operand::new(OperandKind::Single, Encryption::Plain, b"20".to_vec()),
            ],
        );
        let back = ComputeRequest::from_bytes(&req.to_bytes()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn operand_data_may_contain_newlines() {
        // binary tensor payloads embed arbitrary bytes
        let blob = vec![0u8, b'\n', 255, b'\n', 7];
        let req = ComputeRequest::new(
            OpKind::Unary,
            Operation::Decrypt,
            vec![Operand::new(OperandKind::Tensor, Encryption::Cipher, blob.clone())],
        );
        let back = ComputeRequest::from_bytes(&req.to_bytes()).unwrap();
        assert_eq!(back.operands[0].data, blob);
    }

    #[test]
    fn partial_decryption_request_round_trip() {
        let req = PartialDecryptionRequest::new(5, OperandKind::Tensor, vec![1, 2, 3]);
        let back = PartialDecryptionRequest::from_bytes(&req.to_bytes()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn service_response_into_result() {
        let ok = ServiceResponse::ok(b"fine".to_vec());
        assert_eq!(
            ServiceResponse::from_bytes(&ok.to_bytes())
                .unwrap()
                .into_result()
                .unwrap(),
            b"fine"
        );
        let err = ServiceResponse::error("shape mismatch");
        assert!(ServiceResponse::from_bytes(&err.to_bytes())
            .unwrap()
            .into_result()
            .is_err());
    }

    #[test]
    fn join_round_trips() {
        let req = JoinRequest {
            role: JoinRole::Cofhe,
            host: "127.0.0.1".into(),
            port: 4456,
        };
        assert_eq!(JoinRequest::from_bytes(&req.to_bytes()).unwrap(), req);

        let res = JoinResponse::for_cofhe("1 2 3".into(), vec!["0 77".into(), "2 99".into()]);
        let back = JoinResponse::from_bytes(&res.to_bytes()).unwrap();
        assert_eq!(back, res);

        let rejected = JoinResponse::rejected(JoinRole::Cofhe, "no more nodes can join");
        let back = JoinResponse::from_bytes(&rejected.to_bytes()).unwrap();
        assert_eq!(back.status, Status::Error);
        assert_eq!(back.error, "no more nodes can join");
    }

    #[test]
    fn setup_and_cofhe_wrappers_round_trip() {
        let inner = BeaverTripletRequest { count: 128 };
        let outer = SetupRequest::new(SetupRequestKind::BeaverTriplet, inner.to_bytes());
        let back = SetupRequest::from_bytes(&outer.to_bytes()).unwrap();
        assert_eq!(back.kind, SetupRequestKind::BeaverTriplet);
        assert_eq!(BeaverTripletRequest::from_bytes(&back.data).unwrap(), inner);

        let cofhe = CofheRequest::new(CofheRequestKind::PartialDecryption, vec![9, 9]);
        assert_eq!(CofheRequest::from_bytes(&cofhe.to_bytes()).unwrap(), cofhe);
    }
}
