// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Shared framing helpers. All three protocol layers use the same shape:
//! one ASCII header line terminated by `\n`, then a length-delimited body.

use crate::envelope::{RequestEnvelope, ResponseEnvelope, Status};
use crate::error::NetError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body; anything larger is treated as a
/// protocol error rather than an allocation request.
pub const MAX_BODY_SIZE: usize = 1 << 30;

/// Reads one `\n`-terminated header line. `Ok(None)` means the peer closed
/// the connection cleanly before sending another request.
pub async fn read_header_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<String>, NetError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    size: usize,
) -> Result<Vec<u8>, NetError> {
    if size > MAX_BODY_SIZE {
        return Err(NetError::Protocol(format!("body size {size} too large")));
    }
    let mut body = vec![0u8; size];
    tokio::io::AsyncReadExt::read_exact(reader, &mut body).await?;
    Ok(body)
}

pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<RequestEnvelope>, NetError> {
    let Some(line) = read_header_line(reader).await? else {
        return Ok(None);
    };
    let (version, service, size) = RequestEnvelope::parse_header(&line)?;
    let body = read_body(reader, size).await?;
    Ok(Some(RequestEnvelope {
        version,
        service,
        body,
    }))
}

pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<ResponseEnvelope, NetError> {
    let line = read_header_line(reader)
        .await?
        .ok_or_else(|| NetError::Protocol("connection closed before response".into()))?;
    let (version, service, status, size) = ResponseEnvelope::parse_header(&line)?;
    let body = read_body(reader, size).await?;
    Ok(ResponseEnvelope {
        version,
        service,
        status,
        body,
    })
}

pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    req: &RequestEnvelope,
) -> Result<(), NetError> {
    writer.write_all(req.header_line().as_bytes()).await?;
    writer.write_all(&req.body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    res: &ResponseEnvelope,
) -> Result<(), NetError> {
    writer.write_all(res.header_line().as_bytes()).await?;
    writer.write_all(&res.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Splits a service payload into its header line and the remaining bytes.
/// Every inner message reuses the `header '\n' body` shape.
pub fn split_frame(data: &[u8]) -> Result<(&str, &[u8]), NetError> {
    let pos = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| NetError::Protocol("missing frame header terminator".into()))?;
    let header = std::str::from_utf8(&data[..pos])
        .map_err(|_| NetError::Protocol("frame header is not ASCII".into()))?;
    Ok((header, &data[pos + 1..]))
}

/// Checks a frame body against its declared size.
pub fn check_size(body: &[u8], declared: usize) -> Result<(), NetError> {
    if body.len() != declared {
        return Err(NetError::Protocol(format!(
            "frame size mismatch: declared {declared}, got {}",
            body.len()
        )));
    }
    Ok(())
}

/// `true` when the response status says the peer handled the request.
pub fn is_ok(status: Status) -> bool {
    matches!(status, Status::Ok)
}
