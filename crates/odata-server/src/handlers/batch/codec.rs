//! MIME multipart envelope codec.
//!
//! Decoding turns a `multipart/mixed` body into [`BatchItem`]s: each part is
//! either an `application/http` request or a nested `multipart/mixed`
//! changeset (one level deep). Encoding writes one `application/http` part
//! per response, with changeset responses grouped in a nested multipart part.
//!
//! Both CRLF and bare LF line endings are accepted. Header names are matched
//! case-insensitively. Preamble and epilogue text is ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use super::types::{
    BatchError, BatchItem, BatchRequest, BatchResponse, BatchResponseItem, BatchResult,
    ChangesetMember, EncodedBatch, MalformedPart,
};
use crate::request::{SubRequest, SubResponse};

const CRLF: &[u8] = b"\r\n";
const BATCH_RESPONSE_PREFIX: &str = "batchresponse_";
const CHANGESET_RESPONSE_PREFIX: &str = "changesetresponse_";
const MAX_BOUNDARY_ATTEMPTS: usize = 8;

/// Headers of a MIME part or embedded HTTP message, in order.
type HeaderList = Vec<(String, String)>;

fn find_header<'h>(headers: &'h HeaderList, name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Media type of a `Content-Type` value, lower-cased, without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extracts the boundary of a `multipart/*` content type.
///
/// Quoted boundaries (`boundary="a b"`) are unquoted.
pub fn parse_boundary(content_type: &str) -> BatchResult<String> {
    if !media_type(content_type).starts_with("multipart/") {
        return Err(BatchError::UnsupportedContentType {
            content_type: content_type.to_string(),
        });
    }

    for param in content_type.split(';').skip(1) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if value.is_empty() {
            return Err(BatchError::MissingBoundary);
        }
        return Ok(value.to_string());
    }
    Err(BatchError::MissingBoundary)
}

/// Strips a trailing CR and transport padding from a line.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    &line[..end]
}

/// Removes the line break that belongs to the following delimiter.
fn strip_final_newline(content: &[u8]) -> &[u8] {
    content
        .strip_suffix(CRLF)
        .or_else(|| content.strip_suffix(b"\n"))
        .unwrap_or(content)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Splits a multipart body into the raw content of its parts.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> BatchResult<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut open_part: Option<usize> = None;
    let mut offset = 0;

    while offset < body.len() {
        let line_end = body[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| offset + i);
        let next = (line_end + 1).min(body.len());
        let line = trim_line_end(&body[offset..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = open_part.take() {
                    parts.push(strip_final_newline(&body[start..offset]));
                }
                if closing {
                    return Ok(parts);
                }
                open_part = Some(next);
            }
        }
        offset = next;
    }

    Err(BatchError::Malformed(format!(
        "missing closing delimiter '{delimiter}--'"
    )))
}

/// Reads a header block up to the first empty line.
///
/// Returns the headers and the remaining bytes. A block with no empty line is
/// all headers and no body.
fn split_header_block(content: &[u8]) -> Result<(Vec<&str>, &[u8]), String> {
    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < content.len() {
        let line_end = content[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(content.len(), |i| offset + i);
        let next = (line_end + 1).min(content.len());
        let line = trim_line_end(&content[offset..line_end]);
        if line.is_empty() {
            return Ok((lines, &content[next..]));
        }
        let line =
            std::str::from_utf8(line).map_err(|_| "header block is not valid UTF-8".to_string())?;
        lines.push(line);
        offset = next;
    }
    Ok((lines, &content[content.len()..]))
}

fn parse_headers(lines: &[&str]) -> Result<HeaderList, String> {
    let mut headers: HeaderList = Vec::with_capacity(lines.len());
    for line in lines {
        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            match headers.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
                None => return Err(format!("unexpected header continuation '{line}'")),
            }
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed header line '{line}'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("malformed header line '{line}'"));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

struct MimePart<'a> {
    headers: HeaderList,
    body: &'a [u8],
}

fn parse_mime_part(content: &[u8]) -> Result<MimePart<'_>, String> {
    let (lines, body) = split_header_block(content)?;
    Ok(MimePart {
        headers: parse_headers(&lines)?,
        body,
    })
}

/// Parses an `application/http` part body into a request.
fn parse_http_request(content: &[u8], content_id: Option<String>) -> Result<SubRequest, String> {
    // Clients commonly put a blank line between the part headers and the
    // request line.
    let content = &content[content
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(content.len())..];
    let (lines, body) = split_header_block(content)?;
    let (request_line, header_lines) = lines
        .split_first()
        .ok_or_else(|| "missing request line".to_string())?;

    let mut tokens = request_line.split_whitespace();
    let (method, target) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(target), None, None) => (method, target),
        (Some(method), Some(target), Some(version), None) if version.starts_with("HTTP/") => {
            (method, target)
        }
        _ => return Err(format!("malformed request line '{request_line}'")),
    };
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| format!("invalid method '{method}'"))?;

    let mut headers = HeaderMap::new();
    for (name, value) in parse_headers(header_lines)? {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid header name '{name}'"))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| format!("invalid value for header '{name}'"))?;
        headers.append(header_name, header_value);
    }

    Ok(SubRequest {
        method,
        url: target.to_string(),
        headers,
        body: Bytes::copy_from_slice(trim_ascii(body)),
        content_id,
    })
}

fn content_id(headers: &HeaderList) -> Option<String> {
    find_header(headers, "content-id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Decodes one member of a changeset.
fn decode_changeset_member(content: &[u8]) -> ChangesetMember {
    let part = parse_mime_part(content).map_err(|reason| MalformedPart::new(None, reason))?;
    let id = content_id(&part.headers);
    let media = find_header(&part.headers, "content-type")
        .map(media_type)
        .unwrap_or_default();
    match media.as_str() {
        "application/http" => parse_http_request(part.body, id.clone())
            .map_err(|reason| MalformedPart::new(id, reason)),
        m if m.starts_with("multipart/") => Err(MalformedPart::new(
            id,
            "changesets cannot contain nested multipart parts",
        )),
        "" => Err(MalformedPart::new(id, "part has no Content-Type")),
        other => Err(MalformedPart::new(
            id,
            format!("unsupported part content type '{other}'"),
        )),
    }
}

fn decode_item(content: &[u8]) -> BatchItem {
    let part = match parse_mime_part(content) {
        Ok(part) => part,
        Err(reason) => return BatchItem::Malformed(MalformedPart::new(None, reason)),
    };
    let id = content_id(&part.headers);
    let content_type = find_header(&part.headers, "content-type").unwrap_or_default();
    let media = media_type(content_type);

    if media.starts_with("multipart/") {
        let members = parse_boundary(content_type)
            .and_then(|boundary| split_parts(part.body, &boundary));
        return match members {
            Ok(members) => BatchItem::Changeset(
                members.into_iter().map(decode_changeset_member).collect(),
            ),
            Err(e) => BatchItem::Malformed(MalformedPart::new(id, format!("invalid changeset: {e}"))),
        };
    }

    match media.as_str() {
        "application/http" => match parse_http_request(part.body, id.clone()) {
            Ok(request) => BatchItem::Request(request),
            Err(reason) => BatchItem::Malformed(MalformedPart::new(id, reason)),
        },
        "" => BatchItem::Malformed(MalformedPart::new(id, "part has no Content-Type")),
        other => BatchItem::Malformed(MalformedPart::new(
            id,
            format!("unsupported part content type '{other}'"),
        )),
    }
}

/// Decodes a `$batch` request body.
///
/// Fails only when the envelope itself is unusable; malformed parts are kept
/// as [`BatchItem::Malformed`] in their slot.
pub fn decode(content_type: &str, body: &[u8]) -> BatchResult<BatchRequest> {
    let boundary = parse_boundary(content_type)?;
    let items = split_parts(body, &boundary)?
        .into_iter()
        .map(decode_item)
        .collect();
    Ok(BatchRequest::new(boundary, items))
}

// ============================================================
// Encoding
// ============================================================

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(e) => {
            warn!(error = %e, "random source unavailable, using timestamp boundary");
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let sequence = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("{nanos:x}{sequence:04x}")
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Picks a boundary that differs from `avoid` and occurs in none of `bodies`.
fn choose_boundary(prefix: &str, avoid: &str, bodies: &[&[u8]]) -> String {
    let mut boundary = format!("{prefix}{}", random_token());
    for _ in 1..MAX_BOUNDARY_ATTEMPTS {
        let delimiter = format!("--{boundary}");
        let clashes = boundary == avoid
            || bodies
                .iter()
                .any(|body| contains(body, delimiter.as_bytes()));
        if !clashes {
            break;
        }
        boundary = format!("{prefix}{}", random_token());
    }
    boundary
}

/// Display form of a header name (`odata-version` → `OData-Version`).
fn display_name(name: &str) -> String {
    match name {
        "odata-version" => "OData-Version".to_string(),
        "odata-maxversion" => "OData-MaxVersion".to_string(),
        "content-id" => "Content-ID".to_string(),
        "etag" => "ETag".to_string(),
        _ => name
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join("-"),
    }
}

fn put_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(CRLF);
}

fn encode_response_part(out: &mut BytesMut, boundary: &str, response: &SubResponse) {
    out.put_slice(format!("--{boundary}").as_bytes());
    out.put_slice(CRLF);
    put_header(out, "Content-Type", b"application/http");
    put_header(out, "Content-Transfer-Encoding", b"binary");
    if let Some(id) = &response.content_id {
        put_header(out, "Content-ID", id.as_bytes());
    }
    out.put_slice(CRLF);

    let status = response.status;
    out.put_slice(
        format!(
            "HTTP/1.1 {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .as_bytes(),
    );
    out.put_slice(CRLF);
    for (name, value) in &response.headers {
        put_header(out, &display_name(name.as_str()), value.as_bytes());
    }
    out.put_slice(CRLF);
    out.put_slice(&response.body);
    out.put_slice(CRLF);
}

fn put_close(out: &mut BytesMut, boundary: &str) {
    out.put_slice(format!("--{boundary}--").as_bytes());
    out.put_slice(CRLF);
}

/// Encodes batch responses into a multipart body with a fresh boundary.
pub fn encode(response: &BatchResponse, request_boundary: &str) -> EncodedBatch {
    let bodies: Vec<&[u8]> = response.responses().map(|r| r.body.as_ref()).collect();
    let boundary = choose_boundary(BATCH_RESPONSE_PREFIX, request_boundary, &bodies);

    let mut out = BytesMut::new();
    for item in &response.items {
        match item {
            BatchResponseItem::Single(single) => encode_response_part(&mut out, &boundary, single),
            BatchResponseItem::Changeset(responses) => {
                let inner_bodies: Vec<&[u8]> = responses.iter().map(|r| r.body.as_ref()).collect();
                let changeset_boundary =
                    choose_boundary(CHANGESET_RESPONSE_PREFIX, &boundary, &inner_bodies);

                out.put_slice(format!("--{boundary}").as_bytes());
                out.put_slice(CRLF);
                put_header(
                    &mut out,
                    "Content-Type",
                    format!("multipart/mixed; boundary={changeset_boundary}").as_bytes(),
                );
                out.put_slice(CRLF);
                for response in responses {
                    encode_response_part(&mut out, &changeset_boundary, response);
                }
                put_close(&mut out, &changeset_boundary);
                out.put_slice(CRLF);
            }
        }
    }
    put_close(&mut out, &boundary);

    EncodedBatch {
        content_type: format!("multipart/mixed; boundary={boundary}"),
        body: out.freeze(),
    }
}

// ============================================================
// Response decoding
// ============================================================

fn parse_http_response(content: &[u8], content_id: Option<String>) -> BatchResult<SubResponse> {
    let (lines, body) = split_header_block(content).map_err(BatchError::Malformed)?;
    let (status_line, header_lines) = lines
        .split_first()
        .ok_or_else(|| BatchError::Malformed("missing status line".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| BatchError::Malformed(format!("malformed status line '{status_line}'")))?;

    let mut headers = HeaderMap::new();
    for (name, value) in parse_headers(header_lines).map_err(BatchError::Malformed)? {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    Ok(SubResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(body),
        content_id,
    })
}

fn decode_response_part(content: &[u8]) -> BatchResult<SubResponse> {
    let part = parse_mime_part(content).map_err(BatchError::Malformed)?;
    parse_http_response(part.body, content_id(&part.headers))
}

/// Decodes a multipart batch response.
///
/// The inverse of [`encode`], for clients and tests.
pub fn decode_responses(content_type: &str, body: &[u8]) -> BatchResult<BatchResponse> {
    let boundary = parse_boundary(content_type)?;
    let mut items = Vec::new();
    for content in split_parts(body, &boundary)? {
        let part = parse_mime_part(content).map_err(BatchError::Malformed)?;
        let part_type = find_header(&part.headers, "content-type").unwrap_or_default();
        if media_type(part_type).starts_with("multipart/") {
            let inner = parse_boundary(part_type)?;
            let responses = split_parts(part.body, &inner)?
                .into_iter()
                .map(decode_response_part)
                .collect::<BatchResult<Vec<_>>>()?;
            items.push(BatchResponseItem::Changeset(responses));
        } else {
            items.push(BatchResponseItem::Single(parse_http_response(
                part.body,
                content_id(&part.headers),
            )?));
        }
    }
    Ok(BatchResponse { items })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "batch_36522ad7";
    const CONTENT_TYPE: &str = "multipart/mixed; boundary=batch_36522ad7";

    fn request(item: &BatchItem) -> &SubRequest {
        match item {
            BatchItem::Request(request) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(parse_boundary(CONTENT_TYPE).unwrap(), BOUNDARY);
        assert_eq!(
            parse_boundary(r#"Multipart/Mixed; charset=utf-8; Boundary="a b""#).unwrap(),
            "a b"
        );
        assert_eq!(
            parse_boundary("application/json").unwrap_err(),
            BatchError::UnsupportedContentType {
                content_type: "application/json".to_string()
            }
        );
        assert_eq!(
            parse_boundary("multipart/mixed").unwrap_err(),
            BatchError::MissingBoundary
        );
        assert_eq!(
            parse_boundary("multipart/mixed; boundary=").unwrap_err(),
            BatchError::MissingBoundary
        );
    }

    #[test]
    fn test_decode_requests_and_changeset() {
        let body = "preamble text\r\n\
            --batch_36522ad7\r\n\
            Content-Type: application/http\r\n\
            Content-Transfer-Encoding: binary\r\n\
            \r\n\
            GET People(1) HTTP/1.1\r\n\
            Accept: application/json\r\n\
            \r\n\
            \r\n\
            --batch_36522ad7\r\n\
            Content-Type: multipart/mixed; boundary=changeset_77162fcd\r\n\
            \r\n\
            --changeset_77162fcd\r\n\
            Content-Type: application/http\r\n\
            Content-ID: 1\r\n\
            \r\n\
            POST People HTTP/1.1\r\n\
            Content-Type: application/json\r\n\
            \r\n\
            {\"ID\": 1, \"Name\": \"Ada\"}\r\n\
            --changeset_77162fcd\r\n\
            Content-Type: application/http\r\n\
            Content-ID: 2\r\n\
            \r\n\
            DELETE People(2) HTTP/1.1\r\n\
            \r\n\
            --changeset_77162fcd--\r\n\
            --batch_36522ad7--\r\n\
            epilogue";

        let batch = decode(CONTENT_TYPE, body.as_bytes()).unwrap();
        assert_eq!(batch.boundary, BOUNDARY);
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.part_count(), 3);

        let get = request(&batch.items[0]);
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.url, "People(1)");
        assert_eq!(get.header("accept"), Some("application/json"));
        assert!(get.body.is_empty());

        let BatchItem::Changeset(members) = &batch.items[1] else {
            panic!("expected a changeset");
        };
        let post = members[0].as_ref().unwrap();
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.content_id.as_deref(), Some("1"));
        assert_eq!(post.body, Bytes::from_static(br#"{"ID": 1, "Name": "Ada"}"#));
        let delete = members[1].as_ref().unwrap();
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(delete.content_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_decode_accepts_bare_lf_and_header_case() {
        let body = "--b\n\
            CONTENT-TYPE: Application/HTTP\n\
            content-id: x1\n\
            \n\
            GET People\n\
            \n\
            --b--\n";
        let batch = decode("multipart/mixed; boundary=b", body.as_bytes()).unwrap();
        let get = request(&batch.items[0]);
        assert_eq!(get.url, "People");
        assert_eq!(get.content_id.as_deref(), Some("x1"));
    }

    #[test]
    fn test_decode_empty_batch() {
        let batch = decode("multipart/mixed; boundary=b", b"--b--\r\n").unwrap();
        assert!(batch.items.is_empty());
    }

    #[test]
    fn test_decode_missing_close_is_envelope_error() {
        let body = "--b\r\nContent-Type: application/http\r\n\r\nGET People HTTP/1.1\r\n\r\n";
        let err = decode("multipart/mixed; boundary=b", body.as_bytes()).unwrap_err();
        assert!(matches!(err, BatchError::Malformed(_)));
    }

    #[test]
    fn test_decode_malformed_parts_keep_their_slot() {
        let body = "--b\r\n\
            Content-Type: text/plain\r\n\
            Content-ID: 9\r\n\
            \r\n\
            hello\r\n\
            --b\r\n\
            Content-Type: application/http\r\n\
            \r\n\
            NOT A REQUEST LINE AT ALL\r\n\
            --b\r\n\
            Content-Type: application/http\r\n\
            \r\n\
            GET People HTTP/1.1\r\n\
            --b--";
        let batch = decode("multipart/mixed; boundary=b", body.as_bytes()).unwrap();
        assert_eq!(batch.items.len(), 3);
        match &batch.items[0] {
            BatchItem::Malformed(part) => {
                assert_eq!(part.content_id.as_deref(), Some("9"));
                assert!(part.reason.contains("text/plain"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(batch.items[1], BatchItem::Malformed(_)));
        assert_eq!(request(&batch.items[2]).url, "People");
    }

    #[test]
    fn test_nested_changeset_is_malformed_member() {
        let body = "--b\r\n\
            Content-Type: multipart/mixed; boundary=c\r\n\
            \r\n\
            --c\r\n\
            Content-Type: multipart/mixed; boundary=d\r\n\
            Content-ID: 5\r\n\
            \r\n\
            --d--\r\n\
            --c--\r\n\
            --b--\r\n";
        let batch = decode("multipart/mixed; boundary=b", body.as_bytes()).unwrap();
        let BatchItem::Changeset(members) = &batch.items[0] else {
            panic!("expected a changeset");
        };
        let malformed = members[0].as_ref().unwrap_err();
        assert_eq!(malformed.content_id.as_deref(), Some("5"));
        assert!(malformed.reason.contains("nested"));
    }

    #[test]
    fn test_encode_and_decode_responses() {
        let created = SubResponse::text(StatusCode::CREATED, "made").with_content_id(Some("1".into()));
        let response = BatchResponse {
            items: vec![
                BatchResponseItem::Single(SubResponse::text(StatusCode::OK, "first")),
                BatchResponseItem::Changeset(vec![created.clone()]),
            ],
        };
        let encoded = encode(&response, BOUNDARY);
        let boundary = parse_boundary(&encoded.content_type).unwrap();
        assert!(boundary.starts_with(BATCH_RESPONSE_PREFIX));
        assert_ne!(boundary, BOUNDARY);

        let text = std::str::from_utf8(&encoded.body).unwrap();
        assert!(text.contains("HTTP/1.1 201 Created\r\n"));
        assert!(text.contains("Content-ID: 1\r\n"));
        assert!(text.contains("OData-Version: 4.0\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: binary\r\n"));
        assert!(text.contains("boundary=changesetresponse_"));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));

        let decoded = decode_responses(&encoded.content_type, &encoded.body).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_encode_empty_response() {
        let encoded = encode(&BatchResponse::default(), BOUNDARY);
        let boundary = parse_boundary(&encoded.content_type).unwrap();
        assert_eq!(encoded.body, Bytes::from(format!("--{boundary}--\r\n")));
        assert!(decode_responses(&encoded.content_type, &encoded.body)
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn test_choose_boundary_avoids_body_content() {
        let boundary = choose_boundary("x_", "x_", &[b"--x_" as &[u8]]);
        assert!(boundary.starts_with("x_"));
        assert!(boundary.len() > 2);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("odata-version"), "OData-Version");
        assert_eq!(display_name("content-type"), "Content-Type");
        assert_eq!(display_name("location"), "Location");
        assert_eq!(display_name("x-request-id"), "X-Request-Id");
    }
}
