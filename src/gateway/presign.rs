// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! AWS SigV4 query-string presigning for path-style URLs.

use crate::gateway::GatewayError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SigV4 refuses expirations beyond seven days.
pub const MAX_EXPIRES_SECS: u64 = 7 * 24 * 3600;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Generate a presigned URL for `method` on `bucket/key`, valid for `expires_secs`.
///
/// Only `host` is supported in `signed_headers`; the payload is left unsigned.
#[allow(clippy::too_many_arguments)]
pub fn generate_presigned_url(
    endpoint: &str,
    bucket: &str,
    key: &str,
    method: &str,
    expires_secs: u64,
    access_key: &str,
    secret_key: &str,
    region: &str,
    signed_headers: &[&str],
) -> Result<String, GatewayError> {
    presign_at(
        Utc::now(),
        endpoint,
        bucket,
        key,
        method,
        expires_secs,
        access_key,
        secret_key,
        region,
        signed_headers,
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn presign_at(
    now: DateTime<Utc>,
    endpoint: &str,
    bucket: &str,
    key: &str,
    method: &str,
    expires_secs: u64,
    access_key: &str,
    secret_key: &str,
    region: &str,
    signed_headers: &[&str],
) -> Result<String, GatewayError> {
    if expires_secs == 0 || expires_secs > MAX_EXPIRES_SECS {
        return Err(GatewayError::InvalidInput(format!(
            "expiry must be within 1..={} seconds",
            MAX_EXPIRES_SECS
        )));
    }
    let endpoint = endpoint.trim_end_matches('/');
    let host = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| GatewayError::InvalidInput(format!("endpoint needs a scheme: {endpoint}")))?;

    let mut headers: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    headers.sort();
    headers.dedup();
    if headers.is_empty() {
        headers.push("host".to_string());
    }
    let mut canonical_headers = String::new();
    for h in &headers {
        match h.as_str() {
            "host" => canonical_headers.push_str(&format!("host:{host}\n")),
            other => {
                return Err(GatewayError::InvalidInput(format!(
                    "unsupported signed header: {other}"
                )))
            }
        }
    }
    let signed_headers = headers.join(";");

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let canonical_uri = format!("/{}/{}", uri_encode(bucket, true), uri_encode(key, false));

    // Already in sorted order.
    let canonical_query = [
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        (
            "X-Amz-Credential",
            uri_encode(&format!("{access_key}/{scope}"), true),
        ),
        ("X-Amz-Date", amz_date.clone()),
        ("X-Amz-Expires", expires_secs.to_string()),
        ("X-Amz-SignedHeaders", uri_encode(&signed_headers, true)),
    ]
    .iter()
    .map(|(k, v)| format!("{k}={v}"))
    .collect::<Vec<_>>()
    .join("&");

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sign(format!("AWS4{secret_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sign(&k_date, region.as_bytes())?;
    let k_service = hmac_sign(&k_region, SERVICE.as_bytes())?;
    let k_signing = hmac_sign(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sign(&k_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "{endpoint}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}"
    ))
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sign(key: &[u8], data: &[u8]) -> Result<Vec<u8>, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Internal(format!("hmac key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding as SigV4 expects it: unreserved characters pass through.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
