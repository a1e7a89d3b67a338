use crate::gateway::GatewayError;

/// S3 caps part numbers at 10,000.
pub const MAX_PART_NUMBER: u32 = 10_000;

pub fn validate_bucket(bucket: &str) -> Result<(), GatewayError> {
    if bucket.is_empty() {
        return Err(GatewayError::InvalidInput(
            "bucket must be non-empty".into(),
        ));
    }
    Ok(())
}

pub fn validate_key(key: &str) -> Result<(), GatewayError> {
    if key.is_empty() {
        return Err(GatewayError::InvalidInput("key must be non-empty".into()));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(GatewayError::InvalidInput("key cannot contain ..".into()));
    }
    Ok(())
}

pub fn validate_part_number(part_number: u32) -> Result<(), GatewayError> {
    if part_number == 0 || part_number > MAX_PART_NUMBER {
        return Err(GatewayError::InvalidPart(format!(
            "part number {} outside 1..={}",
            part_number, MAX_PART_NUMBER
        )));
    }
    Ok(())
}

pub fn compute_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// ETag of an assembled multipart object: md5 over the part digests, suffixed with the part count.
pub fn compute_multipart_etag(part_etags: &[String]) -> String {
    let mut digests = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        match hex::decode(etag.trim_matches('"')) {
            Ok(raw) => digests.extend_from_slice(&raw),
            Err(_) => digests.extend_from_slice(etag.as_bytes()),
        }
    }
    format!("{:x}-{}", md5::compute(&digests), part_etags.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_segments() {
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a/..b").is_ok());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn part_number_bounds() {
        assert!(validate_part_number(0).is_err());
        assert!(validate_part_number(1).is_ok());
        assert!(validate_part_number(MAX_PART_NUMBER).is_ok());
        assert!(validate_part_number(MAX_PART_NUMBER + 1).is_err());
    }

    #[test]
    fn multipart_etag_carries_part_count() {
        let parts = vec![compute_etag(b"a"), compute_etag(b"b")];
        let etag = compute_multipart_etag(&parts);
        assert!(etag.ends_with("-2"));
        assert_eq!(etag.len(), 32 + 2);
    }
}
