pub mod clock;
pub mod ip;

pub use clock::{Clock, ManualClock, SystemClock, elapsed_between};

/// 用 `***` 替换文本中出现的凭据，避免密钥进入日志
pub fn redact_secret(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => {
            let encoded = urlencoding::encode(secret);
            let redacted = text.replace(secret, "***");
            if encoded != secret {
                redacted.replace(encoded.as_ref(), "***")
            } else {
                redacted
            }
        }
        _ => text.to_string(),
    }
}

/// 64 位 xxHash，16 位十六进制
#[inline]
pub fn hash_hex(parts: &[&str]) -> String {
    use xxhash_rust::xxh64::Xxh64;

    let mut hasher = Xxh64::new(0);
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    format!("{:016x}", hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_secret() {
        let text = "GET https://api.example/weather?key=s3cr3t&q=x failed";
        assert_eq!(
            redact_secret(text, Some("s3cr3t")),
            "GET https://api.example/weather?key=***&q=x failed"
        );
        assert_eq!(redact_secret(text, None), text);
        assert_eq!(redact_secret(text, Some("")), text);
    }

    #[test]
    fn test_redact_secret_url_encoded() {
        let text = "key=a%2Fb failed";
        assert_eq!(redact_secret(text, Some("a/b")), "key=*** failed");
    }

    #[test]
    fn test_hash_hex_separates_parts() {
        assert_ne!(hash_hex(&["ab", "c"]), hash_hex(&["a", "bc"]));
        assert_eq!(hash_hex(&["x"]).len(), 16);
    }
}
