//! SNI name canonicalization.

/// Domain used when the client sent no server name.
pub const FALLBACK_DOMAIN: &str = "127.0.0.1";

/// Map a requested server name onto the certificate-cache key.
///
/// One level of subdomain is treated as interchangeable: names with more than
/// two labels lose their first label, so `a.b.example.com` and
/// `c.b.example.com` share `b.example.com`.
pub fn canonical_domain(server_name: &str) -> String {
    if server_name.is_empty() {
        return FALLBACK_DOMAIN.to_string();
    }

    let labels: Vec<&str> = server_name.split('.').collect();
    if labels.len() > 2 {
        labels[1..].join(".")
    } else {
        server_name.to_string()
    }
}
