//! Where the three services listen by default.
//!
//! The listeners speak plain HTTP; put a TLS-terminating proxy in front of
//! them when serving anything other than localhost.

pub const IDP_PORT: u16 = 44318;
pub const API_PORT: u16 = 44366;
pub const CLIENT_PORT: u16 = 44389;

pub const IDP_URL: &str = "http://localhost:44318";
pub const API_URL: &str = "http://localhost:44366";
pub const CLIENT_URL: &str = "http://localhost:44389";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_use_default_ports() {
        for (url, port) in [(IDP_URL, IDP_PORT), (API_URL, API_PORT), (CLIENT_URL, CLIENT_PORT)] {
            assert!(url.starts_with("http://localhost:"));
            assert!(url.ends_with(&format!(":{}", port)));
        }
    }
}
