use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Deserialize)]
pub struct Log {
    /// Directive for `tracing_subscriber::EnvFilter`, overridden by
    /// `RUST_LOG` when that is set.
    pub filter: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_example_config() {
        let config =
            toml::from_str::<Config>(include_str!("../config.example.toml"))
                .unwrap();

        assert_eq!(config.http.server.addr.port(), 4100);
        assert_eq!(
            config.jwt.expiration_time,
            time::Duration::from_secs(60 * 60),
        );
        assert_eq!(config.log.filter, "info,lockbox=debug");
    }

    #[test]
    fn log_section_is_optional() {
        let config = toml::from_str::<Config>(
            r#"
            [db]
            url = "postgres://localhost/lockbox"

            [http.server]
            addr = "127.0.0.1:4100"

            [http.cors]
            allowed_origins = []

            [jwt]
            secret = "secret"
            expiration_time = "15m"
            "#,
        )
        .unwrap();

        assert_eq!(config.log.filter, "info");
        assert!(config.http.cors.allowed_origins.is_empty());
    }
}
