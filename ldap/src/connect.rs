/*  tiny-roles: Tiny Role Resolver
 *  Copyright (C) 2024 The tiny-roles developers
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::error::LdapError;
use ldap3::{drive, Ldap, LdapConnAsync, LdapConnSettings};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Opens bound connections to one directory server.
pub struct Connector {
    pub(crate) url: Url,
    pub(crate) connect_timeout: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) tls_config: Option<Arc<ClientConfig>>,
    pub(crate) bind_dn: String,
    pub(crate) bind_password: String,
}

impl Connector {
    pub(crate) async fn connect(&self) -> Result<Ldap, LdapError> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        if let Some(config) = &self.tls_config {
            settings = settings.set_config(config.clone());
        }
        debug!(url = %self.url, "connecting");
        let (conn, mut ldap) = LdapConnAsync::from_url_with_settings(settings, &self.url)
            .await
            .map_err(|e| {
                warn!(url = %self.url, %e, "ldap connection failed");
                LdapError::ConnectErrorWithContext {
                    url: self.url.to_string(),
                    source: e,
                }
            })?;
        drive!(conn);
        debug!(url = %self.url, "connected");

        if let Err(e) = self.bind(&mut ldap).await {
            let _ = ldap.unbind().await;
            return Err(e);
        }
        Ok(ldap)
    }

    async fn bind(&self, ldap: &mut Ldap) -> Result<(), LdapError> {
        if self.bind_dn.is_empty() {
            trace!("keeping anonymous session");
            return Ok(());
        }
        debug!(bind_dn = %self.bind_dn, "binding");
        let result = ldap
            .with_timeout(self.response_timeout)
            .simple_bind(&self.bind_dn, &self.bind_password)
            .await
            .map_err(LdapError::BindErrorWithContext)?;
        match result.rc {
            0 => Ok(()),
            49 => {
                warn!(bind_dn = %self.bind_dn, "wrong bind dn or password");
                Err(LdapError::InvalidCredentials(self.bind_dn.clone()))
            }
            rc => {
                warn!(rc, text = %result.text, "unexpected ldap result code while binding");
                Err(LdapError::BindError {
                    rc,
                    text: result.text,
                })
            }
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bind_identity(&self) -> &str {
        &self.bind_dn
    }
}

/// Builds a TLS client configuration trusting exactly the PEM certificates
/// found in `path`.
pub(crate) fn load_trust_store(path: &Path) -> Result<Arc<ClientConfig>, LdapError> {
    let trust_store_error = |source: std::io::Error| LdapError::TrustStore {
        path: path.to_owned(),
        source,
    };
    let file = File::open(path).map_err(trust_store_error)?;
    let certificates =
        rustls_pemfile::certs(&mut BufReader::new(file)).map_err(trust_store_error)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(&certificates[..]);
    if ignored > 0 {
        warn!(path = %path.display(), ignored, "skipping unparsable certificates");
    }
    if added == 0 {
        return Err(LdapError::EmptyTrustStore(path.to_owned()));
    }
    debug!(path = %path.display(), added, "loaded trust store");

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use test_log::test;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Port nobody listens on.
    pub(crate) fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    pub(crate) fn unreachable_connector(bind_dn: &str) -> Connector {
        local_connector(closed_port(), bind_dn)
    }

    pub(crate) fn local_connector(port: u16, bind_dn: &str) -> Connector {
        Connector {
            url: Url::parse(&format!("ldap://127.0.0.1:{}", port)).unwrap(),
            connect_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
            tls_config: None,
            bind_dn: bind_dn.to_owned(),
            bind_password: "secret".to_owned(),
        }
    }

    /// Accepts TCP connections and never answers.
    pub(crate) async fn silent_server() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });
        port
    }

    /// Answers every bind request with result code 49, invalid credentials.
    pub(crate) async fn rejecting_server() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = [0u8; 512];
                    while let Ok(read) = socket.read(&mut request).await {
                        if read == 0 {
                            break;
                        }
                        let response = bind_rejection(message_id(&request[..read]));
                        if socket.write_all(&response).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    // LDAPMessage ::= SEQUENCE { messageID INTEGER, ... }
    fn message_id(request: &[u8]) -> &[u8] {
        let length_octets = if request[1] & 0x80 != 0 {
            (request[1] & 0x7f) as usize
        } else {
            0
        };
        let start = 2 + length_octets;
        let id_length = request[start + 1] as usize;
        &request[start + 2..start + 2 + id_length]
    }

    fn bind_rejection(message_id: &[u8]) -> Vec<u8> {
        let bind_response = [0x61, 0x07, 0x0a, 0x01, 49, 0x04, 0x00, 0x04, 0x00];
        let mut response = vec![0x30, (2 + message_id.len() + bind_response.len()) as u8];
        response.extend_from_slice(&[0x02, message_id.len() as u8]);
        response.extend_from_slice(message_id);
        response.extend_from_slice(&bind_response);
        response
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tiny-roles-{}-{}.pem",
            name,
            std::process::id()
        ));
        fs::write(&path, content).unwrap();
        path
    }

    #[test(tokio::test)]
    async fn unreachable_server_fails_to_connect() {
        let uut = unreachable_connector("cn=admin,dc=example,dc=com");

        let actual = uut.connect().await;

        assert!(matches!(
            actual,
            Err(LdapError::ConnectErrorWithContext { .. })
        ));
    }

    #[test(tokio::test)]
    async fn anonymous_session_needs_no_bind() {
        let port = silent_server().await;
        let uut = local_connector(port, "");

        let actual = uut.connect().await;

        assert!(actual.is_ok());
    }

    #[test(tokio::test)]
    async fn unanswered_bind_times_out() {
        let port = silent_server().await;
        let uut = local_connector(port, "cn=admin,dc=example,dc=com");

        let actual = uut.connect().await;

        assert!(matches!(actual, Err(LdapError::BindErrorWithContext(_))));
    }

    #[test(tokio::test)]
    async fn rejected_bind_is_invalid_credentials() {
        let port = rejecting_server().await;
        let uut = local_connector(port, "cn=admin,dc=example,dc=com");

        let actual = uut.connect().await;

        assert!(matches!(actual, Err(LdapError::InvalidCredentials(_))));
    }

    #[test]
    fn missing_trust_store_is_reported() {
        let actual = load_trust_store(Path::new("/nonexistent/tiny-roles/ca.pem"));

        assert!(matches!(actual, Err(LdapError::TrustStore { .. })));
    }

    #[test]
    fn trust_store_without_certificates_is_rejected() {
        let path = temp_file("empty", "this is not a certificate\n");

        let actual = load_trust_store(&path);

        fs::remove_file(&path).unwrap();
        assert!(matches!(actual, Err(LdapError::EmptyTrustStore(_))));
    }
}
