//! Common test utilities and fixtures.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use idp_crypto::Certificate;
use reqwest::Client;
use tokio::sync::oneshot;
use tokio::time::sleep;

use idp_server::{Server, ServerConfig};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../crates/idp-saml/tests/fixtures");

/// Entity ID of the test SP.
pub const SP_ENTITY_ID: &str = "https://sp.example.com";

/// ACS of the test SP.
pub const SP_ACS: &str = "https://sp.example.com/acs";

/// Header the server trusts for the logged-in user.
pub const USER_HEADER: &str = "x-remote-user";

/// Test environment running a server on a random port.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client that keeps cookies and does not follow redirects.
    pub client: Client,
    /// Scratch directory holding the configuration.
    dir: PathBuf,
    /// Server shutdown signal.
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestEnv {
    /// Writes the configuration and starts the server.
    pub async fn new() -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("idp_server=debug,idp_saml=debug")
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let server_port = listener.local_addr()?.port();
        drop(listener);
        let base_url = format!("http://127.0.0.1:{server_port}");

        let dir = std::env::temp_dir().join(format!("idp-it-{}", uuid::Uuid::new_v4()));
        write_config(&dir, &base_url)?;

        let mut config = ServerConfig::for_testing(dir.join("idp.json"));
        config.port = server_port;
        config.users_file = Some(dir.join("users.json"));
        config.user_header = USER_HEADER.to_string();

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let server = Server::new(config)?;
        tokio::spawn(async move {
            tokio::select! {
                result = server.run() => {
                    if let Err(e) = result {
                        tracing::error!("Server error: {}", e);
                    }
                }
                _ = shutdown_rx => {
                    tracing::info!("Server shutdown requested");
                }
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        wait_for_server(&client, &base_url).await?;

        Ok(Self {
            base_url,
            client,
            dir,
            _shutdown_tx,
        })
    }

    /// Absolute URL of `path` on the server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn write_config(dir: &Path, base_url: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    for name in ["idp-key.pem", "idp-cert.pem"] {
        std::fs::copy(format!("{FIXTURES}/{name}"), dir.join(name))?;
    }

    let sp_cert = Certificate::from_pem(&std::fs::read_to_string(format!("{FIXTURES}/sp-cert.pem"))?)?;
    std::fs::write(
        dir.join("sp-metadata.xml"),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{SP_ENTITY_ID}">
    <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="{SP_ACS}" index="0" isDefault="true"/>
        <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{SP_ACS}/redirect" index="1"/>
    </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
            sp_cert.to_base64()
        ),
    )?;

    std::fs::write(
        dir.join("idp.json"),
        serde_json::json!({
            "entity_id": format!("{base_url}/metadata"),
            "base_url": base_url,
            "key_file": "idp-key.pem",
            "cert_file": "idp-cert.pem",
            "sign_response": true,
            "metadata_files": ["sp-metadata.xml"],
            "service_providers": {
                (SP_ENTITY_ID): {
                    "attribute_mapping": {"uid": "username", "employeeId": "id", "mail": "email"},
                    "name_id_field": "username"
                }
            }
        })
        .to_string(),
    )?;

    std::fs::write(
        dir.join("users.json"),
        serde_json::json!([
            {"id": 42, "username": "alice", "attributes": {"email": "alice@example.com"}}
        ])
        .to_string(),
    )?;
    Ok(())
}

/// Waits for the server to answer its health check.
async fn wait_for_server(client: &Client, base_url: &str) -> anyhow::Result<()> {
    let health_url = format!("{base_url}/health");
    for _ in 0..50 {
        if let Ok(response) = client.get(&health_url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("server did not become ready")
}
