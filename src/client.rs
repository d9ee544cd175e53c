use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::MonitorConfig;
use crate::fields::Sample;
use crate::parser::{parse_device_info, DeviceInfo, ParseError, RealTimeParser};

/// Hard per-attempt bound on every device request. There is no retry; a failed
/// attempt is simply absent from the current interval's data.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single fetch attempt against the inverter.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout connecting to {0}")]
    Timeout(String),
    #[error("error fetching data: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device returned status {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// HTTP client for the inverter's local XML endpoints.
pub struct SajClient {
    host: String,
    client: reqwest::Client,
    parser: RealTimeParser,
}

impl SajClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client: reqwest::Client::new(),
            parser: RealTimeParser::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Fetches and parses one real-time sample.
    pub async fn fetch_sample(&mut self) -> Result<Sample, FetchError> {
        let url = format!("http://{}/real_time_data.xml", self.host);
        let xml = self.fetch_text(&url).await?;
        Ok(self.parser.parse(&xml)?)
    }

    /// Fetches the static device identity from the equipment endpoint.
    pub async fn fetch_device_info(&self) -> Result<DeviceInfo, FetchError> {
        let url = format!("http://{}/equipment_data.xml", self.host);
        let xml = self.fetch_text(&url).await?;
        Ok(parse_device_info(&xml)?)
    }

    /// Checks that the real-time endpoint is reachable and answers cleanly.
    pub async fn check_connection(&self) -> Result<(), FetchError> {
        let url = format!("http://{}/real_time_data.xml", self.host);
        self.fetch_text(&url).await.map(|_| ())
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Timeout(self.host.clone())
                } else {
                    FetchError::Http(err)
                }
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.text().await?)
    }
}

/// Validates a configuration against the live device before the monitor is
/// accepted: the real-time endpoint must be reachable; the identity fetch may
/// degrade to an all-unknown identity, except on timeout.
pub async fn validate_setup(config: &MonitorConfig) -> Result<DeviceInfo, FetchError> {
    let client = SajClient::new(&config.host);
    client.check_connection().await?;

    match client.fetch_device_info().await {
        Ok(info) => Ok(info),
        Err(err @ FetchError::Timeout(_)) => Err(err),
        Err(err) => {
            warn!("error fetching device info: {err}");
            Ok(DeviceInfo::unknown())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    const REAL_TIME_BODY: &str = r#"<real_time_data>
        <state>OK</state>
        <v-grid>230.5</v-grid>
        <i-grid>5.2</i-grid>
        <f-grid>49.98</f-grid>
        <p-ac>1180.0</p-ac>
        <temp>34.5</temp>
        <e-today>10.5</e-today>
        <t-today>4.2</t-today>
        <e-total>1234.5</e-total>
        <CO2>44.2</CO2>
        <t-total>3600.0</t-total>
        <v-pv1>150.0</v-pv1>
        <i-pv1>8.0</i-pv1>
        <v-pv2>231.4 V</v-pv2>
        <i-pv2>3.6 A</i-pv2>
        <v-bus>400.1</v-bus>
    </real_time_data>"#;

    const EQUIPMENT_BODY: &str = r#"<equipment_data>
        <Model>Sununo Plus 2K</Model>
        <Product_Code>S2000</Product_Code>
        <SN>S2000123456</SN>
        <MFMW>1.20</MFMW>
    </equipment_data>"#;

    #[tokio::test]
    async fn test_fetch_sample() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/real_time_data.xml")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(REAL_TIME_BODY)
            .create();

        let mut client = SajClient::new(server.host_with_port());
        let sample = client.fetch_sample().await.unwrap();

        assert_eq!(sample.get("state"), Some(&FieldValue::Text("OK".to_string())));
        assert_eq!(sample.get("v-grid"), Some(&FieldValue::Float(230.5)));
        assert_eq!(sample.get("v-pv2"), Some(&FieldValue::Float(231.4)));
        mock.assert();
    }

    #[tokio::test]
    async fn test_fetch_sample_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/real_time_data.xml")
            .with_status(500)
            .create();

        let mut client = SajClient::new(server.host_with_port());
        let result = client.fetch_sample().await;
        assert!(matches!(result, Err(FetchError::Status(_))));
    }

    #[tokio::test]
    async fn test_fetch_sample_malformed_xml() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/real_time_data.xml")
            .with_status(200)
            .with_body("<real_time_data><state>OK")
            .create();

        let mut client = SajClient::new(server.host_with_port());
        let result = client.fetch_sample().await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetch_device_info() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/equipment_data.xml")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(EQUIPMENT_BODY)
            .create();

        let client = SajClient::new(server.host_with_port());
        let info = client.fetch_device_info().await.unwrap();

        assert_eq!(info.model, "Sununo Plus 2K");
        assert_eq!(info.serial_number, "S2000123456");
        mock.assert();
    }

    #[tokio::test]
    async fn test_validate_setup_degrades_identity_on_equipment_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/real_time_data.xml")
            .with_status(200)
            .with_body(REAL_TIME_BODY)
            .create();
        server
            .mock("GET", "/equipment_data.xml")
            .with_status(404)
            .create();

        let config = MonitorConfig::for_host(server.host_with_port());
        let info = validate_setup(&config).await.unwrap();
        assert_eq!(info, DeviceInfo::unknown());
    }

    #[tokio::test]
    async fn test_validate_setup_unreachable_device_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/real_time_data.xml")
            .with_status(503)
            .create();

        let config = MonitorConfig::for_host(server.host_with_port());
        assert!(validate_setup(&config).await.is_err());
    }
}
