//! `ArcGIS` geoprocessing extraction client.
//!
//! Talks to a county "Extract Data Task" `GPServer` endpoint: submit a clip
//! job for a fixed area of interest, poll it until it finishes, resolve
//! the output zip's URL and download it. Also runs the `MapServer`
//! statistics query that reports the parcel layer's latest edit date.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::job::{JobInfo, PollPolicy, poll_until_done};
use crate::{ExtractError, ExtractedArchive, RemoteExtractionClient, archive, download, retry};

/// Web Mercator, the spatial reference the area of interest is given in.
pub const AREA_OF_INTEREST_WKID: u32 = 102_100;

/// File name the job output is downloaded to inside the staging directory.
const DOWNLOAD_FILE_NAME: &str = "parcels_extract.zip";

const USER_AGENT: &str = "parcel-sync/0.1";

/// Per-request timeout. Job waits are governed by [`PollPolicy`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn default_label() -> String {
    "El Dorado County".to_string()
}

fn default_gp_service_url() -> String {
    "https://see-eldorado.edcgov.us/arcgis/rest/services/uGOTNETandEXTRACTS/geoservices/GPServer/Extract%20Data%20Task".to_string()
}

fn default_freshness_query_url() -> String {
    "https://see-eldorado.edcgov.us/arcgis/rest/services/uGOTNETandEXTRACTS/parcels/MapServer/1/query".to_string()
}

fn default_statistic_field() -> String {
    "LandManagement.Parcel.PRCL_GEOMETRY.POLY_CREATE_DATE".to_string()
}

fn default_layer_to_clip() -> String {
    "Parcels".to_string()
}

fn default_feature_format() -> String {
    "File Geodatabase - GDB - .gdb".to_string()
}

fn default_result_parameter() -> String {
    "Output_Zip_File".to_string()
}

fn default_area_of_interest() -> Vec<Vec<[f64; 2]>> {
    vec![vec![
        [-13_490_599.294_393_552, 4_646_257.881_632_805],
        [-13_490_599.294_393_552, 4_735_689.204_726_496],
        [-13_336_502.245_370_58, 4_735_689.204_726_496],
        [-13_336_502.245_370_58, 4_646_257.881_632_805],
        [-13_490_599.294_393_552, 4_646_257.881_632_805],
    ]]
}

fn default_gdb_path() -> String {
    "zipfolder/data.gdb".to_string()
}

fn default_layer() -> String {
    "Parcels".to_string()
}

/// Where and how to extract parcels from.
///
/// Every field has a default pointing at the El Dorado County services,
/// so an empty `[remote]` table is a working configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArcGisExtractConfig {
    /// Name used in log lines and notifications.
    #[serde(default = "default_label")]
    pub label: String,
    /// Base URL of the geoprocessing task (without `/submitJob`).
    #[serde(default = "default_gp_service_url")]
    pub gp_service_url: String,
    /// `MapServer` layer query endpoint used for the freshness check.
    #[serde(default = "default_freshness_query_url")]
    pub freshness_query_url: String,
    /// Field whose maximum is the layer's last-modified time.
    #[serde(default = "default_statistic_field")]
    pub statistic_field: String,
    #[serde(default = "default_layer_to_clip")]
    pub layer_to_clip: String,
    #[serde(default = "default_feature_format")]
    pub feature_format: String,
    /// Output parameter holding the zip file.
    #[serde(default = "default_result_parameter")]
    pub result_parameter: String,
    /// Polygon rings in Web Mercator.
    #[serde(default = "default_area_of_interest")]
    pub area_of_interest: Vec<Vec<[f64; 2]>>,
    /// Geodatabase path inside the archive. Its first component is the
    /// folder removed before and after each run.
    #[serde(default = "default_gdb_path")]
    pub gdb_path: String,
    /// Feature class inside the geodatabase.
    #[serde(default = "default_layer")]
    pub layer: String,
}

impl Default for ArcGisExtractConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            gp_service_url: default_gp_service_url(),
            freshness_query_url: default_freshness_query_url(),
            statistic_field: default_statistic_field(),
            layer_to_clip: default_layer_to_clip(),
            feature_format: default_feature_format(),
            result_parameter: default_result_parameter(),
            area_of_interest: default_area_of_interest(),
            gdb_path: default_gdb_path(),
            layer: default_layer(),
        }
    }
}

impl ArcGisExtractConfig {
    /// Top-level folder the archive unpacks into, relative to the staging
    /// directory.
    #[must_use]
    pub fn extract_folder(&self) -> &str {
        self.gdb_path
            .split(['/', '\\'])
            .find(|part| !part.is_empty())
            .unwrap_or(&self.gdb_path)
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.gp_service_url.trim_end_matches('/'))
    }

    fn submit_url(&self) -> String {
        format!("{}/submitJob", self.gp_service_url.trim_end_matches('/'))
    }

    /// Query parameters for `submitJob`.
    #[must_use]
    pub fn submit_params(&self, out_sr: u32) -> Vec<(&'static str, String)> {
        let area = json!({
            "geometryType": "esriGeometryPolygon",
            "features": [{
                "geometry": {
                    "rings": self.area_of_interest,
                    "spatialReference": { "wkid": AREA_OF_INTEREST_WKID }
                }
            }],
            "sr": { "wkid": AREA_OF_INTEREST_WKID }
        });

        vec![
            ("f", "json".to_string()),
            ("env:outSR", out_sr.to_string()),
            ("Layers_to_Clip", json!([self.layer_to_clip]).to_string()),
            ("Area_of_Interest", area.to_string()),
            ("Feature_Format", self.feature_format.clone()),
        ]
    }

    /// Query parameters for the max-statistic freshness query.
    #[must_use]
    pub fn freshness_params(&self) -> Vec<(&'static str, String)> {
        let statistics = json!([{
            "statisticType": "max",
            "onStatisticField": self.statistic_field,
            "outStatisticFieldName": "date"
        }]);

        vec![
            ("where", "1=1".to_string()),
            ("outStatistics", statistics.to_string()),
            ("f", "json".to_string()),
        ]
    }
}

/// Reads `features[0].attributes.date` (epoch milliseconds).
///
/// # Errors
///
/// Returns [`ExtractError::Protocol`] if the value is missing or not a
/// representable timestamp.
pub fn parse_latest_timestamp(body: &serde_json::Value) -> Result<DateTime<Utc>, ExtractError> {
    if let Some(error) = body.get("error") {
        return Err(ExtractError::protocol(format!("service error: {error}")));
    }

    let date = body
        .pointer("/features/0/attributes/date")
        .ok_or_else(|| ExtractError::protocol("freshness query returned no date"))?;

    #[allow(clippy::cast_possible_truncation)]
    let millis = date
        .as_i64()
        .or_else(|| date.as_f64().map(|f| f as i64))
        .ok_or_else(|| ExtractError::protocol(format!("freshness date is not a number: {date}")))?;

    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ExtractError::protocol(format!("freshness date out of range: {millis}")))
}

/// Reads the download URL out of a `returnType=data` result response.
///
/// # Errors
///
/// Returns [`ExtractError::Protocol`] if `value.url` is absent.
pub fn parse_result_url(body: &serde_json::Value) -> Result<String, ExtractError> {
    body.pointer("/value/url")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ExtractError::protocol(format!("job result has no value.url: {body}")))
}

/// [`RemoteExtractionClient`] backed by an `ArcGIS` geoprocessing service.
pub struct ArcGisExtractClient {
    client: reqwest::Client,
    config: ArcGisExtractConfig,
    out_sr: u32,
    polling: PollPolicy,
}

impl ArcGisExtractClient {
    /// Creates a client that asks for output in spatial reference `out_sr`
    /// and waits on jobs according to `polling`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Http`] if the HTTP client cannot be built.
    pub fn new(
        config: ArcGisExtractConfig,
        out_sr: u32,
        polling: PollPolicy,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            config,
            out_sr,
            polling,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ArcGisExtractConfig {
        &self.config
    }

    async fn submit_job(&self) -> Result<JobInfo, ExtractError> {
        let url = self.config.submit_url();
        let params = self.config.submit_params(self.out_sr);
        log::info!("{}: submitting extraction job", self.config.label);

        let body = retry::send_json(|| self.client.get(&url).query(&params)).await?;
        let info = JobInfo::from_value(body)?;

        log::info!(
            "{}: job {} is {}",
            self.config.label,
            info.job_id,
            info.job_status
        );
        Ok(info)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobInfo, ExtractError> {
        let url = format!("{}/{job_id}", self.config.jobs_url());
        let body = retry::send_json(|| self.client.get(&url).query(&[("f", "json")])).await?;
        JobInfo::from_value(body)
    }

    async fn result_url(&self, info: &JobInfo) -> Result<String, ExtractError> {
        let result = info
            .results
            .get(&self.config.result_parameter)
            .ok_or_else(|| {
                ExtractError::protocol(format!(
                    "job {} has no {} result",
                    info.job_id, self.config.result_parameter
                ))
            })?;

        let url = format!(
            "{}/{}/{}",
            self.config.jobs_url(),
            info.job_id,
            result.param_url
        );
        let body = retry::send_json(|| {
            self.client
                .get(&url)
                .query(&[("f", "json"), ("returnType", "data")])
        })
        .await?;

        parse_result_url(&body)
    }
}

#[async_trait]
impl RemoteExtractionClient for ArcGisExtractClient {
    async fn remote_last_modified(&self) -> Result<DateTime<Utc>, ExtractError> {
        let url = &self.config.freshness_query_url;
        let params = self.config.freshness_params();
        let body = retry::send_json(|| self.client.get(url).query(&params)).await?;
        let latest = parse_latest_timestamp(&body)?;
        log::info!("{}: remote parcels last modified {latest}", self.config.label);
        Ok(latest)
    }

    async fn extract(&self, staging_dir: &Path) -> Result<ExtractedArchive, ExtractError> {
        let submitted = self.submit_job().await?;
        let job_id = submitted.job_id.clone();

        let mut first = Some(submitted);
        let id = job_id.as_str();
        let finished = poll_until_done(&self.polling, id, || {
            let first = first.take();
            async move {
                match first {
                    Some(info) => Ok(info),
                    None => self.job_status(id).await,
                }
            }
        })
        .await?;

        let url = self.result_url(&finished).await?;
        let zip_path = staging_dir.join(DOWNLOAD_FILE_NAME);
        download::download_file(&self.client, &url, &zip_path).await?;

        let files = archive::unzip(&zip_path, staging_dir)?;
        archive::remove_file_if_exists(&zip_path)?;

        let gdb_path = staging_dir.join(&self.config.gdb_path);
        if !gdb_path.exists() {
            return Err(ExtractError::protocol(format!(
                "archive did not contain {}",
                self.config.gdb_path
            )));
        }

        Ok(ExtractedArchive {
            root: staging_dir.join(self.config.extract_folder()),
            gdb_path,
            layer: self.config.layer.clone(),
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::job::JobStatus;

    type Route = (String, Vec<u8>);

    /// Serves fixed bodies by request path on a local port and records
    /// every request target it sees.
    fn spawn_http_fixture(
        routes: impl FnOnce(&str) -> Vec<Route>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes = routes(&base);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut head = Vec::new();
                let mut chunk = [0u8; 4096];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head);
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let path = target.split('?').next().unwrap_or("").to_string();
                seen.lock().unwrap().push(target);

                let (status, body) = routes
                    .iter()
                    .find(|(p, _)| *p == path)
                    .map_or(("404 Not Found", b"not found".to_vec()), |(_, b)| {
                        ("200 OK", b.clone())
                    });
                let headers = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(headers.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        (base, requests)
    }

    fn json_route(path: &str, body: &serde_json::Value) -> Route {
        (path.to_string(), body.to_string().into_bytes())
    }

    fn parcels_zip() -> Vec<u8> {
        let mut zip_writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip_writer
            .start_file("zipfolder/data.gdb/a00000001.gdbtable", options)
            .unwrap();
        zip_writer.write_all(b"table").unwrap();
        zip_writer.finish().unwrap().into_inner()
    }

    fn succeeded_job() -> serde_json::Value {
        json!({
            "jobId": "j42",
            "jobStatus": "esriJobSucceeded",
            "results": { "Output_Zip_File": { "paramUrl": "results/Output_Zip_File" } }
        })
    }

    fn result_and_download_routes(base: &str) -> Vec<Route> {
        vec![
            json_route(
                "/gp/Extract/jobs/j42/results/Output_Zip_File",
                &json!({
                    "paramName": "Output_Zip_File",
                    "value": { "url": format!("{base}/files/parcels.zip") }
                }),
            ),
            ("/files/parcels.zip".to_string(), parcels_zip()),
        ]
    }

    fn client_for(base: &str) -> ArcGisExtractClient {
        let config = ArcGisExtractConfig {
            gp_service_url: format!("{base}/gp/Extract"),
            ..ArcGisExtractConfig::default()
        };
        let polling = PollPolicy {
            initial_interval_secs: 1.0,
            max_interval_secs: 1.0,
            backoff_factor: 1.0,
            timeout_secs: 30,
        };
        ArcGisExtractClient::new(config, 2226, polling).unwrap()
    }

    fn staging(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn request_paths(requests: &Mutex<Vec<String>>) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.split('?').next().unwrap_or("").to_string())
            .collect()
    }

    #[tokio::test]
    async fn extract_submits_polls_downloads_and_unpacks() {
        let (base, requests) = spawn_http_fixture(|base| {
            let mut routes = vec![
                json_route(
                    "/gp/Extract/submitJob",
                    &json!({ "jobId": "j42", "jobStatus": "esriJobSubmitted" }),
                ),
                json_route("/gp/Extract/jobs/j42", &succeeded_job()),
            ];
            routes.extend(result_and_download_routes(base));
            routes
        });
        let dir = staging("parcel_sync_extract_full");

        let extracted = client_for(&base).extract(&dir).await.unwrap();

        assert_eq!(extracted.root, dir.join("zipfolder"));
        assert_eq!(extracted.gdb_path, dir.join("zipfolder/data.gdb"));
        assert_eq!(extracted.layer, "Parcels");
        assert_eq!(extracted.files, 1);
        assert_eq!(
            std::fs::read(extracted.gdb_path.join("a00000001.gdbtable")).unwrap(),
            b"table"
        );
        assert!(!dir.join(DOWNLOAD_FILE_NAME).exists());

        assert_eq!(
            request_paths(&requests),
            vec![
                "/gp/Extract/submitJob",
                "/gp/Extract/jobs/j42",
                "/gp/Extract/jobs/j42/results/Output_Zip_File",
                "/files/parcels.zip",
            ]
        );
        let submit = requests.lock().unwrap()[0].clone();
        assert!(submit.contains("outSR=2226"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn finished_submit_response_skips_status_requests() {
        let (base, requests) = spawn_http_fixture(|base| {
            let mut routes = vec![json_route("/gp/Extract/submitJob", &succeeded_job())];
            routes.extend(result_and_download_routes(base));
            routes
        });
        let dir = staging("parcel_sync_extract_submit_done");

        let extracted = client_for(&base).extract(&dir).await.unwrap();

        assert!(extracted.gdb_path.is_dir());
        assert_eq!(
            request_paths(&requests),
            vec![
                "/gp/Extract/submitJob",
                "/gp/Extract/jobs/j42/results/Output_Zip_File",
                "/files/parcels.zip",
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_job_downloads_nothing() {
        let (base, requests) = spawn_http_fixture(|_| {
            vec![
                json_route(
                    "/gp/Extract/submitJob",
                    &json!({ "jobId": "j42", "jobStatus": "esriJobSubmitted" }),
                ),
                json_route(
                    "/gp/Extract/jobs/j42",
                    &json!({
                        "jobId": "j42",
                        "jobStatus": "esriJobFailed",
                        "messages": [{ "type": "esriJobMessageTypeError", "description": "clip failed" }]
                    }),
                ),
            ]
        });
        let dir = staging("parcel_sync_extract_failed");

        let err = client_for(&base).extract(&dir).await.unwrap_err();

        match err {
            ExtractError::JobFailed {
                status, messages, ..
            } => {
                assert_eq!(status, JobStatus::Failed);
                assert_eq!(messages, vec!["clip failed"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(request_paths(&requests).len(), 2);
        assert!(!dir.exists());
    }

    fn param<'a>(params: &'a [(&'static str, String)], name: &str) -> &'a str {
        params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn submit_params_carry_sr_layers_and_polygon() {
        let config = ArcGisExtractConfig::default();
        let params = config.submit_params(2226);

        assert_eq!(param(&params, "f"), "json");
        assert_eq!(param(&params, "env:outSR"), "2226");
        assert_eq!(param(&params, "Layers_to_Clip"), r#"["Parcels"]"#);
        assert_eq!(
            param(&params, "Feature_Format"),
            "File Geodatabase - GDB - .gdb"
        );

        let area: serde_json::Value =
            serde_json::from_str(param(&params, "Area_of_Interest")).unwrap();
        assert_eq!(area["geometryType"], "esriGeometryPolygon");
        assert_eq!(area["sr"]["wkid"], 102_100);
        let ring = &area["features"][0]["geometry"]["rings"][0];
        assert_eq!(ring.as_array().unwrap().len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn freshness_params_ask_for_max_date() {
        let config = ArcGisExtractConfig::default();
        let params = config.freshness_params();
        assert_eq!(param(&params, "where"), "1=1");

        let stats: serde_json::Value =
            serde_json::from_str(param(&params, "outStatistics")).unwrap();
        assert_eq!(stats[0]["statisticType"], "max");
        assert_eq!(stats[0]["outStatisticFieldName"], "date");
        assert_eq!(
            stats[0]["onStatisticField"],
            "LandManagement.Parcel.PRCL_GEOMETRY.POLY_CREATE_DATE"
        );
    }

    #[test]
    fn urls_are_built_from_service_base() {
        let config = ArcGisExtractConfig {
            gp_service_url: "https://gis.example/GPServer/Extract/".to_string(),
            ..ArcGisExtractConfig::default()
        };
        assert_eq!(
            config.submit_url(),
            "https://gis.example/GPServer/Extract/submitJob"
        );
        assert_eq!(config.jobs_url(), "https://gis.example/GPServer/Extract/jobs");
    }

    #[test]
    fn extract_folder_is_first_path_component() {
        assert_eq!(ArcGisExtractConfig::default().extract_folder(), "zipfolder");

        let config = ArcGisExtractConfig {
            gdb_path: "out\\parcels.gdb".to_string(),
            ..ArcGisExtractConfig::default()
        };
        assert_eq!(config.extract_folder(), "out");
    }

    #[test]
    fn parses_latest_timestamp() {
        let body = json!({
            "features": [{ "attributes": { "date": 1_700_000_000_000_i64 } }]
        });
        let ts = parse_latest_timestamp(&body).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn missing_timestamp_is_a_protocol_error() {
        for body in [
            json!({ "features": [] }),
            json!({ "features": [{ "attributes": { "date": null } }] }),
            json!({ "error": { "code": 500, "message": "boom" } }),
        ] {
            assert!(matches!(
                parse_latest_timestamp(&body),
                Err(ExtractError::Protocol { .. })
            ));
        }
    }

    #[test]
    fn parses_result_url() {
        let body = json!({
            "paramName": "Output_Zip_File",
            "dataType": "GPDataFile",
            "value": { "url": "https://gis.example/jobs/j1/out.zip" }
        });
        assert_eq!(
            parse_result_url(&body).unwrap(),
            "https://gis.example/jobs/j1/out.zip"
        );
        assert!(parse_result_url(&json!({ "value": {} })).is_err());
    }

    #[test]
    fn config_defaults_fill_an_empty_table() {
        let config: ArcGisExtractConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ArcGisExtractConfig::default());
    }
}
