use crate::error::Error;
use crate::table::SavedTable;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const TOKEN_ENV_VAR: &str = "HF_TOKEN";
/// Where the table lands inside the dataset repository.
pub const REMOTE_DATA_PATH: &str = "data/train-00000-of-00001.parquet";
/// Leading bytes sent to the preupload check.
const PREUPLOAD_SAMPLE_LENGTH: u64 = 512;
const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// A remote place datasets can be published to.
pub trait DatasetRegistry {
    /// Uploads the saved table under `repo_name` and returns its URL.
    fn publish(&self, repo_name: &str, saved: &SavedTable) -> Result<String, Error>;
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    oid: String,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Default, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: u16,
    message: String,
}

/// SHA-256 and size of a file, as the LFS API names it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LfsPointer {
    oid: String,
    size: u64,
}

impl LfsPointer {
    fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)?;
        Ok(Self {
            oid: format!("{:x}", hasher.finalize()),
            size,
        })
    }
}

/// Hugging Face Hub client. Every request is attempted once.
pub struct HubClient {
    endpoint: String,
    token: String,
    private: bool,
    username: Option<String>,
    http: Client,
}

/// Rejects a missing or blank token.
pub fn resolve_token(value: Option<String>) -> Result<String, Error> {
    value
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::MissingCredential(TOKEN_ENV_VAR.to_string()))
}

impl HubClient {
    pub fn from_env(endpoint: &str) -> Result<Self, Error> {
        let token = resolve_token(env::var(TOKEN_ENV_VAR).ok())?;
        Self::new(endpoint, token)
    }

    pub fn new(endpoint: &str, token: String) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            private: false,
            username: None,
            http,
        })
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Checks the token against the Hub and remembers the account name.
    pub fn login(&mut self) -> Result<String, Error> {
        let url = format!("{}/api/whoami-v2", self.endpoint);
        let response = self.http.get(&url).bearer_auth(&self.token).send()?;
        let whoami: WhoAmI = check_status(response, &url)?.json()?;
        debug!("Authenticated against {} as {}", self.endpoint, whoami.name);
        self.username = Some(whoami.name.clone());
        Ok(whoami.name)
    }

    fn create_repo(&self, name: &str) -> Result<(), Error> {
        let url = format!("{}/api/repos/create", self.endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "type": "dataset", "name": name, "private": self.private }))
            .send()?;

        if response.status() == StatusCode::CONFLICT {
            debug!("Dataset repository {} already exists", name);
            return Ok(());
        }
        check_status(response, &url)?;
        info!("Created dataset repository {}", name);
        Ok(())
    }

    /// Asks the Hub whether `remote_path` goes inline or through LFS.
    fn preupload(&self, repo_id: &str, local: &Path, remote_path: &str) -> Result<UploadMode, Error> {
        let size = fs::metadata(local)?.len();
        let mut sample = Vec::new();
        File::open(local)?
            .take(PREUPLOAD_SAMPLE_LENGTH)
            .read_to_end(&mut sample)?;

        let url = format!("{}/api/datasets/{}/preupload/main", self.endpoint, repo_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "files": [{ "path": remote_path, "sample": BASE64.encode(&sample), "size": size }],
            }))
            .send()?;
        let body: PreuploadResponse = check_status(response, &url)?.json()?;

        let file = body
            .files
            .into_iter()
            .find(|file| file.path == remote_path)
            .ok_or_else(|| Error::Registry(format!("{} missing from preupload answer", remote_path)))?;
        if file.should_ignore {
            return Err(Error::Registry(format!(
                "{} is ignored by the repository's .gitignore",
                remote_path
            )));
        }
        debug!("{} uploads as {:?} ({} bytes)", remote_path, file.upload_mode, size);
        Ok(file.upload_mode)
    }

    /// Pushes the file to LFS storage unless the Hub already holds it.
    fn upload_lfs(&self, repo_id: &str, local: &Path, pointer: &LfsPointer) -> Result<(), Error> {
        let url = format!("{}/datasets/{}.git/info/lfs/objects/batch", self.endpoint, repo_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, LFS_CONTENT_TYPE)
            .header(CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(
                json!({
                    "operation": "upload",
                    "transfers": ["basic"],
                    "objects": [{ "oid": pointer.oid, "size": pointer.size }],
                    "hash_algo": "sha256",
                })
                .to_string(),
            )
            .send()?;
        let batch: LfsBatchResponse = check_status(response, &url)?.json()?;

        let object = batch
            .objects
            .into_iter()
            .find(|object| object.oid == pointer.oid)
            .ok_or_else(|| Error::Registry(format!("LFS batch did not answer for {}", pointer.oid)))?;
        if let Some(err) = object.error {
            return Err(Error::Registry(format!(
                "LFS rejected {}: {} {}",
                pointer.oid, err.code, err.message
            )));
        }

        let actions = object.actions.unwrap_or_default();
        let Some(upload) = actions.upload else {
            debug!("LFS object {} already present", pointer.oid);
            return Ok(());
        };

        info!("Uploading {} bytes to LFS storage...", pointer.size);
        let body = Body::sized(File::open(local)?, pointer.size);
        let response = with_headers(self.http.put(&upload.href), &upload.header)
            .body(body)
            .send()?;
        check_status(response, &upload.href)?;

        if let Some(verify) = actions.verify {
            let response = with_headers(self.http.post(&verify.href), &verify.header)
                .bearer_auth(&self.token)
                .header(CONTENT_TYPE, LFS_CONTENT_TYPE)
                .body(json!({ "oid": pointer.oid, "size": pointer.size }).to_string())
                .send()?;
            check_status(response, &verify.href)?;
        }
        Ok(())
    }

    fn commit(&self, repo_id: &str, remote_path: &str, file: Value) -> Result<(), Error> {
        let url = format!("{}/api/datasets/{}/commit/main", self.endpoint, repo_id);
        let header = json!({
            "key": "header",
            "value": { "summary": format!("Upload {}", remote_path), "description": "" },
        });
        let body = format!("{}\n{}\n", header, file);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()?;
        check_status(response, &url)?;
        Ok(())
    }
}

impl DatasetRegistry for HubClient {
    fn publish(&self, repo_name: &str, saved: &SavedTable) -> Result<String, Error> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| Error::Registry("not logged in to the Hub".to_string()))?;
        let repo_id = format!("{}/{}", username, repo_name);
        let local = saved.data_file.as_path();

        self.create_repo(repo_name)?;
        let entry = match self.preupload(&repo_id, local, REMOTE_DATA_PATH)? {
            UploadMode::Regular => {
                let content = fs::read(local)?;
                json!({
                    "key": "file",
                    "value": {
                        "path": REMOTE_DATA_PATH,
                        "content": BASE64.encode(&content),
                        "encoding": "base64",
                    },
                })
            }
            UploadMode::Lfs => {
                let pointer = LfsPointer::from_file(local)?;
                self.upload_lfs(&repo_id, local, &pointer)?;
                json!({
                    "key": "lfsFile",
                    "value": {
                        "path": REMOTE_DATA_PATH,
                        "algo": "sha256",
                        "oid": pointer.oid,
                        "size": pointer.size,
                    },
                })
            }
        };
        self.commit(&repo_id, REMOTE_DATA_PATH, entry)?;

        Ok(format!("{}/datasets/{}", self.endpoint, repo_id))
    }
}

fn with_headers(mut request: RequestBuilder, headers: &HashMap<String, String>) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

fn check_status(response: Response, url: &str) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Registry(format!("{} returned {}: {}", url, status, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::persist::DatasetInfo;
    use chrono::Utc;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;
    use std::thread;
    use tempfile::tempdir;

    const PARQUET_BYTES: &[u8] = b"PAR1-table-PAR1";

    fn preupload_answer(mode: &str) -> String {
        format!(r#"{{"files": [{{"path": "{}", "uploadMode": "{}", "shouldIgnore": false}}]}}"#, REMOTE_DATA_PATH, mode)
    }

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    /// Reads one HTTP request (head plus `Content-Length` body) off the stream.
    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serves the `(status, body)` responses built from the stub's own base
    /// URL in order, one connection each, and hands back the raw requests.
    fn spawn_stub(
        responses: impl FnOnce(&str) -> Vec<(u16, String)>,
    ) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let responses = responses(&base);
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                seen.push(read_request(&mut stream));
                let head = format!(
                    "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(body.as_bytes()).unwrap();
                let _ = stream.flush();
            }
            seen
        });
        (base, handle)
    }

    fn saved_table(dir: &Path) -> SavedTable {
        let data_file = dir.join("data.parquet");
        fs::write(&data_file, PARQUET_BYTES).unwrap();
        SavedTable {
            dir: dir.to_path_buf(),
            data_file,
            info_file: dir.join("dataset_info.json"),
            info: DatasetInfo {
                dataset_name: "aria".to_string(),
                num_rows: 0,
                features: Vec::new(),
                source_directory: String::new(),
                prefix_hash_length: 8192,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_resolve_token() {
        assert!(matches!(resolve_token(None), Err(Error::MissingCredential(_))));
        assert!(matches!(
            resolve_token(Some("  ".to_string())),
            Err(Error::MissingCredential(_))
        ));
        assert_eq!(resolve_token(Some(" hf_abc\n".to_string())).unwrap(), "hf_abc");
    }

    #[test]
    fn test_login_reads_username() {
        let (endpoint, handle) = spawn_stub(|_| vec![(200, r#"{"name": "composer"}"#.to_string())]);
        let mut client = HubClient::new(&endpoint, "hf_test".to_string()).unwrap();

        assert_eq!(client.login().unwrap(), "composer");
        assert_eq!(client.username(), Some("composer"));

        let requests = handle.join().unwrap();
        assert!(requests[0].starts_with("GET /api/whoami-v2"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer hf_test"));
    }

    #[test]
    fn test_login_rejected_token() {
        let (endpoint, handle) = spawn_stub(|_| vec![(401, r#"{"error": "bad token"}"#.to_string())]);
        let mut client = HubClient::new(&endpoint, "hf_bad".to_string()).unwrap();

        let err = client.login().unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
        handle.join().unwrap();
    }

    #[test]
    fn test_publish_requires_login() {
        let tmp = tempdir().unwrap();
        let client = HubClient::new("http://127.0.0.1:9", "hf_test".to_string()).unwrap();
        let err = client.publish("aria", &saved_table(tmp.path())).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn test_publish_regular_commits_inline() {
        let tmp = tempdir().unwrap();
        let saved = saved_table(tmp.path());
        let (endpoint, handle) = spawn_stub(|_| {
            vec![
                (200, r#"{"name": "composer"}"#.to_string()),
                (409, r#"{"error": "exists"}"#.to_string()),
                (200, preupload_answer("regular")),
                (200, r#"{"commitOid": "abc"}"#.to_string()),
            ]
        });
        let mut client = HubClient::new(&endpoint, "hf_test".to_string()).unwrap();
        client.login().unwrap();

        let url = client.publish("aria", &saved).unwrap();
        assert_eq!(url, format!("{}/datasets/composer/aria", endpoint));

        let requests = handle.join().unwrap();
        assert!(requests[1].starts_with("POST /api/repos/create"));
        assert!(requests[1].contains(r#""type":"dataset""#));
        assert!(requests[2].starts_with("POST /api/datasets/composer/aria/preupload/main"));
        assert!(requests[2].contains(&BASE64.encode(PARQUET_BYTES)));
        assert!(requests[2].contains(&format!(r#""size":{}"#, PARQUET_BYTES.len())));
        assert!(requests[3].starts_with("POST /api/datasets/composer/aria/commit/main"));
        assert!(requests[3].contains(REMOTE_DATA_PATH));
        assert!(requests[3].contains(&BASE64.encode(PARQUET_BYTES)));
    }

    #[test]
    fn test_publish_lfs_streams_file_and_commits_pointer() {
        let tmp = tempdir().unwrap();
        let saved = saved_table(tmp.path());
        let oid = sha256_hex(PARQUET_BYTES);
        let batch_oid = oid.clone();
        let (endpoint, handle) = spawn_stub(move |base| {
            let batch = format!(
                r#"{{"objects": [{{"oid": "{oid}", "size": {size}, "actions": {{
                    "upload": {{"href": "{base}/lfs-store/{oid}", "header": {{"x-amz-acl": "private"}}}},
                    "verify": {{"href": "{base}/lfs-verify", "header": {{}}}}
                }}}}]}}"#,
                oid = batch_oid,
                size = PARQUET_BYTES.len(),
                base = base,
            );
            vec![
                (200, r#"{"name": "composer"}"#.to_string()),
                (200, r#"{"name": "composer/aria"}"#.to_string()),
                (200, preupload_answer("lfs")),
                (200, batch),
                (200, String::new()),
                (200, r#"{"message": "ok"}"#.to_string()),
                (200, r#"{"commitOid": "abc"}"#.to_string()),
            ]
        });
        let mut client = HubClient::new(&endpoint, "hf_test".to_string()).unwrap();
        client.login().unwrap();

        client.publish("aria", &saved).unwrap();

        let requests = handle.join().unwrap();
        let batch = &requests[3];
        assert!(batch.starts_with("POST /datasets/composer/aria.git/info/lfs/objects/batch"));
        assert!(batch.contains(r#""operation":"upload""#));
        assert!(batch.contains(&oid));

        let put = &requests[4];
        assert!(put.starts_with(&format!("PUT /lfs-store/{}", oid)));
        assert!(put.to_lowercase().contains("x-amz-acl: private"));
        assert!(put.ends_with(std::str::from_utf8(PARQUET_BYTES).unwrap()));
        assert!(!put.to_lowercase().contains("authorization"));

        assert!(requests[5].starts_with("POST /lfs-verify"));
        assert!(requests[5].contains(&oid));

        let commit = &requests[6];
        assert!(commit.starts_with("POST /api/datasets/composer/aria/commit/main"));
        assert!(commit.contains(r#""key":"lfsFile""#));
        assert!(commit.contains(&oid));
        assert!(!commit.contains(&BASE64.encode(PARQUET_BYTES)));
    }

    #[test]
    fn test_publish_lfs_skips_upload_of_known_object() {
        let tmp = tempdir().unwrap();
        let saved = saved_table(tmp.path());
        let oid = sha256_hex(PARQUET_BYTES);
        let batch = format!(r#"{{"objects": [{{"oid": "{}", "size": {}}}]}}"#, oid, PARQUET_BYTES.len());
        let (endpoint, handle) = spawn_stub(move |_| {
            vec![
                (200, r#"{"name": "composer"}"#.to_string()),
                (409, r#"{"error": "exists"}"#.to_string()),
                (200, preupload_answer("lfs")),
                (200, batch),
                (200, r#"{"commitOid": "abc"}"#.to_string()),
            ]
        });
        let mut client = HubClient::new(&endpoint, "hf_test".to_string()).unwrap();
        client.login().unwrap();

        client.publish("aria", &saved).unwrap();

        let requests = handle.join().unwrap();
        assert_eq!(requests.len(), 5);
        assert!(requests[4].starts_with("POST /api/datasets/composer/aria/commit/main"));
        assert!(requests[4].contains(r#""key":"lfsFile""#));
    }

    #[test]
    fn test_publish_lfs_object_error_is_fatal() {
        let tmp = tempdir().unwrap();
        let saved = saved_table(tmp.path());
        let batch = format!(
            r#"{{"objects": [{{"oid": "{}", "size": 1, "error": {{"code": 422, "message": "bad size"}}}}]}}"#,
            sha256_hex(PARQUET_BYTES)
        );
        let (endpoint, handle) = spawn_stub(move |_| {
            vec![
                (200, r#"{"name": "composer"}"#.to_string()),
                (409, r#"{"error": "exists"}"#.to_string()),
                (200, preupload_answer("lfs")),
                (200, batch),
            ]
        });
        let mut client = HubClient::new(&endpoint, "hf_test".to_string()).unwrap();
        client.login().unwrap();

        let err = client.publish("aria", &saved).unwrap_err();
        assert!(matches!(err, Error::Registry(message) if message.contains("bad size")));
        handle.join().unwrap();
    }
}
