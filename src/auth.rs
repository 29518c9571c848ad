// Authorization bootstrap: persisted credentials, token refresh, and the
// interactive installed-app flow (authorization code + PKCE, loopback
// redirect). Runs once per process, before the store is built.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, IsTerminal, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{DriveError, Result};

/// Full read/write access to the user's drive.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access tokens are treated as expired this long before their deadline.
const EXPIRY_SKEW_SECS: i64 = 60;

/// How long a loopback connection may stay silent before it is dropped.
const LOOPBACK_READ_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Session credentials as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map_or(false, |deadline| now + Duration::seconds(EXPIRY_SKEW_SECS) >= deadline)
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().map_or(false, |t| !t.is_empty())
    }

    /// Build credentials from a token endpoint answer. A refresh answer
    /// usually omits the refresh token, so the previous one is kept.
    fn from_response(resp: TokenResponse, previous_refresh: Option<String>) -> Self {
        Credentials {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh),
            expires_at: resp
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// OAuth client registration, read from the console's client-secrets JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            DriveError::Auth(format!(
                "cannot read client secrets {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_slice(&data)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let file: SecretsFile = serde_json::from_slice(data)
            .map_err(|e| DriveError::Auth(format!("invalid client secrets: {}", e)))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| DriveError::Auth("client secrets lack an 'installed' or 'web' entry".into()))
    }

    /// Consent page URL for the authorization-code flow.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
    ) -> Result<Url> {
        let scope = scopes.join(" ");
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| DriveError::Auth(format!("invalid auth_uri '{}': {}", self.auth_uri, e)))
    }
}

/// PKCE verifier/challenge pair (S256).
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Pkce {
            verifier,
            challenge,
        }
    }
}

/// Reads and writes the persisted credential file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored credentials, or `None` when the file is absent or unreadable.
    pub fn load(&self) -> Option<Credentials> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read token file");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt token file");
                None
            }
        }
    }

    /// Write `creds` owner-readable only, replacing any previous file whole.
    pub fn save(&self, creds: &Credentials) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(creds)?)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), "Credentials persisted");
        Ok(())
    }
}

/// Inputs of the authorization bootstrap.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_secrets: PathBuf,
    pub token_file: PathBuf,
    pub scopes: Vec<String>,
    /// Whether the consent flow may prompt the user.
    pub interactive: bool,
}

impl AuthConfig {
    pub fn new(client_secrets: PathBuf, token_file: PathBuf) -> Self {
        AuthConfig {
            client_secrets,
            token_file,
            scopes: vec![DRIVE_SCOPE.to_string()],
            interactive: std::io::stdin().is_terminal(),
        }
    }
}

pub struct Authenticator {
    config: AuthConfig,
    http: Client,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Authenticator { config, http })
    }

    /// Produce usable credentials: stored ones if still valid, refreshed
    /// ones if they can be refreshed, otherwise the interactive flow.
    /// Anything newly obtained is persisted.
    pub fn authenticate(&self) -> Result<Credentials> {
        let store = TokenStore::new(&self.config.token_file);
        let creds = match store.load() {
            Some(creds) if creds.is_valid() => {
                info!("Using persisted credentials");
                return Ok(creds);
            }
            Some(creds) if creds.can_refresh() => match self.refresh(&creds) {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, falling back to interactive authorization");
                    self.interactive()?
                }
            },
            _ => self.interactive()?,
        };
        store.save(&creds)?;
        info!("Authenticated with Google Drive");
        Ok(creds)
    }

    pub fn refresh(&self, creds: &Credentials) -> Result<Credentials> {
        let refresh_token = creds
            .refresh_token
            .clone()
            .ok_or_else(|| DriveError::Auth("no refresh token".into()))?;
        let secrets = ClientSecrets::from_file(&self.config.client_secrets)?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", secrets.client_id.as_str()),
        ];
        if let Some(secret) = &secrets.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        let resp = self.token_request(&secrets.token_uri, &form)?;
        info!("Access token refreshed");
        Ok(Credentials::from_response(resp, Some(refresh_token)))
    }

    fn interactive(&self) -> Result<Credentials> {
        if !self.config.interactive {
            return Err(DriveError::Auth(
                "no valid stored credentials and interactive authorization is unavailable".into(),
            ));
        }
        let secrets = ClientSecrets::from_file(&self.config.client_secrets)?;

        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let pkce = Pkce::generate();
        let state = Uuid::new_v4().simple().to_string();
        let url = secrets.authorization_url(&redirect_uri, &self.config.scopes, &state, &pkce.challenge)?;

        println!("Open this URL in your browser to authorize access:\n\n  {}\n", url);
        info!(redirect = %redirect_uri, "Waiting for authorization redirect");
        let code = wait_for_code(&listener, &state)?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ];
        if let Some(secret) = &secrets.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        let resp = self.token_request(&secrets.token_uri, &form)?;
        Ok(Credentials::from_response(resp, None))
    }

    fn token_request(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let res = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .map_err(|e| DriveError::Auth(format!("token request failed: {}", e)))?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            return Err(DriveError::Auth(format!(
                "token endpoint returned {} - {}",
                status, txt
            )));
        }
        res.json()
            .map_err(|e| DriveError::Auth(format!("invalid token response: {}", e)))
    }
}

/// Authenticate once with `config`. An error here is fatal for the process.
pub fn authenticate(config: &AuthConfig) -> Result<Credentials> {
    Authenticator::new(config.clone())?.authenticate()
}

/// Serve loopback requests until one carries the authorization result.
fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String> {
    for stream in listener.incoming() {
        let mut stream = stream?;
        let Some(request_line) = read_request_line(&stream, LOOPBACK_READ_TIMEOUT)? else {
            debug!("Idle loopback connection dropped");
            continue;
        };

        match parse_redirect(&request_line, state) {
            Ok(Some(code)) => {
                respond(&mut stream, "200 OK", "Authorization complete. You can close this window.");
                return Ok(code);
            }
            Ok(None) => respond(&mut stream, "404 Not Found", "Not found."),
            Err(e) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed. Check the terminal.");
                return Err(e);
            }
        }
    }
    Err(DriveError::Auth("loopback listener closed".into()))
}

/// First line of a loopback request, or `None` when the peer sends nothing
/// before the read timeout (browsers open speculative connections).
fn read_request_line(stream: &TcpStream, timeout: StdDuration) -> Result<Option<String>> {
    stream.set_read_timeout(Some(timeout))?;
    let mut request_line = String::new();
    match BufReader::new(stream).read_line(&mut request_line) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(request_line)),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn respond(stream: &mut impl Write, status: &str, body: &str) {
    let reply = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(reply.as_bytes()) {
        debug!(error = %e, "Could not answer loopback request");
    }
}

/// Extract the authorization code from a redirect request line such as
/// `GET /?state=..&code=.. HTTP/1.1`. Requests without `code` or `error`
/// (favicon probes) yield `Ok(None)`.
pub(crate) fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Option<String>> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| DriveError::Auth("malformed redirect request".into()))?;
    let url = Url::parse(&format!("http://127.0.0.1{}", target))
        .map_err(|e| DriveError::Auth(format!("malformed redirect target: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(DriveError::Auth(format!("consent denied: {}", error)));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(DriveError::Auth("state mismatch in authorization redirect".into()));
    }
    Ok(Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn creds(expires_in: Option<i64>, refresh: Option<&str>) -> Credentials {
        Credentials {
            access_token: "ya29.token".into(),
            refresh_token: refresh.map(String::from),
            expires_at: expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }

    #[test]
    fn test_validity() {
        assert!(creds(None, None).is_valid());
        assert!(creds(Some(3600), None).is_valid());
        assert!(!creds(Some(-10), None).is_valid());
        // inside the skew window
        assert!(!creds(Some(30), None).is_valid());
        assert!(creds(Some(-10), Some("1//r")).can_refresh());
        assert!(!creds(Some(-10), Some("")).can_refresh());
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let resp = TokenResponse {
            access_token: "new".into(),
            expires_in: Some(3599),
            refresh_token: None,
        };
        let c = Credentials::from_response(resp, Some("1//old".into()));
        assert_eq!(c.access_token, "new");
        assert_eq!(c.refresh_token.as_deref(), Some("1//old"));
        assert!(c.is_valid());
    }

    #[test]
    fn test_token_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));
        assert_eq!(store.load(), None);

        let c = creds(Some(3600), Some("1//r"));
        store.save(&c).unwrap();
        assert_eq!(store.load(), Some(c));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&creds(Some(3600), Some("1//r"))).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "token file mode {:o}", mode);

        // overwriting keeps the restricted mode
        store.save(&creds(Some(60), None)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_token_store_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, b"\x80\x04\x95garbage").unwrap();
        assert_eq!(TokenStore::new(path).load(), None);
    }

    #[test]
    fn test_client_secrets_installed_and_web() {
        let s = ClientSecrets::from_slice(
            br#"{"installed":{"client_id":"id.apps","client_secret":"s3cr3t","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(s.client_id, "id.apps");
        assert_eq!(s.token_uri, DEFAULT_TOKEN_URI);

        let s = ClientSecrets::from_slice(
            br#"{"web":{"client_id":"w","token_uri":"http://127.0.0.1:1/token"}}"#,
        )
        .unwrap();
        assert_eq!(s.client_secret, None);
        assert_eq!(s.token_uri, "http://127.0.0.1:1/token");

        assert!(ClientSecrets::from_slice(br#"{"other":{}}"#).unwrap_err().is_fatal());
    }

    #[test]
    fn test_missing_secrets_file_is_auth_error() {
        let err = ClientSecrets::from_file(Path::new("/nonexistent/credentials.json")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_authorization_url() {
        let s = ClientSecrets::from_slice(br#"{"installed":{"client_id":"id.apps"}}"#).unwrap();
        let url = s
            .authorization_url("http://127.0.0.1:8765", &[DRIVE_SCOPE.to_string()], "st", "ch")
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(url.as_str().starts_with(DEFAULT_AUTH_URI));
        assert!(pairs.contains(&("scope".into(), DRIVE_SCOPE.into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://127.0.0.1:8765".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
    }

    #[test]
    fn test_pkce_challenge() {
        // RFC 7636 appendix B
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(Pkce::generate().verifier.len(), 64);
    }

    #[test]
    fn test_parse_redirect() {
        assert_eq!(
            parse_redirect("GET /?state=abc&code=4%2F0Ab HTTP/1.1\r\n", "abc").unwrap(),
            Some("4/0Ab".to_string())
        );
        assert_eq!(parse_redirect("GET /favicon.ico HTTP/1.1\r\n", "abc").unwrap(), None);
        assert!(parse_redirect("GET /?state=zzz&code=x HTTP/1.1", "abc").is_err());
        assert!(parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1", "abc").is_err());
        assert!(parse_redirect("", "abc").is_err());
    }

    #[test]
    fn test_silent_loopback_connection_is_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let idle = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let line = read_request_line(&server_side, StdDuration::from_millis(50)).unwrap();
        assert_eq!(line, None);
        drop(idle);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET /?state=s&code=c HTTP/1.1\r\n\r\n").unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let line = read_request_line(&server_side, StdDuration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(parse_redirect(&line, "s").unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_non_interactive_without_token_is_fatal() {
        let dir = tempdir().unwrap();
        let config = AuthConfig {
            client_secrets: dir.path().join("credentials.json"),
            token_file: dir.path().join("token.json"),
            scopes: vec![DRIVE_SCOPE.to_string()],
            interactive: false,
        };
        let err = authenticate(&config).unwrap_err();
        assert!(err.is_fatal());
        assert!(!config.token_file.exists());
    }

    #[test]
    fn test_valid_persisted_token_is_reused() {
        let dir = tempdir().unwrap();
        let config = AuthConfig {
            client_secrets: dir.path().join("credentials.json"),
            token_file: dir.path().join("token.json"),
            scopes: vec![DRIVE_SCOPE.to_string()],
            interactive: false,
        };
        let c = creds(Some(3600), None);
        TokenStore::new(&config.token_file).save(&c).unwrap();
        assert_eq!(authenticate(&config).unwrap(), c);
    }
}
