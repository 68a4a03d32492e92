// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart;
use serde::Deserialize;

use crate::solver_trait::{Calibration, PlateSolver, SolveFailure, SolveResult};

const NOVA_BASE_URL: &str = "https://nova.astrometry.net";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SOLVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for the nova.astrometry.net plate solving service.
///
/// Drives the four-phase remote workflow: exchange the API key for a
/// session, upload the image, poll the submission until a job is assigned,
/// fetch the job's calibration. Each phase fails closed (no automatic
/// re-entry of an earlier phase), and every failure is folded into the
/// returned SolveResult.
pub struct NovaSolver {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    poll_interval: Duration,
    solve_timeout: Duration,

    // Set by cancel(); the poll loop exits when it sees this.
    cancel_requested: Arc<AtomicBool>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: Option<String>,
    session: Option<String>,
    errormessage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: Option<String>,
    subid: Option<u64>,
    errormessage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmissionStatusResponse {
    // Entries are null until the service assigns the job.
    jobs: Option<Vec<Option<u64>>>,
}

impl NovaSolver {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, NOVA_BASE_URL)
    }

    /// The service endpoint is a parameter so tests can stand in a local
    /// server.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        NovaSolver{
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            solve_timeout: DEFAULT_SOLVE_TIMEOUT,
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    pub fn set_solve_timeout(&mut self, solve_timeout: Duration) {
        self.solve_timeout = solve_timeout;
    }

    // Phase 1: exchange the API key for a session token.
    async fn login(&self) -> Result<String, SolveFailure> {
        let request_json = serde_json::json!({"apikey": self.api_key});
        let response = self.client
            .post(format!("{}/api/login", self.base_url))
            .form(&[("request-json", request_json.to_string())])
            .send().await
            .map_err(|e| SolveFailure::Transport(
                format!("login request: {}", e)))?;
        if !response.status().is_success() {
            return Err(SolveFailure::Auth(
                format!("login returned HTTP {}", response.status())));
        }
        let login: LoginResponse = response.json().await
            .map_err(|e| SolveFailure::Transport(
                format!("login response: {}", e)))?;
        if login.status.as_deref() != Some("success") {
            return Err(SolveFailure::Auth(
                login.errormessage.unwrap_or_else(
                    || "login rejected".to_string())));
        }
        login.session.ok_or_else(
            || SolveFailure::Auth("login response has no session".to_string()))
    }

    // Phase 2: upload the image, tagged private/non-commercial.
    async fn upload(&self, session: &str, image: &[u8])
                    -> Result<u64, SolveFailure> {
        let request_json = serde_json::json!({
            "session": session,
            "publicly_visible": "n",
            "allow_modifications": "d",
            "allow_commercial_use": "n",
        });
        let file_part = multipart::Part::bytes(image.to_vec())
            .file_name("field.png")
            .mime_str("application/octet-stream")
            .map_err(|e| SolveFailure::Transport(
                format!("upload form: {}", e)))?;
        let form = multipart::Form::new()
            .text("request-json", request_json.to_string())
            .part("file", file_part);
        let response = self.client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send().await
            .map_err(|e| SolveFailure::Transport(
                format!("upload request: {}", e)))?;
        if !response.status().is_success() {
            return Err(SolveFailure::Submission(
                format!("upload returned HTTP {}", response.status())));
        }
        let upload: UploadResponse = response.json().await
            .map_err(|e| SolveFailure::Transport(
                format!("upload response: {}", e)))?;
        if upload.status.as_deref() != Some("success") {
            return Err(SolveFailure::Submission(
                upload.errormessage.unwrap_or_else(
                    || "upload rejected".to_string())));
        }
        upload.subid.ok_or_else(
            || SolveFailure::Submission(
                "upload response has no subid".to_string()))
    }

    // Phase 3: poll the submission until the service assigns a job. Bounded
    // by the solve timeout and by cancel(); a bad HTTP status is fatal, with
    // no silent retry.
    async fn await_job(&self, subid: u64) -> Result<u64, SolveFailure> {
        let deadline = Instant::now() + self.solve_timeout;
        loop {
            if self.cancel_requested.load(Ordering::Relaxed) {
                return Err(SolveFailure::Cancelled(
                    format!("while polling submission {}", subid)));
            }
            if Instant::now() >= deadline {
                return Err(SolveFailure::TimedOut(format!(
                    "no job assigned to submission {} within {:?}",
                    subid, self.solve_timeout)));
            }
            let response = self.client
                .get(format!("{}/api/submissions/{}", self.base_url, subid))
                .send().await
                .map_err(|e| SolveFailure::Transport(
                    format!("status request: {}", e)))?;
            if !response.status().is_success() {
                return Err(SolveFailure::Transport(
                    format!("status returned HTTP {}", response.status())));
            }
            let status: SubmissionStatusResponse = response.json().await
                .map_err(|e| SolveFailure::Transport(
                    format!("status response: {}", e)))?;
            if let Some(job_id) = status.jobs.unwrap_or_default()
                .into_iter().flatten().find(|&id| id > 0)
            {
                return Ok(job_id);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    // Phase 4: fetch the astrometric solution for the job. An empty or
    // field-less body means the image could not be solved.
    async fn fetch_calibration(&self, job_id: u64)
                               -> Result<Calibration, SolveFailure> {
        let response = self.client
            .get(format!("{}/api/jobs/{}/calibration", self.base_url, job_id))
            .send().await
            .map_err(|e| SolveFailure::Transport(
                format!("calibration request: {}", e)))?;
        if !response.status().is_success() {
            return Err(SolveFailure::Calibration(
                format!("calibration returned HTTP {}", response.status())));
        }
        let body = response.text().await
            .map_err(|e| SolveFailure::Transport(
                format!("calibration response: {}", e)))?;
        if body.trim().is_empty() {
            return Err(SolveFailure::Calibration(
                format!("job {} has no calibration", job_id)));
        }
        serde_json::from_str::<Calibration>(&body)
            .map_err(|e| SolveFailure::Calibration(
                format!("job {}: {}", job_id, e)))
    }

    async fn run(&self, image: &[u8]) -> Result<Calibration, SolveFailure> {
        info!("Authenticating with {}", self.base_url);
        let session = self.login().await?;
        info!("Submitting {} byte image", image.len());
        let subid = self.upload(&session, image).await?;
        info!("Polling submission {}", subid);
        let job_id = self.await_job(subid).await?;
        info!("Fetching calibration for job {}", job_id);
        self.fetch_calibration(job_id).await
    }
}

#[async_trait]
impl PlateSolver for NovaSolver {
    async fn solve_image(&self, image: &[u8]) -> SolveResult {
        match self.run(image).await {
            Ok(calibration) => SolveResult::Solved(calibration),
            Err(failure) => {
                warn!("Plate solve failed: {}", failure);
                SolveResult::Failed(failure)
            }
        }
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_SOLVE_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use super::*;

    // Serves `app` on an ephemeral local port, returning its base URL.
    fn spawn_server(app: Router) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener).unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    fn fast_solver(base_url: &str) -> NovaSolver {
        let mut solver = NovaSolver::with_base_url("test-key", base_url);
        solver.set_poll_interval(Duration::from_millis(5));
        solver.set_solve_timeout(Duration::from_millis(250));
        solver
    }

    fn login_ok() -> Json<serde_json::Value> {
        Json(json!({"status": "success", "session": "sess-1"}))
    }

    fn upload_ok() -> Json<serde_json::Value> {
        Json(json!({"status": "success", "subid": 101}))
    }

    #[tokio::test]
    async fn test_full_workflow_yields_calibration() {
        let app = Router::new()
            .route("/api/login", post(|| async { login_ok() }))
            .route("/api/upload", post(|| async { upload_ok() }))
            .route("/api/submissions/:subid", get(|| async {
                Json(json!({"jobs": [null, 77]}))
            }))
            .route("/api/jobs/:job/calibration", get(|| async {
                Json(json!({"ra": 180.25, "dec": -45.5, "pixscale": 2.8}))
            }));
        let solver = fast_solver(&spawn_server(app));
        let result = solver.solve_image(b"image-bytes").await;
        assert_eq!(result, SolveResult::Solved(
            Calibration{ra: 180.25, dec: -45.5, pixscale: 2.8}));
    }

    #[tokio::test]
    async fn test_login_without_session_is_auth_failure() {
        let app = Router::new()
            .route("/api/login", post(|| async {
                Json(json!({"status": "success"}))
            }));
        let solver = fast_solver(&spawn_server(app));
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::Auth(_))));
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_failure() {
        let app = Router::new()
            .route("/api/login", post(|| async {
                Json(json!({"status": "error", "errormessage": "bad apikey"}))
            }));
        let solver = fast_solver(&spawn_server(app));
        match solver.solve_image(b"image-bytes").await {
            SolveResult::Failed(SolveFailure::Auth(msg)) =>
                assert!(msg.contains("bad apikey")),
            other => panic!("Expected Auth failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_without_subid_is_submission_failure() {
        let app = Router::new()
            .route("/api/login", post(|| async { login_ok() }))
            .route("/api/upload", post(|| async {
                Json(json!({"status": "success"}))
            }));
        let solver = fast_solver(&spawn_server(app));
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::Submission(_))));
    }

    #[tokio::test]
    async fn test_empty_calibration_body_is_calibration_failure() {
        let app = Router::new()
            .route("/api/login", post(|| async { login_ok() }))
            .route("/api/upload", post(|| async { upload_ok() }))
            .route("/api/submissions/:subid", get(|| async {
                Json(json!({"jobs": [42]}))
            }))
            .route("/api/jobs/:job/calibration", get(|| async { "" }));
        let solver = fast_solver(&spawn_server(app));
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::Calibration(_))));
    }

    #[tokio::test]
    async fn test_unassigned_job_times_out() {
        let app = Router::new()
            .route("/api/login", post(|| async { login_ok() }))
            .route("/api/upload", post(|| async { upload_ok() }))
            .route("/api/submissions/:subid", get(|| async {
                Json(json!({"jobs": []}))
            }));
        let mut solver = fast_solver(&spawn_server(app));
        solver.set_solve_timeout(Duration::from_millis(50));
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_polling() {
        let app = Router::new()
            .route("/api/login", post(|| async { login_ok() }))
            .route("/api/upload", post(|| async { upload_ok() }))
            .route("/api/submissions/:subid", get(|| async {
                Json(json!({"jobs": []}))
            }));
        let solver = fast_solver(&spawn_server(app));
        solver.cancel();
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_failure() {
        // Nothing listens on port 1.
        let solver = fast_solver("http://127.0.0.1:1");
        let result = solver.solve_image(b"image-bytes").await;
        assert!(matches!(result,
                         SolveResult::Failed(SolveFailure::Transport(_))));
    }
}
