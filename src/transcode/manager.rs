//! Submission flows: upload-and-run and notify-to-run.

use bytes::Bytes;
use encodeforge_av::{BitrateLadder, Prober, ToolCommand};
use encodeforge_common::{paths, Error, JobId, Result};
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;

use super::supervisor::{ProcessSupervisor, TranscodeSpec};
use crate::config::{Config, StorageConfig};
use crate::state::{FailureKind, Job, JobRegistry, JobState, Terminal};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Deletes an upload that was not written to completion, including when the
/// request is dropped mid-body.
struct PartialUpload {
    path: PathBuf,
    armed: bool,
}

impl PartialUpload {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed partial upload"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload")
            }
        }
    }
}

/// Turns submissions into running jobs.
pub struct TranscodeManager {
    registry: Arc<JobRegistry>,
    prober: Prober,
    supervisor: ProcessSupervisor,
    storage: StorageConfig,
}

impl TranscodeManager {
    pub fn new(config: &Config, registry: Arc<JobRegistry>) -> Self {
        let prober = Prober::new(
            ToolCommand::new(&config.tools.ffprobe).with_leading_args(&config.tools.ffprobe_args),
        );
        let supervisor = ProcessSupervisor::new(
            ToolCommand::new(&config.tools.transcoder)
                .with_leading_args(&config.tools.transcoder_args),
            config.jobs.stderr_tail_bytes,
        );
        Self {
            registry,
            prober,
            supervisor,
            storage: config.storage.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Validate an upload's file name, returning its extension.
    pub fn check_upload_name(&self, file_name: &str) -> Result<String> {
        let path = Path::new(file_name);
        if !paths::has_allowed_extension(path, &self.storage.allowed_extensions) {
            return Err(Error::invalid_input(format!(
                "unsupported file type: {} (allowed: {})",
                file_name,
                self.storage.allowed_extensions.join(", ")
            )));
        }
        paths::extension_of(path)
            .ok_or_else(|| Error::invalid_input(format!("missing extension: {}", file_name)))
    }

    /// Reject a declared size above the configured ceiling.
    pub fn check_upload_size(&self, declared: Option<u64>) -> Result<()> {
        match declared {
            Some(len) if len > self.storage.max_upload_bytes => Err(Error::invalid_input(format!(
                "upload of {} bytes exceeds the {} byte limit",
                len, self.storage.max_upload_bytes
            ))),
            _ => Ok(()),
        }
    }

    /// Store an uploaded file under a fresh id and start transcoding it.
    ///
    /// The file name is checked before an id is allocated.
    pub async fn submit_upload<S, E>(&self, file_name: &str, stream: S) -> Result<JobId>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        let ext = self.check_upload_name(file_name)?;
        let id = JobId::new();
        let dest = paths::upload_path(&self.storage.upload_root, &id, &ext);

        tokio::fs::create_dir_all(&self.storage.upload_root).await?;
        self.stream_to_file(&dest, stream).await?;

        tracing::info!(job_id = %id, file_name, path = %dest.display(), "Upload stored");
        self.start_job(id, dest).await
    }

    async fn stream_to_file<S, E>(&self, path: &Path, stream: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        let limit = self.storage.max_upload_bytes;
        let partial = PartialUpload::new(path);
        let written = async {
            let body = stream.map_err(io::Error::other);
            let reader = StreamReader::new(body);
            futures::pin_mut!(reader);
            let mut limited = reader.take(limit + 1);

            let mut file = BufWriter::new(File::create(path).await?);
            let written = tokio::io::copy(&mut limited, &mut file).await?;
            file.flush().await?;
            Ok::<_, io::Error>(written)
        }
        .await;

        match written {
            Ok(n) if n <= limit => {
                partial.keep();
                Ok(n)
            }
            Ok(_) => Err(Error::invalid_input(format!(
                "upload exceeds the {} byte limit",
                limit
            ))),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Start transcoding a file uploaded out-of-band under `raw_id`.
    pub async fn notify_upload(&self, raw_id: &str) -> Result<JobId> {
        let id = JobId::parse(raw_id)?;
        let input = paths::find_upload(
            &self.storage.upload_root,
            &id,
            &self.storage.allowed_extensions,
        )
        .unwrap_or_else(|| self.storage.upload_root.join(id.as_str()));
        self.start_job(id, input).await
    }

    /// Register, probe, and launch a job. Returns once the transcoder is
    /// spawning in the background.
    pub async fn start_job(&self, id: JobId, input_path: PathBuf) -> Result<JobId> {
        let output_dir = paths::output_dir(&self.storage.output_root, &id);
        let job = Job::new(id.clone(), input_path.clone(), output_dir.clone());
        let sender = self.registry.create(job)?;

        if !input_path.is_file() {
            let message = format!("input file not found: {}", input_path.display());
            sender.finish(Terminal::failed(FailureKind::NotFound, message.clone()));
            return Err(Error::not_found(message));
        }

        self.registry.transition(&id, JobState::Probing)?;

        let prober = self.prober.clone();
        let probe_path = input_path.clone();
        let probed = tokio::task::spawn_blocking(move || prober.probe(&probe_path))
            .await
            .map_err(|e| Error::internal(format!("probe task failed: {}", e)));

        let outcome = match probed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(encodeforge_av::Error::FileNotFound { path })) => {
                let message = format!("input file not found: {}", path.display());
                sender.finish(Terminal::failed(FailureKind::NotFound, message.clone()));
                return Err(Error::not_found(message));
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %id, error = %e, "Probe failed");
                sender.finish(Terminal::failed(FailureKind::Probe, e.to_string()));
                return Err(Error::probe_failure(e.to_string()));
            }
            Err(e) => {
                sender.finish(Terminal::failed(FailureKind::Probe, e.to_string()));
                return Err(e);
            }
        };

        let ladder = match BitrateLadder::from_source_bitrate(outcome.bitrate) {
            Ok(ladder) => ladder,
            Err(e) => {
                sender.finish(Terminal::failed(FailureKind::Probe, e.to_string()));
                return Err(Error::probe_failure(e.to_string()));
            }
        };

        self.registry.mark_running(&id, ladder, outcome.duration)?;
        tracing::info!(
            job_id = %id,
            bitrate = outcome.bitrate,
            duration_secs = outcome.duration.map(|d| d.as_secs_f64()),
            "Probe complete, launching transcoder"
        );

        let spec = TranscodeSpec {
            job_id: id.clone(),
            input_path,
            output_dir,
            ladder,
            duration: outcome.duration,
        };
        let handle = self.supervisor.launch(spec, sender);
        self.registry.attach_task(&id, handle);

        Ok(id)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::state::JobView;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        manager: TranscodeManager,
    }

    fn fixture(probe_body: &str, transcode_body: &str, max_upload_bytes: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let probe = root.join("ffprobe.sh");
        let transcoder = root.join("transcoder.sh");
        std::fs::write(&probe, probe_body).unwrap();
        std::fs::write(&transcoder, transcode_body).unwrap();

        let mut config = Config::default();
        config.storage.upload_root = root.join("uploads");
        config.storage.output_root = root.join("encoded");
        config.storage.max_upload_bytes = max_upload_bytes;
        config.tools.ffprobe = PathBuf::from("sh");
        config.tools.ffprobe_args = vec![probe.to_string_lossy().into_owned()];
        config.tools.transcoder = PathBuf::from("sh");
        config.tools.transcoder_args = vec![transcoder.to_string_lossy().into_owned()];

        let manager = TranscodeManager::new(&config, JobRegistry::new(Duration::from_secs(60)));
        Fixture {
            _dir: dir,
            root,
            manager,
        }
    }

    const GOOD_PROBE: &str =
        "echo '{\"format\": {\"bit_rate\": \"10000000\", \"duration\": \"50.0\"}}'\n";
    const GOOD_TRANSCODE: &str = "echo 'out_time_ms=25000000'\nexit 0\n";

    fn body(chunks: Vec<&'static [u8]>) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
    }

    async fn wait_terminal(manager: &TranscodeManager, id: &JobId) -> JobView {
        for _ in 0..400 {
            if let Some(view) = manager.registry().get(id) {
                if view.state.is_terminal() {
                    return view;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn test_submit_upload_runs_job() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        let id = fx
            .manager
            .submit_upload("clip.MP4", body(vec![b"fake ", b"video"]))
            .await
            .unwrap();

        let stored = fx.root.join("uploads").join(format!("{}.mp4", id));
        assert_eq!(std::fs::read(&stored).unwrap(), b"fake video");

        let view = wait_terminal(&fx.manager, &id).await;
        assert_eq!(view.state, JobState::Completed);
        assert_eq!(view.ladder.unwrap().bitrate_1080, 4500);
        assert_eq!(view.duration_secs, Some(50.0));
        assert!(fx.root.join("encoded").join(id.as_str()).is_dir());
    }

    #[tokio::test]
    async fn test_bad_extension_rejected_before_storing() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        let err = fx
            .manager
            .submit_upload("notes.txt", body(vec![b"hello"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));
        assert!(!fx.root.join("uploads").exists());
        assert!(fx.manager.registry().list().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_removed() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 8);
        let err = fx
            .manager
            .submit_upload("clip.mkv", body(vec![b"0123456", b"789"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));
        let leftovers = std::fs::read_dir(fx.root.join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
        assert!(fx.manager.registry().list().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_upload_removed() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        // The client sends one chunk and then goes quiet until the request is dropped.
        let stalled = body(vec![b"partial"]).chain(futures::stream::pending());

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            fx.manager.submit_upload("clip.mp4", stalled),
        )
        .await;
        assert!(result.is_err());

        let leftovers = std::fs::read_dir(fx.root.join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
        assert!(fx.manager.registry().list().is_empty());
    }

    #[test]
    fn test_declared_size_check() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 8);
        assert!(fx.manager.check_upload_size(None).is_ok());
        assert!(fx.manager.check_upload_size(Some(8)).is_ok());
        assert_matches!(
            fx.manager.check_upload_size(Some(9)),
            Err(Error::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn test_notify_resolves_extension() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        std::fs::create_dir_all(fx.root.join("uploads")).unwrap();
        std::fs::write(fx.root.join("uploads").join("abc-123.flv"), b"x").unwrap();

        let id = fx.manager.notify_upload("abc-123").await.unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(
            wait_terminal(&fx.manager, &id).await.state,
            JobState::Completed
        );
    }

    #[tokio::test]
    async fn test_notify_missing_file_is_not_found() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        let err = fx.manager.notify_upload("ghost").await.unwrap_err();
        assert_matches!(err, Error::NotFound(_));

        let view = wait_terminal(&fx.manager, &JobId::parse("ghost").unwrap()).await;
        assert_eq!(view.state, JobState::NotFound);
    }

    #[tokio::test]
    async fn test_notify_rejects_malformed_id() {
        let fx = fixture(GOOD_PROBE, GOOD_TRANSCODE, 1024);
        assert_matches!(
            fx.manager.notify_upload("../../etc/passwd").await,
            Err(Error::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn test_probe_failure_is_synchronous() {
        let fx = fixture("echo 'Invalid data' >&2\nexit 1\n", GOOD_TRANSCODE, 1024);
        let err = fx
            .manager
            .submit_upload("clip.mp4", body(vec![b"x"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ProbeFailure(_));

        let views = fx.manager.registry().list();
        assert_eq!(views.len(), 1);
        let view = wait_terminal(&fx.manager, &views[0].job_id).await;
        assert_eq!(view.state, JobState::ProbeFailed);
        assert!(view.ladder.is_none());
    }

    #[tokio::test]
    async fn test_missing_bitrate_is_probe_failure() {
        let fx = fixture("echo '{\"format\": {}}'\n", GOOD_TRANSCODE, 1024);
        let err = fx
            .manager
            .submit_upload("clip.mp4", body(vec![b"x"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ProbeFailure(_));
    }

    #[tokio::test]
    async fn test_duplicate_notify_while_running() {
        let fx = fixture(GOOD_PROBE, "sleep 1\nexit 0\n", 1024);
        std::fs::create_dir_all(fx.root.join("uploads")).unwrap();
        std::fs::write(fx.root.join("uploads").join("busy.mp4"), b"x").unwrap();

        let id = fx.manager.notify_upload("busy").await.unwrap();
        assert_matches!(
            fx.manager.notify_upload("busy").await,
            Err(Error::AlreadyRunning(_))
        );

        assert_eq!(
            wait_terminal(&fx.manager, &id).await.state,
            JobState::Completed
        );
        assert!(fx.manager.notify_upload("busy").await.is_ok());
    }

    #[tokio::test]
    async fn test_transcoder_failure_is_asynchronous() {
        let fx = fixture(GOOD_PROBE, "echo 'disk full' >&2\nexit 2\n", 1024);
        let id = fx
            .manager
            .submit_upload("clip.mov", body(vec![b"x"]))
            .await
            .unwrap();
        let view = wait_terminal(&fx.manager, &id).await;
        assert_eq!(view.state, JobState::Failed);
        assert!(view.result.message().unwrap().contains("disk full"));
    }
}
