//! Presence check and download of the model the app depends on.

use std::sync::Arc;

use eodi_signals::{Matcher, RuleTable, StreamFilter};
use log::{debug, error, info};

use super::coalesce::Coalesced;
use super::detector::InstallationDetector;
use super::error::PullError;
use super::host::{drain_in_background, Host, LaunchSpec, OutputTail, ProcessEvent};
use super::inventory::InventoryClient;
use super::status::{DownloadProgress, StatusSink};

pub const DEFAULT_MODEL_ID: &str = "qwen2.5-vl-7b";

/// What a line of `ollama pull` output means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullSignal {
    Completed,
    Failed,
    Progress(i32),
}

/// Rules for `ollama pull`. Completion and failure are reported on stderr;
/// an explicit percentage beats the coarse stage estimates below it.
pub fn pull_rules() -> RuleTable<PullSignal> {
    use PullSignal::*;
    RuleTable::new()
        .signal(StreamFilter::Stderr, Matcher::word("success"), Completed)
        .signal(StreamFilter::Stderr, Matcher::contains("Error:"), Failed)
        .signal(StreamFilter::Stderr, Matcher::contains("error:"), Failed)
        .on(StreamFilter::Any, Matcher::Percent, |m| {
            m.number::<i32>().map(|p| Progress(p.clamp(0, 100)))
        })
        .signal(StreamFilter::Any, Matcher::contains("pulling manifest"), Progress(5))
        .signal(StreamFilter::Any, Matcher::SizeUnit, Progress(30))
        .signal(StreamFilter::Any, Matcher::contains("verifying"), Progress(95))
}

pub struct ModelManager {
    host: Arc<dyn Host>,
    inventory: Arc<dyn InventoryClient>,
    detector: Arc<InstallationDetector>,
    model_id: String,
    rules: RuleTable<PullSignal>,
    pull: Coalesced<Result<(), PullError>>,
}

impl ModelManager {
    pub fn new(
        host: Arc<dyn Host>,
        inventory: Arc<dyn InventoryClient>,
        detector: Arc<InstallationDetector>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            host,
            inventory,
            detector,
            model_id: model_id.into(),
            rules: pull_rules(),
            pull: Coalesced::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_pulling(&self) -> bool {
        self.pull.is_running()
    }

    /// Never fails: an unreachable server or unreadable inventory means "absent"
    pub async fn is_present(&self) -> bool {
        match self.inventory.tags().await {
            Ok(tags) => tags.contains(&self.model_id),
            Err(e) => {
                debug!("Model check failed: {}", e);
                false
            }
        }
    }

    /// Download the model, reporting progress to `sink`.
    ///
    /// A pull already in flight is joined rather than restarted.
    pub async fn pull(self: &Arc<Self>, sink: Arc<dyn StatusSink>) -> Result<(), PullError> {
        let this = self.clone();
        self.pull
            .run(move || async move { this.pull_inner(sink.as_ref()).await })
            .await
    }

    async fn pull_inner(&self, sink: &dyn StatusSink) -> Result<(), PullError> {
        let program = self.detector.resolve_executable().await;
        let spec = LaunchSpec::new("ollama pull", program)
            .arg("pull")
            .arg(self.model_id.as_str());
        info!("Pulling model: {}", spec.command_line());

        let mut process = self
            .host
            .spawn(&spec)
            .await
            .map_err(|e| PullError::Launch(e.to_string()))?;

        let mut tail = OutputTail::new(20);
        let mut last_percent = None;

        loop {
            match process.next_event().await {
                ProcessEvent::Output(line) => {
                    tail.push(&line);
                    match self.rules.classify(&line) {
                        Some(PullSignal::Completed) => {
                            self.report_complete(sink);
                            drain_in_background(process, spec.label.clone());
                            return Ok(());
                        }
                        Some(PullSignal::Failed) => {
                            error!("Model pull failed: {}", line.text);
                            sink.progress(DownloadProgress::failed(line.text.clone()));
                            drain_in_background(process, spec.label.clone());
                            return Err(PullError::Reported {
                                line: line.text,
                                output: tail.text(),
                            });
                        }
                        Some(PullSignal::Progress(percent)) if last_percent != Some(percent) => {
                            last_percent = Some(percent);
                            sink.progress(DownloadProgress::new(
                                percent,
                                format!("Downloading {}: {}%", self.model_id, percent),
                            ));
                        }
                        _ => {}
                    }
                }
                ProcessEvent::Exited(Some(0)) => {
                    self.report_complete(sink);
                    return Ok(());
                }
                ProcessEvent::Exited(code) => {
                    let err = PullError::Exited {
                        code,
                        output: tail.text(),
                    };
                    error!("{}", err);
                    sink.progress(DownloadProgress::failed(err.to_string()));
                    return Err(err);
                }
            }
        }
    }

    fn report_complete(&self, sink: &dyn StatusSink) {
        info!("Model {} downloaded", self.model_id);
        sink.progress(DownloadProgress::new(100, "Model download complete"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::inventory::InventoryError;
    use eodi_signals::OutputLine;
    use crate::runtime::platform::{Os, PlatformPaths};
    use crate::runtime::testing::{FakeHost, FakeInventory, FakeScript, RecordingSink};
    use std::path::Path;
    use std::time::Duration;

    fn manager(host: Arc<FakeHost>, inventory: FakeInventory) -> Arc<ModelManager> {
        let paths = PlatformPaths::resolve(Os::Linux, Path::new("/home/me"));
        let detector = Arc::new(InstallationDetector::new(host.clone(), paths));
        Arc::new(ModelManager::new(
            host,
            Arc::new(inventory),
            detector,
            DEFAULT_MODEL_ID,
        ))
    }

    #[tokio::test]
    async fn presence_matches_by_substring() {
        let host = Arc::new(FakeHost::new());
        let present = manager(host.clone(), FakeInventory::with_models(&["qwen2.5-vl-7b:latest"]));
        assert!(present.is_present().await);

        let absent = manager(host, FakeInventory::with_models(&["qwen2.5:7b", "llava:13b"]));
        assert!(!absent.is_present().await);
    }

    #[tokio::test]
    async fn presence_is_false_on_bad_inventory() {
        let host = Arc::new(FakeHost::new());
        let malformed = manager(host.clone(), FakeInventory::always(Ok("{not json".into())));
        assert!(!malformed.is_present().await);

        let down = manager(host, FakeInventory::always(Err(InventoryError::Status(500))));
        assert!(!down.is_present().await);
    }

    #[tokio::test]
    async fn stage_keywords_and_percentages_become_progress() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("pulling manifest")
                .stderr("47%")
                .stderr("pulling 2bada8a74506: 47% ▕███       ▏ 2.2 GB/4.7 GB")
                .stderr("verifying sha256 digest")
                .stderr("writing manifest")
                .stderr("success")
                .hang(),
        ));
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(host.clone(), FakeInventory::down());

        assert_eq!(manager.pull(sink.clone()).await, Ok(()));
        assert_eq!(sink.percents(), vec![5, 47, 95, 100]);
        assert_eq!(host.spawned()[0].args, vec!["pull", DEFAULT_MODEL_ID]);
    }

    #[tokio::test]
    async fn size_marker_without_percentage_is_bulk_transfer() {
        let host = Arc::new(FakeHost::new().script(FakeScript::new().stderr("pulling 2bada8a74506: 1.2 GB").exit(0)));
        let sink = Arc::new(RecordingSink::default());
        assert!(manager(host, FakeInventory::down()).pull(sink.clone()).await.is_ok());
        assert_eq!(sink.percents(), vec![30, 100]);
    }

    #[tokio::test]
    async fn success_before_error_wins() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("success")
                .stderr("Error: something after the fact")
                .exit(1),
        ));
        let sink = Arc::new(RecordingSink::default());
        assert_eq!(manager(host, FakeInventory::down()).pull(sink.clone()).await, Ok(()));
        assert!(!sink.percents().contains(&-1));
    }

    #[tokio::test]
    async fn error_marker_rejects_with_output() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("pulling manifest")
                .stderr("Error: pull model manifest: file does not exist")
                .exit(1),
        ));
        let sink = Arc::new(RecordingSink::default());
        let err = manager(host, FakeInventory::down())
            .pull(sink.clone())
            .await
            .unwrap_err();

        match err {
            PullError::Reported { line, output } => {
                assert!(line.starts_with("Error: pull model manifest"));
                assert!(output.contains("pulling manifest"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sink.percents(), vec![5, -1]);
    }

    #[tokio::test]
    async fn exit_code_decides_when_no_marker_was_seen() {
        let host = Arc::new(FakeHost::new().script(FakeScript::new().stdout("done").exit(0)));
        let sink = Arc::new(RecordingSink::default());
        assert!(manager(host, FakeInventory::down()).pull(sink).await.is_ok());

        let host = Arc::new(FakeHost::new().script(FakeScript::new().stdout("killed").exit(137)));
        let sink = Arc::new(RecordingSink::default());
        let err = manager(host, FakeInventory::down()).pull(sink.clone()).await.unwrap_err();
        assert_eq!(
            err,
            PullError::Exited {
                code: Some(137),
                output: "killed".into()
            }
        );
        assert_eq!(sink.percents(), vec![-1]);
    }

    #[tokio::test]
    async fn concurrent_pulls_share_one_process() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .delay(Duration::from_millis(20))
                .stderr("success")
                .exit(0),
        ));
        let manager = manager(host.clone(), FakeInventory::down());
        let sink: Arc<dyn StatusSink> = Arc::new(RecordingSink::default());

        let (a, b) = tokio::join!(manager.pull(sink.clone()), manager.pull(sink));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(host.spawn_count(), 1);
    }

    #[test]
    fn rule_table_order() {
        let rules = pull_rules();
        assert_eq!(
            rules.classify(&OutputLine::stdout("pulling manifest")),
            Some(PullSignal::Progress(5))
        );
        assert_eq!(rules.classify(&OutputLine::stdout("47%")), Some(PullSignal::Progress(47)));
        assert_eq!(rules.classify(&OutputLine::stdout("success")), None);
        assert_eq!(rules.classify(&OutputLine::stderr("success")), Some(PullSignal::Completed));
    }

    #[tokio::test]
    async fn unsuccessful_is_not_completion() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("Error: pull unsuccessful, retry later")
                .exit(1),
        ));
        let sink = Arc::new(RecordingSink::default());
        let err = manager(host, FakeInventory::down())
            .pull(sink.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, PullError::Reported { .. }));
        assert_eq!(sink.percents(), vec![-1]);
    }
}
