use serde::{Deserialize, Serialize};

/// Events emitted while acquiring books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    RunStarted {
        wanted: usize,
    },
    SearchCompleted {
        query: String,
        responses: usize,
        fallback: bool,
    },
    MatchFound {
        title: String,
        filename: String,
        peer: String,
        filetype: String,
        score: f64,
    },
    DownloadEnqueued {
        title: String,
        peer: String,
        files: usize,
    },
    FileRequeued {
        title: String,
        filename: String,
        retry_count: u32,
    },
    DownloadCompleted {
        title: String,
        peer: String,
    },
    DownloadAborted {
        title: String,
        peer: String,
        reason: String,
    },
    ItemFailed {
        author: String,
        title: String,
        reason: String,
    },
    FileImported {
        title: String,
        author_dir: String,
    },
    FileQuarantined {
        title: String,
        reason: String,
    },
    ImportCommandFinished {
        path: String,
        status: String,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
    },
}

impl AcquisitionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AcquisitionEvent::RunStarted { .. } => "run_started",
            AcquisitionEvent::SearchCompleted { .. } => "search_completed",
            AcquisitionEvent::MatchFound { .. } => "match_found",
            AcquisitionEvent::DownloadEnqueued { .. } => "download_enqueued",
            AcquisitionEvent::FileRequeued { .. } => "file_requeued",
            AcquisitionEvent::DownloadCompleted { .. } => "download_completed",
            AcquisitionEvent::DownloadAborted { .. } => "download_aborted",
            AcquisitionEvent::ItemFailed { .. } => "item_failed",
            AcquisitionEvent::FileImported { .. } => "file_imported",
            AcquisitionEvent::FileQuarantined { .. } => "file_quarantined",
            AcquisitionEvent::ImportCommandFinished { .. } => "import_command_finished",
            AcquisitionEvent::RunFinished { .. } => "run_finished",
        }
    }

    /// Whether the event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AcquisitionEvent::DownloadAborted { .. }
                | AcquisitionEvent::ItemFailed { .. }
                | AcquisitionEvent::FileQuarantined { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = AcquisitionEvent::MatchFound {
            title: "Dune".to_string(),
            filename: "Books\\Dune.epub".to_string(),
            peer: "alice".to_string(),
            filetype: "epub".to_string(),
            score: 1.3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "match_found");
        assert_eq!(json["peer"], "alice");
        assert_eq!(event.event_type(), "match_found");
    }

    #[test]
    fn test_failure_classification() {
        assert!(AcquisitionEvent::ItemFailed {
            author: "a".to_string(),
            title: "t".to_string(),
            reason: "r".to_string(),
        }
        .is_failure());
        assert!(!AcquisitionEvent::RunStarted { wanted: 1 }.is_failure());
    }
}
