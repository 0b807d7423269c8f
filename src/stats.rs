//! Pipeline counters and the aggregate status snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::action::ControllerKind;

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_processed: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub samples_classified: AtomicU64,
    pub events_stabilized: AtomicU64,
    pub events_suppressed: AtomicU64,
    pub actions_triggered: AtomicU64,
    pub voice_commands: AtomicU64,
}

impl PipelineStats {
    pub fn summary(&self) -> String {
        format!(
            "frames {} (skipped {}), samples {}, stable {}, suppressed {}, actions {}, voice {}",
            self.frames_processed.load(Ordering::Relaxed),
            self.frames_skipped.load(Ordering::Relaxed),
            self.samples_classified.load(Ordering::Relaxed),
            self.events_stabilized.load(Ordering::Relaxed),
            self.events_suppressed.load(Ordering::Relaxed),
            self.actions_triggered.load(Ordering::Relaxed),
            self.voice_commands.load(Ordering::Relaxed),
        )
    }
}

/// Point-in-time view for a surrounding UI or status command.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub queue_depth: usize,
    pub controllers: Vec<(ControllerKind, bool)>,
    pub last_action: Option<String>,
    pub drag_active: bool,
}

impl StatusSnapshot {
    pub fn render(&self) -> String {
        let controllers = self
            .controllers
            .iter()
            .map(|(kind, available)| {
                format!("{}:{}", kind, if *available { "up" } else { "down" })
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "queue={} drag={} last={} [{}]",
            self.queue_depth,
            self.drag_active,
            self.last_action.as_deref().unwrap_or("-"),
            controllers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let stats = PipelineStats::default();
        stats.frames_processed.fetch_add(10, Ordering::Relaxed);
        stats.frames_skipped.fetch_add(2, Ordering::Relaxed);
        let s = stats.summary();
        assert!(s.contains("frames 10"));
        assert!(s.contains("skipped 2"));
    }

    #[test]
    fn test_snapshot_render() {
        let snapshot = StatusSnapshot {
            queue_depth: 3,
            controllers: vec![(ControllerKind::Pointer, true)],
            last_action: None,
            drag_active: true,
        };
        let line = snapshot.render();
        assert!(line.contains("queue=3"));
        assert!(line.contains("pointer:up"));
        assert!(line.contains("last=-"));
    }
}
