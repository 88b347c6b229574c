//! Pass Timeline
//!
//! Records when each operation of a pass starts and finishes, for
//! duration reports and an ASCII chart of the pass.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Width of the chart bar area in characters.
const CHART_WIDTH: f64 = 50.0;

/// Width of the operation-name column in the chart.
const NAME_WIDTH: usize = 12;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Operation entry point is about to run
    Started,
    /// Operation finished and its outputs were published
    Done,
    /// Resolution or execution failed
    Failed,
}

/// A single event in the pass timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub operation: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Span of one operation within the pass, in milliseconds from pass start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpan {
    pub start_ms: u128,
    pub end_ms: u128,
    pub failed: bool,
}

impl OperationSpan {
    pub fn duration_ms(&self) -> u128 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Timeline of one execution pass.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn add_event(&mut self, operation: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            operation: operation.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time from pass start to the last recorded event.
    pub fn total(&self) -> Duration {
        self.events
            .last()
            .map(|e| e.timestamp.duration_since(self.start_time))
            .unwrap_or_default()
    }

    fn offset_ms(&self, event: &TimelineEvent) -> u128 {
        event.timestamp.duration_since(self.start_time).as_millis()
    }

    /// Finished operations in start order.
    ///
    /// Operations that started but never finished are left out. A failure
    /// recorded without a start (e.g. during input resolution) spans zero
    /// time at the moment it was recorded.
    pub fn spans(&self) -> IndexMap<String, OperationSpan> {
        let mut starts: IndexMap<String, u128> = IndexMap::new();
        let mut spans = IndexMap::new();

        for event in &self.events {
            let at = self.offset_ms(event);
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.operation.clone(), at);
                }
                EventType::Done | EventType::Failed => {
                    let start_ms = starts.get(&event.operation).copied().unwrap_or(at);
                    spans.insert(
                        event.operation.clone(),
                        OperationSpan {
                            start_ms,
                            end_ms: at,
                            failed: event.event_type == EventType::Failed,
                        },
                    );
                }
            }
        }

        spans.sort_by(|_, a, _, b| a.start_ms.cmp(&b.start_ms));
        spans
    }

    /// Operation durations in milliseconds, in start order.
    pub fn durations(&self) -> IndexMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(name, span)| (name, span.duration_ms()))
            .collect()
    }

    /// Renders the pass as an ASCII chart.
    ///
    /// Each operation is a bar positioned relative to the pass length;
    /// `#` marks a successful operation and `x` a failed one.
    pub fn chart(&self) -> String {
        let mut output = String::from("\nPass Timeline:\n\n");

        let total_ms = self.total().as_millis();
        let scale = if total_ms == 0 {
            0.0
        } else {
            CHART_WIDTH / total_ms as f64
        };

        for (name, span) in self.spans() {
            let start_pos = (span.start_ms as f64 * scale) as usize;
            let width = ((span.duration_ms() as f64 * scale) as usize).max(1);
            let mark = if span.failed { "x" } else { "#" };

            output.push_str(&format!(
                "{} |{}{}| ({} ms)\n",
                fit(&name, NAME_WIDTH),
                " ".repeat(start_pos),
                mark.repeat(width),
                span.duration_ms()
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_ms));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or shortens a name to exactly `width` characters.
fn fit(name: &str, width: usize) -> String {
    let count = name.chars().count();
    if count <= width {
        format!("{:width$}", name, width = width)
    } else {
        let kept: String = name.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_starts_empty() {
        let timeline = ExecutionTimeline::default();
        assert!(timeline.is_empty());
        assert_eq!(timeline.total(), Duration::ZERO);
        assert!(timeline.spans().is_empty());
    }

    #[test]
    fn test_durations_in_start_order() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("second", EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("first", EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("first", EventType::Done);
        timeline.add_event("second", EventType::Done);

        let durations = timeline.durations();
        let names: Vec<&String> = durations.keys().collect();
        assert_eq!(names, vec!["second", "first"]);
        assert!(durations["second"] >= 40);
        assert!(durations["first"] >= 20);
    }

    #[test]
    fn test_unfinished_operation_has_no_span() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", EventType::Started);
        assert!(timeline.durations().is_empty());
    }

    #[test]
    fn test_failure_without_start() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", EventType::Failed);

        let spans = timeline.spans();
        assert!(spans["a"].failed);
        assert_eq!(spans["a"].duration_ms(), 0);
    }

    #[test]
    fn test_chart_marks_failures() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("load", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("load", EventType::Done);
        timeline.add_event("transform", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("transform", EventType::Failed);

        let chart = timeline.chart();
        assert!(chart.contains("Pass Timeline"));
        assert!(chart.contains("load         |#"));
        assert!(chart.contains("x| ("));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_fit_long_names() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("a_very_long_operation", 12), "a_very_lo...");
    }
}
