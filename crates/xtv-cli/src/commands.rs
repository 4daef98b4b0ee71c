//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tabled::Tabled;
use xtv_core::headless::{
    HeadlessController, HostCall, HostLog, RecordingContainer, RecordingElement, RecordingEngineFactory,
};
use xtv_core::{
    plan_attach, ContentKind, HttpStreamResolver, Key, PlaybackRequest, PlayerConfig,
    PlayerController, PlayerEvent, PlayerIntent, PlayerSnapshot, SourceMode, StreamRequest,
    StreamResolver,
};

// ============================================================================
// resolve
// ============================================================================

/// Resolve a stream and show how it would be attached
pub async fn resolve(
    server: &str,
    kind: ContentKind,
    id: &str,
    extension: Option<String>,
    config: &PlayerConfig,
    format: &str,
) -> anyhow::Result<()> {
    let resolver = HttpStreamResolver::new(server)?;
    let mut request = StreamRequest::new(kind, id);
    if let Some(extension) = extension {
        request = request.with_extension(extension);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Resolving {kind} {id} via {}", resolver.endpoint(&request)?));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let resolved = resolver.resolve(&request).await;
    spinner.finish_and_clear();
    let resolved = resolved.with_context(|| format!("resolving {kind} {id}"))?;

    let plan = plan_attach(
        &resolved.stream_url,
        kind,
        true,
        false,
        &config.live_profile,
        &config.on_demand_profile,
    )?;

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = serde_json::json!({ "stream": resolved, "plan": plan });
            println!("{}", output::to_json(&report)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("{} {}", console::style("Resolved:").bold(), resolved.stream_url);
            if let Some(info) = &resolved.info {
                for (label, value) in [
                    ("Title", &info.title),
                    ("Genre", &info.genre),
                    ("Year", &info.year),
                    ("Duration", &info.duration),
                    ("Rating", &info.rating),
                    ("Season", &info.season_number),
                    ("Episode", &info.episode_number),
                ] {
                    if let Some(value) = value {
                        println!("  {label}: {value}");
                    }
                }
            }
            println!("  Format: {:?}", plan.format);
            println!("  Mode: {:?}", plan.mode);
        }
    }

    Ok(())
}

// ============================================================================
// plan
// ============================================================================

#[derive(Tabled)]
struct PlanRow {
    setting: &'static str,
    value: String,
}

/// Show the attach plan for a URL
pub fn plan(
    url: &str,
    kind: ContentKind,
    engine_supported: bool,
    native_hls: bool,
    config: &PlayerConfig,
    format: &str,
) -> anyhow::Result<()> {
    let plan = plan_attach(
        url,
        kind,
        engine_supported,
        native_hls,
        &config.live_profile,
        &config.on_demand_profile,
    );

    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{} {}", console::style("Cannot play:").red().bold(), e);
            std::process::exit(2);
        }
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&plan)?),
        OutputFormat::Text | OutputFormat::Table => {
            let mut rows = vec![
                PlanRow {
                    setting: "format",
                    value: format!("{:?}", plan.format),
                },
                PlanRow {
                    setting: "mode",
                    value: format!("{:?}", plan.mode),
                },
            ];
            if let Some(profile) = &plan.profile {
                rows.extend([
                    PlanRow {
                        setting: "low latency",
                        value: output::yes_no(profile.low_latency_mode),
                    },
                    PlanRow {
                        setting: "back buffer",
                        value: format!("{}s", profile.back_buffer_length),
                    },
                    PlanRow {
                        setting: "max buffer",
                        value: format!("{}s", profile.max_buffer_length),
                    },
                    PlanRow {
                        setting: "live sync",
                        value: profile
                            .live_sync_duration_count
                            .map(|n| format!("{n} segments"))
                            .unwrap_or_else(|| "-".to_string()),
                    },
                ]);
            }
            println!("{}", output::table(rows));
        }
    }

    Ok(())
}

// ============================================================================
// keys
// ============================================================================

#[derive(Serialize, Tabled)]
struct KeyRow {
    key: &'static str,
    action: String,
}

/// List keyboard shortcuts
pub fn keys(config: &PlayerConfig, format: &str) -> anyhow::Result<()> {
    let bindings = config.key_bindings();
    let rows: Vec<KeyRow> = Key::ALL
        .iter()
        .map(|key| KeyRow {
            key: key.label(),
            action: bindings.describe(*key),
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&rows)?),
        OutputFormat::Text | OutputFormat::Table => println!("{}", output::table(rows)),
    }
    Ok(())
}

// ============================================================================
// replay
// ============================================================================

/// Host capabilities for a replay
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostSettings {
    pub engine_supported: bool,
    pub native_hls: bool,
    pub reject_play: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            engine_supported: true,
            native_hls: false,
            reject_play: false,
        }
    }
}

/// One scripted event at a host time in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    pub at: u64,
    pub event: PlayerEvent,
}

/// Recorded session to replay
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub request: PlaybackRequest,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub events: Vec<ScriptStep>,
    /// Unmount after the last event, at this time
    #[serde(default)]
    pub unmount_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub at: u64,
    pub event: String,
    pub phase: String,
    pub display_time: f64,
    pub controls_visible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub stream_url: String,
    pub source_mode: Option<SourceMode>,
    pub started_at: Option<String>,
    pub load_error: Option<String>,
    pub steps: Vec<StepReport>,
    pub intents: Vec<PlayerIntent>,
    pub final_state: PlayerSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<HostCall>,
}

type ReplayController = HeadlessController;

fn build_controller(host: &HostSettings, config: PlayerConfig) -> (ReplayController, HostLog) {
    let log = HostLog::new();
    let mut element = RecordingElement::new(log.clone());
    element.native_hls = host.native_hls;
    element.reject_play = host.reject_play;
    let mut factory = RecordingEngineFactory::new(log.clone());
    factory.supported = host.engine_supported;
    let controller = PlayerController::new(
        element,
        RecordingContainer::new(log.clone()),
        factory,
        config,
    );
    (controller, log)
}

fn step(controller: &ReplayController, at: u64, event: String) -> StepReport {
    StepReport {
        at,
        event,
        phase: controller.phase().to_string(),
        display_time: controller.display_time(),
        controls_visible: controller.controls_visible(),
    }
}

/// Fire every timer due at or before `until`, as a host would
fn fire_timers(controller: &mut ReplayController, until: Duration, steps: &mut Vec<StepReport>) {
    while let Some(deadline) = controller.next_deadline() {
        if deadline > until {
            break;
        }
        controller.dispatch(PlayerEvent::Tick, deadline);
        steps.push(step(controller, deadline.as_millis() as u64, "tick (timer)".to_string()));
        if controller.next_deadline() == Some(deadline) {
            break;
        }
    }
}

/// Run a script and collect the report
pub fn run_script(script: Script, config: PlayerConfig, include_calls: bool) -> ReplayReport {
    let (mut controller, log) = build_controller(&script.host, config);
    let mut intents_rx = controller.take_intents();
    let mut steps = Vec::new();

    let stream_url = script.request.stream_url.clone();
    let load_error = controller
        .load(script.request, Duration::ZERO)
        .err()
        .map(|e| e.to_string());
    let session = controller.session().cloned();

    let mut events = script.events;
    events.sort_by_key(|s| s.at);
    for ScriptStep { at, event } in events {
        let now = Duration::from_millis(at);
        fire_timers(&mut controller, now, &mut steps);
        let label = output::to_compact_json(&event);
        controller.dispatch(event, now);
        steps.push(step(&controller, at, label));
    }

    if let Some(at) = script.unmount_at {
        fire_timers(&mut controller, Duration::from_millis(at), &mut steps);
        controller.unmount();
        steps.push(step(&controller, at, "unmount".to_string()));
    }

    tracing::debug!(steps = steps.len(), calls = log.calls().len(), "Replay finished");

    let mut intents = Vec::new();
    if let Some(rx) = intents_rx.as_mut() {
        while let Ok(intent) = rx.try_recv() {
            intents.push(intent);
        }
    }

    ReplayReport {
        stream_url,
        source_mode: session.as_ref().map(|s| s.source_mode),
        started_at: session.map(|s| s.started_at.to_rfc3339()),
        load_error,
        steps,
        intents,
        final_state: controller.snapshot(),
        calls: if include_calls { log.calls() } else { Vec::new() },
    }
}

/// Replay a script file
pub fn replay(
    path: &Path,
    include_calls: bool,
    config: PlayerConfig,
    format: &str,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;

    let report = run_script(script, config, include_calls);

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)?),
        OutputFormat::Table => {
            println!("{}", output::table(report.steps.iter().map(StepRow::from)));
            print_summary(&report);
        }
        OutputFormat::Text => {
            for s in &report.steps {
                println!(
                    "[{:>8}ms] {:<10} t={:>8.2} controls={} {}",
                    s.at,
                    s.phase,
                    s.display_time,
                    if s.controls_visible { "shown" } else { "hidden" },
                    console::style(&s.event).dim()
                );
            }
            print_summary(&report);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct StepRow {
    at: u64,
    phase: String,
    time: String,
    controls: &'static str,
    event: String,
}

impl From<&StepReport> for StepRow {
    fn from(s: &StepReport) -> Self {
        Self {
            at: s.at,
            phase: s.phase.clone(),
            time: format!("{:.2}", s.display_time),
            controls: if s.controls_visible { "shown" } else { "hidden" },
            event: s.event.clone(),
        }
    }
}

fn print_summary(report: &ReplayReport) {
    println!();
    if let Some(error) = &report.load_error {
        println!("{} {}", console::style("Load failed:").red().bold(), error);
    }
    println!("Stream: {}", report.stream_url);
    if let Some(mode) = report.source_mode {
        println!("Mode: {mode:?}");
    }
    println!("Final phase: {}", report.final_state.phase);
    if let Some(fault) = &report.final_state.fault {
        println!("{} {}", console::style("Fault:").red(), fault);
    }
    for intent in &report.intents {
        println!("Intent: {}", output::to_compact_json(intent));
    }
    for call in &report.calls {
        println!("  {}", output::to_compact_json(call));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtv_core::PlayerPhase;

    const LIVE_SCRIPT: &str = r#"{
        "request": {"streamUrl": "http://panel/live/u/p/1.m3u8", "streamType": "live"},
        "events": [
            {"at": 0, "event": {"engine": {"engine": 1, "event": {"type": "manifestParsed"}}}},
            {"at": 200, "event": {"media": {"type": "play"}}},
            {"at": 250, "event": {"media": {"type": "playing"}}},
            {"at": 9000, "event": {"input": {"type": "pointerMove"}}}
        ],
        "unmountAt": 10000
    }"#;

    #[test]
    fn test_replay_fires_hide_timer() {
        let script: Script = serde_json::from_str(LIVE_SCRIPT).unwrap();
        let report = run_script(script, PlayerConfig::default(), true);

        assert_eq!(report.source_mode, Some(SourceMode::Adaptive));
        assert!(report.load_error.is_none());
        let timer = report
            .steps
            .iter()
            .find(|s| s.event == "tick (timer)")
            .unwrap();
        assert_eq!(timer.at, 3200);
        assert!(!timer.controls_visible);
        assert_eq!(report.final_state.phase, PlayerPhase::Idle);
        assert!(report.calls.contains(&HostCall::EngineDestroy));
    }

    #[test]
    fn test_replay_unsupported_host() {
        let script: Script = serde_json::from_str(
            r#"{
                "request": {"streamUrl": "http://panel/movie/u/p/1.m3u8", "streamType": "movie"},
                "host": {"engineSupported": false}
            }"#,
        )
        .unwrap();
        let report = run_script(script, PlayerConfig::default(), false);
        assert!(report.load_error.is_some());
        assert_eq!(report.final_state.phase, PlayerPhase::Error);
        assert!(report.calls.is_empty());
    }
}
