//! Remote commands and their effect on the shared context.
//!
//! Every command is stateless: it is parsed from one request, applied to the
//! [`RigContext`] in a single update, and answered immediately. The HTTP
//! binding lives in [`crate::web`].

use std::fmt::Write;

use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{CalibrationSide, CalibrationState};
use crate::context::RigContext;
use crate::strategy::{ControllerGains, Strategy};
use crate::telemetry::CSV_HEADER;

/// Reply body of the legacy download route.
pub const DOWNLOAD_HINT: &str = "Use the button on the page to download streamed data.";
pub const NOT_FOUND: &str = "404: Not Found";

/// Gain fields a `setPID` request supplied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainsUpdate {
    pub p: Option<f32>,
    pub i: Option<f32>,
    pub d: Option<f32>,
}

impl GainsUpdate {
    /// Keep only the supplied fields that parse to a finite number.
    pub fn parse(p: Option<&str>, i: Option<&str>, d: Option<&str>) -> Self {
        Self {
            p: parse_gain("p", p),
            i: parse_gain("i", i),
            d: parse_gain("d", d),
        }
    }

    pub fn apply(&self, gains: &mut ControllerGains) {
        if let Some(p) = self.p {
            gains.p = p;
        }
        if let Some(i) = self.i {
            gains.i = i;
        }
        if let Some(d) = self.d {
            gains.d = d;
        }
    }
}

fn parse_gain(name: &str, raw: Option<&str>) -> Option<f32> {
    let raw = raw?;
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(gain = name, value = raw, "ignoring invalid gain");
            None
        }
    }
}

/// Interpret a strategy selector argument.
///
/// A missing argument means "leave unchanged" and yields `None`. Otherwise the
/// leading integer is read (`"2abc"` and `"1.0"` select 2 and 1), and anything
/// without one, or outside `0..=3`, selects [`Strategy::Idle`].
pub fn parse_strategy(raw: Option<&str>) -> Option<Strategy> {
    let raw = raw?;
    let strategy = leading_integer(raw)
        .map(Strategy::from_selector)
        .unwrap_or_default();
    Some(strategy)
}

/// Optional sign followed by decimal digits at the start of `raw`, after
/// leading whitespace. Too many digits saturate.
fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let magnitude = rest[..digits].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// A request from the remote surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Home,
    Start,
    Stop,
    CalibrateLow,
    CalibrateHigh,
    SetStrategy(Option<Strategy>),
    SetGains(GainsUpdate),
    PollTelemetry,
    Status,
    Download,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResponse {
    /// 302 back to the status page with a short text body.
    Redirect(&'static str),
    Html(String),
    /// CSV rows, possibly empty.
    Csv(String),
    Json(StatusReport),
    Text(&'static str),
}

/// Apply `command` to the context and build the reply.
pub fn execute(ctx: &RigContext, command: RemoteCommand) -> RemoteResponse {
    match command {
        RemoteCommand::Home => RemoteResponse::Html(StatusReport::from_context(ctx).render_html()),
        RemoteCommand::Start => {
            let revision = ctx.update(|config| config.running = true);
            info!(revision, "start requested");
            RemoteResponse::Redirect("Starting...")
        }
        RemoteCommand::Stop => {
            let revision = ctx.update(|config| config.running = false);
            info!(revision, "stop requested");
            RemoteResponse::Redirect("Stopping...")
        }
        RemoteCommand::CalibrateLow => {
            if queue_calibration(ctx, CalibrationSide::Low) {
                RemoteResponse::Redirect("Low Set")
            } else {
                RemoteResponse::Redirect("Low already queued")
            }
        }
        RemoteCommand::CalibrateHigh => {
            if queue_calibration(ctx, CalibrationSide::High) {
                RemoteResponse::Redirect("High Set")
            } else {
                RemoteResponse::Redirect("High already queued")
            }
        }
        RemoteCommand::SetStrategy(strategy) => {
            if let Some(strategy) = strategy {
                let revision = ctx.update(|config| config.strategy = strategy);
                info!(revision, %strategy, "strategy set");
            }
            RemoteResponse::Redirect("Strategy set.")
        }
        RemoteCommand::SetGains(update) => {
            if update != GainsUpdate::default() {
                let mut gains = ControllerGains::default();
                let revision = ctx.update(|config| {
                    update.apply(&mut config.gains);
                    gains = config.gains;
                });
                info!(revision, p = gains.p, i = gains.i, d = gains.d, "gains updated");
            }
            RemoteResponse::Redirect("PID Updated")
        }
        RemoteCommand::PollTelemetry => RemoteResponse::Csv(ctx.drain_telemetry()),
        RemoteCommand::Status => RemoteResponse::Json(StatusReport::from_context(ctx)),
        RemoteCommand::Download => RemoteResponse::Text(DOWNLOAD_HINT),
    }
}

fn queue_calibration(ctx: &RigContext, side: CalibrationSide) -> bool {
    let queued = ctx.request_calibration(side);
    if queued {
        info!(%side, "calibration queued");
    } else {
        warn!(%side, "calibration already queued, request ignored");
    }
    queued
}

/// Everything the status page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub strategy: u8,
    pub strategy_name: &'static str,
    pub sensor_selector: u8,
    /// Milliseconds since boot of the last sensor reading.
    pub last_sensor_update_ms: Option<u64>,
    pub gains: ControllerGains,
    pub calibration: CalibrationState,
    pub calibrating: Option<CalibrationSide>,
    pub pending_calibration: Option<CalibrationSide>,
    pub session_active: bool,
    pub buffered_observations: usize,
    pub revision: u64,
}

impl StatusReport {
    pub fn from_context(ctx: &RigContext) -> Self {
        let config = ctx.snapshot();
        let status = ctx.loop_status();
        Self {
            running: config.running,
            strategy: config.strategy.selector(),
            strategy_name: config.strategy.name(),
            sensor_selector: config.sensor_selector,
            last_sensor_update_ms: status.last_sensor_update_micros.map(|us| us / 1000),
            gains: config.gains,
            calibration: config.calibration,
            calibrating: status.calibrating,
            pending_calibration: ctx.pending_calibration(),
            session_active: status.active,
            buffered_observations: ctx.buffered_observations(),
            revision: config.revision,
        }
    }

    pub fn render_html(&self) -> String {
        let mut html = String::from(PAGE_HEAD);
        let (dot, state) = if self.running {
            ("running", "RUNNING")
        } else {
            ("stopped", "STOPPED")
        };
        let last_sensor = match self.last_sensor_update_ms {
            Some(ms) => format!("{ms} ms"),
            None => "never".to_string(),
        };
        let calibration = match (self.calibrating, self.pending_calibration) {
            (Some(side), _) => format!("recording {side}"),
            (None, Some(side)) => format!("{side} queued"),
            (None, None) => "idle".to_string(),
        };
        let ControllerGains { p, i, d } = self.gains;
        let CalibrationState { low, high, middle } = self.calibration;

        // Writing into a String cannot fail.
        let _ = write!(
            html,
            r#"
        <div class="status-box">
            Status: <span class="status-dot {dot}"></span> <strong>{state}</strong>
            <br>Current Strategy: <strong>{strategy} ({name})</strong>
            <br>Last Sensor Time: <strong>{last_sensor}</strong>
            <br>Calibration: <strong>{calibration}</strong>
            <br>Buffered Points: <strong>{buffered}</strong>
            <div class="gains-display"><strong>Current Gains:</strong> P: {p} | I: {i} | D: {d}</div>
        </div>

        <form action="/start" method="GET"><button class="start" type="submit">Start Experiment</button></form>
        <form action="/stop" method="GET"><button class="stop" type="submit">Stop Experiment</button></form>

        <span id="dataCount">Recorded Points in Browser: 0</span>
        <hr>
        <button class="download" onclick="downloadCSV()">Download Accumulated Data</button>

        <hr>
        <h3>PID Tuning</h3>
        <form action="/setPID" method="GET">
            <label>P Gain: <input type="number" step="0.001" name="p" value="{p}"></label>
            <label>I Gain: <input type="number" step="0.001" name="i" value="{i}"></label>
            <label>D Gain: <input type="number" step="0.001" name="d" value="{d}"></label>
            <button class="btn-blue" type="submit">Update Gains</button>
        </form>

        <hr>
        <h3>Calibration</h3>
        <p>1. Move rig to LOW position (Last: <strong>{low}</strong>):</p>
        <form action="/calibLow" method="GET"><button class="calib" type="submit">Record Low</button></form>
        <p>2. Move rig to HIGH position (Last: <strong>{high}</strong>):</p>
        <form action="/calibHigh" method="GET"><button class="calib" type="submit">Record High</button></form>
        <p><em>Calculated Middle: {middle}</em></p>

        <hr>
        <form action="/setStrategy" method="GET">
            <label for="strategy">Control Strategy:</label>
            <select name="value" id="strategy">
                <option value="0">Strategy 0 (Idle)</option>
                <option value="1">Strategy 1 (P-Only)</option>
                <option value="2">Strategy 2 (ON/OFF)</option>
                <option value="3">Strategy 3 (PID)</option>
            </select>
            <button class="btn-blue" type="submit">Set Strategy</button>
        </form>
    </div>
    <script>
        const csvHeader = "{header}\n";
        const isRunning = {running};
"#,
            strategy = self.strategy,
            name = self.strategy_name,
            buffered = self.buffered_observations,
            header = CSV_HEADER,
            running = self.running,
        );
        html.push_str(PAGE_SCRIPT);
        html
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Rig Control</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body { font-family: Arial, sans-serif; margin: 20px; background: #f4f4f4; }
        h1 { color: #333; text-align: center; }
        .container { max-width: 600px; margin: auto; padding: 20px; background: #fff; border-radius: 8px; }
        button, select, input { display: block; width: 100%; padding: 12px; margin: 10px 0; font-size: 16px; border-radius: 5px; box-sizing: border-box; }
        button { color: white; border: none; cursor: pointer; }
        .start { background: #28a745; }
        .stop { background: #dc3545; }
        .calib { background: #ffc107; color: #333; }
        .download { background: #17a2b8; }
        .btn-blue { background: #007bff; }
        .status-box { text-align: center; margin-bottom: 20px; padding: 10px; background: #eee; border-radius: 5px; }
        .status-dot { height: 15px; width: 15px; border-radius: 50%; display: inline-block; margin-right: 8px; vertical-align: middle; }
        .running { background-color: #28a745; }
        .stopped { background-color: #dc3545; }
        .gains-display { font-size: 0.9em; margin-top: 5px; color: #555; }
        #dataCount { font-weight: bold; color: #555; text-align: center; display: block; margin-top: 10px; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Rotational Rig Control</h1>"#;

// Streams rows from /pollData every second and keeps them in the browser.
const PAGE_SCRIPT: &str = r#"        let allData = csvHeader;
        let pointCount = 0;

        function fetchDataChunk() {
            fetch('/pollData')
                .then(response => response.text())
                .then(data => {
                    if (data.length > 0) {
                        allData += data;
                        pointCount += data.split("\n").length - 1;
                        document.getElementById("dataCount").innerText = "Recorded Points in Browser: " + pointCount;
                    }
                })
                .catch(err => console.error("Poll error:", err));
        }

        function downloadCSV() {
            const blob = new Blob([allData], { type: 'text/csv' });
            const a = document.createElement('a');
            a.href = window.URL.createObjectURL(blob);
            a.download = 'experiment_log.csv';
            document.body.appendChild(a);
            a.click();
            document.body.removeChild(a);
        }

        if (isRunning) {
            setInterval(fetchDataChunk, 1000);
        }
    </script>
</body>
</html>
"#;
