//! Rollcall CLI
//!
//! Usage:
//!   rollcall --serve                          # HTTP API server
//!   rollcall --demo                           # Simulated end-to-end check-in
//!   rollcall --decode <payload>               # Inspect a session handoff
//!   rollcall --dump-config                    # Print effective configuration
//!   rollcall --demo --json                    # JSON output

use std::process;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use rollcall::config::RollcallConfig;
use rollcall::core::{
    handoff, run_server, AttendanceRecorder, CheckIn, Clock, FrequencyEmitter, InMemoryEnrollment,
    PresenceEvaluator, PresenceThresholds, SessionLauncher, SessionRegistry, SystemClock,
};
use rollcall::sensors::{AudioOutput, RecordingAudioOutput, ScriptStep, ScriptedLocationProvider, ToneAudioCapture};
use rollcall::types::{AttendanceVerdict, ReviewState, Session, SessionHandoff};
use rollcall::VERSION;

/// Demo classroom
const DEMO_LATITUDE: f64 = 12.9716;
const DEMO_LONGITUDE: f64 = 77.5946;
const DEMO_COURSE: &str = "CS101";
const DEMO_INSTRUCTOR: &str = "instructor-1";

#[derive(Parser, Debug)]
#[command(
    name = "rollcall",
    version = VERSION,
    about = "Rollcall - proxy-resistant classroom presence verification",
    long_about = "Rollcall decides whether a participant is physically present in a\n\
                  classroom session by fusing two weak signals: device geolocation\n\
                  (accuracy-weighted) and an ultrasonic tone emitted by the instructor.\n\n\
                  Modes:\n  \
                  --serve        HTTP API server mode\n  \
                  --demo         Simulated instructor + participants run\n  \
                  --decode       Inspect a session handoff payload\n\n\
                  Verdicts:\n  \
                  CONFIRMED          - Present, signals consistent\n  \
                  FLAGGED_FOR_REVIEW - Present, signals inconsistent (potential proxy)\n  \
                  ABSENT             - Too far from the session location"
)]
struct Args {
    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (overrides config)
    #[arg(long)]
    addr: Option<String>,

    /// Run a simulated end-to-end check-in
    #[arg(short, long)]
    demo: bool,

    /// Decode and print a session handoff payload
    #[arg(long, value_name = "PAYLOAD")]
    decode: Option<String>,

    /// Print the effective configuration as JSON
    #[arg(long)]
    dump_config: bool,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Presence distance threshold in meters (overrides config)
    #[arg(long)]
    distance_threshold: Option<f64>,

    /// Duplicate-submission cooldown in hours (overrides config)
    #[arg(long)]
    cooldown_hours: Option<i64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            process::exit(2);
        }
    };

    if args.dump_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                process::exit(1);
            }
        }
    } else if let Some(ref payload) = args.decode {
        run_decode(payload, &args);
    } else if args.serve {
        run_serve(config).await;
    } else {
        // Default to the demo if no mode specified
        run_demo(config, &args).await;
    }
}

/// Install the global subscriber; RUST_LOG overrides the default filter
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rollcall=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

/// File config, then CLI overrides, then validation
fn load_config(args: &Args) -> Result<RollcallConfig, rollcall::types::ConfigError> {
    let mut config = match args.config {
        Some(ref path) => RollcallConfig::from_file(path)?,
        None => RollcallConfig::default(),
    };
    if let Some(threshold) = args.distance_threshold {
        config.presence.distance_threshold_meters = threshold;
    }
    if let Some(hours) = args.cooldown_hours {
        config.attendance.cooldown_hours = hours;
    }
    if let Some(ref addr) = args.addr {
        config.server.addr = addr.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Run the API server
async fn run_serve(config: RollcallConfig) {
    let addr = config.server.addr.clone();
    println!("{} Rollcall API v{} on {}", "●".green(), VERSION, addr);
    println!("  POST /sessions                                   - Open session");
    println!("  GET  /sessions/:id                               - Status + countdown");
    println!("  POST /sessions/:id/revoke                        - Revoke session");
    println!("  GET  /sessions/:id/verdicts                      - Session roster");
    println!("  GET  /courses/:course_id/live                    - Live session");
    println!("  POST /courses/:course_id/enrollments             - Enroll participant");
    println!("  POST /attendance                                 - Submit check-in");
    println!("  GET  /courses/:course_id/participants/:id/summary - Attendance totals");
    println!("  WS   /ws/:course_id                              - Live verdicts");
    println!("  GET  /health                                     - Health check");

    if let Err(e) = run_server(&addr, config).await {
        eprintln!("{} {}", "server error:".red().bold(), e);
        process::exit(1);
    }
}

/// Decode a handoff payload
fn run_decode(payload: &str, args: &Args) {
    match handoff::decode(payload) {
        Ok(h) => {
            if args.json {
                println!("{}", handoff_json(&h));
            } else {
                print_handoff(&h);
            }
        }
        Err(e) => {
            eprintln!("{} {} ({})", "invalid payload:".red().bold(), e, e.code());
            process::exit(1);
        }
    }
}

/// Simulated instructor + two participants
async fn run_demo(config: RollcallConfig, args: &Args) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = SessionRegistry::new(clock.clone(), &config.session);
    let enrollment = Arc::new(InMemoryEnrollment::new());
    enrollment.enroll("student-in-room", DEMO_COURSE);
    enrollment.enroll("student-at-home", DEMO_COURSE);
    let recorder = AttendanceRecorder::new(enrollment, clock.clone(), &config.attendance);
    let evaluator = PresenceEvaluator::new(PresenceThresholds::from(&config));

    if !args.json {
        print_header();
    }

    // Instructor opens the session
    let launcher = match SessionLauncher::from_config(&config, FrequencyEmitter::new(clock.clone())) {
        Ok(launcher) => launcher,
        Err(e) => fail(&e),
    };
    let instructor_gps = ScriptedLocationProvider::new(vec![
        ScriptStep::fix(DEMO_LATITUDE + 0.0004, DEMO_LONGITUDE, 60.0),
        ScriptStep::fix(DEMO_LATITUDE + 0.0001, DEMO_LONGITUDE, 15.0),
        ScriptStep::fix(DEMO_LATITUDE, DEMO_LONGITUDE, 4.0),
    ])
    .with_clock(clock.clone());
    let speaker: Arc<dyn AudioOutput> = Arc::new(RecordingAudioOutput::new());
    let launched = match launcher
        .launch(&registry, DEMO_COURSE, DEMO_INSTRUCTOR, &instructor_gps, Some(speaker))
        .await
    {
        Ok(launched) => launched,
        Err(e) => fail(&e),
    };
    let session = launched.session.clone();
    let payload = match handoff::encode(&session.handoff()) {
        Ok(payload) => payload,
        Err(e) => fail(&e),
    };
    if !args.json {
        print_session(&session, &payload, clock.now());
    }

    // Participants receive the link
    let decoded = match handoff::decode(&payload).map_err(|e| e.to_string()).and_then(|h| {
        registry.validate_handoff(&h).map_err(|e| e.to_string())
    }) {
        Ok(session) => session,
        Err(e) => fail(&e),
    };
    let chosen_hz = decoded.challenge.map(|c| c.chosen_hz).unwrap_or_default();

    let check_in = match CheckIn::from_config(&config) {
        Ok(check_in) => check_in.with_clock(clock.clone()),
        Err(e) => fail(&e),
    };

    let participants = vec![
        (
            "student-in-room",
            ScriptedLocationProvider::new(vec![
                ScriptStep::fix(DEMO_LATITUDE + 0.0002, DEMO_LONGITUDE + 0.0001, 25.0),
                ScriptStep::fix(DEMO_LATITUDE + 0.0001, DEMO_LONGITUDE, 8.0),
                ScriptStep::fix(DEMO_LATITUDE, DEMO_LONGITUDE, 3.0),
            ])
            .with_clock(clock.clone()),
            ToneAudioCapture::tone(chosen_hz, 0.2).with_noise(0.001),
        ),
        (
            "student-at-home",
            ScriptedLocationProvider::new(vec![ScriptStep::fix(DEMO_LATITUDE + 0.0045, DEMO_LONGITUDE, 4.0)])
                .with_clock(clock.clone()),
            ToneAudioCapture::silence().with_noise(0.001),
        ),
    ];

    let mut records = Vec::new();
    for (participant_id, gps, microphone) in participants {
        let report = match check_in.run(&gps, &microphone, decoded.challenge.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {}: {}", "check-in failed:".red(), participant_id, e);
                continue;
            }
        };
        let verdict = report.evaluate(&decoded, &evaluator);
        match recorder.record(
            participant_id,
            &decoded.course_id,
            &decoded,
            &verdict,
            report.location.coordinate(),
        ) {
            Ok(record) => {
                if !args.json {
                    print_verdict(&record);
                }
                records.push(record);
            }
            Err(e) => eprintln!("{} {}: {} ({})", "not recorded:".red(), participant_id, e, e.code()),
        }
    }
    drop(launched);

    if args.json {
        match serde_json::to_string_pretty(&records) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(&e),
        }
        return;
    }

    let total = registry.sessions_for_course(DEMO_COURSE).len();
    println!();
    for record in &records {
        let summary = recorder.summary(&record.participant_id, DEMO_COURSE, total);
        println!(
            "  {:<16} {}/{} sessions ({:.2}%), {} flagged",
            summary.participant_id,
            summary.present_sessions,
            summary.total_sessions,
            summary.attendance_percentage,
            summary.flagged_sessions
        );
    }
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    eprintln!("{} {}", "error:".red().bold(), e);
    process::exit(1);
}

/// Print header
fn print_header() {
    println!("{}", "========================================".bold());
    println!("{}", format!("  Rollcall v{} - Demo", VERSION).bold());
    println!("{}", "========================================".bold());
    println!();
}

fn print_session(session: &Session, payload: &str, now: chrono::DateTime<chrono::Utc>) {
    println!("{} {}", "Session opened:".cyan().bold(), session.id);
    println!("  course     {}", session.course_id);
    println!(
        "  anchor     {:.6}, {:.6} (±{:.1} m)",
        session.anchor_location.latitude,
        session.anchor_location.longitude,
        session.anchor_location.accuracy_meters
    );
    if let Some(c) = session.challenge {
        println!("  challenge  {:.1} Hz", c.chosen_hz);
    }
    println!("  expires in {} s", session.remaining(now).num_seconds());
    println!("  handoff    {}", payload.dimmed());
    println!();
}

fn print_verdict(record: &AttendanceVerdict) {
    let state = match record.review_state() {
        ReviewState::Confirmed => "CONFIRMED".green().bold(),
        ReviewState::FlaggedForReview => "FLAGGED_FOR_REVIEW".yellow().bold(),
        ReviewState::Absent => "ABSENT".red().bold(),
    };
    println!(
        "{:<18} {:<20} {:>8.1} m  {}",
        record.participant_id,
        state,
        record.distance_meters,
        record.reason.to_string().dimmed()
    );
}

fn print_handoff(h: &SessionHandoff) {
    println!("{}", "Session handoff".cyan().bold());
    println!("  sessionId   {}", h.session_id);
    println!("  ownerId     {}", h.owner_id);
    println!("  courseId    {}", h.course_id);
    println!("  sessionCode {}", h.session_code);
    println!("  expiresAt   {}", h.expires_at.to_rfc3339());
    println!("  anchor      {:.6}, {:.6}", h.anchor_latitude, h.anchor_longitude);
}

fn handoff_json(h: &SessionHandoff) -> String {
    serde_json::json!({
        "sessionId": h.session_id,
        "ownerId": h.owner_id,
        "courseId": h.course_id,
        "sessionCode": h.session_code,
        "expiresAt": h.expires_at.to_rfc3339(),
        "anchorLatitude": h.anchor_latitude,
        "anchorLongitude": h.anchor_longitude,
    })
    .to_string()
}
