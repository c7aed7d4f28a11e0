use anyhow::{Context, Result};
use clap::Parser;
use std::fmt;
use std::path::PathBuf;

use gazelink::mock::MockTracker;
use gazelink::{EyeData, EyeTracker, Frame, Point2, TrackerConfig};

/// Stream gaze samples from an Eye Tribe compatible tracker server.
#[derive(Parser, Debug)]
#[command(name = "gazelink", version, about)]
struct Args {
    /// Tracker host
    #[arg(long)]
    host: Option<String>,

    /// Tracker port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of samples to read in push mode
    #[arg(short = 'n', long, default_value_t = 30)]
    frames: usize,

    /// Field separator for printed records
    #[arg(long, default_value = ";")]
    separator: String,

    /// JSON client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against a simulated tracker on a loopback port
    #[arg(long)]
    mock: bool,
}

const HEADER: [&str; 23] = [
    "eT", "dT", "aT", "Fix", "State", "Rwx", "Rwy", "Avx", "Avy", "LRwx", "LRwy", "LAvx", "LAvy",
    "LSz", "LCx", "LCy", "RRwx", "RRwy", "RAvx", "RAvy", "RSz", "RCx", "RCy",
];

/// One frame as a separator-delimited line.
struct Record<'a> {
    frame: &'a Frame,
    sep: &'a str,
}

impl Record<'_> {
    fn point(&self, f: &mut fmt::Formatter<'_>, p: Point2, precision: usize) -> fmt::Result {
        write!(f, "{}{:.*}{}{:.*}", self.sep, precision, p.x, self.sep, precision, p.y)
    }

    fn eye(&self, f: &mut fmt::Formatter<'_>, eye: &EyeData) -> fmt::Result {
        self.point(f, eye.raw(), 0)?;
        self.point(f, eye.avg(), 0)?;
        write!(f, "{}{:.1}", self.sep, eye.pupil_size())?;
        self.point(f, eye.pupil_center(), 3)
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.frame;
        write!(
            f,
            "{:014.3}{sep}{:07.3}{sep}{:07.3}{sep}{}{sep}{}",
            frame.local_timestamp(),
            frame.server_timestamp(),
            frame.server_estimated_timestamp(),
            if frame.is_fixated() { 'F' } else { 'N' },
            frame.state(),
            sep = self.sep,
        )?;
        self.point(f, frame.raw_combined(), 0)?;
        self.point(f, frame.avg_combined(), 0)?;
        self.eye(f, frame.left_eye())?;
        self.eye(f, frame.right_eye())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Kept alive for the whole run
    let _mock = if args.mock {
        let mock = MockTracker::start().await?;
        config.host = mock.addr().ip().to_string();
        config.port = mock.port();
        Some(mock)
    } else {
        None
    };

    let mut tracker = EyeTracker::new(config);
    tracker
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", tracker.config().address()))?;

    if let Some(session) = tracker.session() {
        println!(
            "Connected to {} (heartbeat {:?}, calibrated: {})",
            tracker.config().address(),
            session.heartbeat_interval,
            session.is_calibrated
        );
    }

    println!("{}", HEADER.join(&args.separator));

    let frame = tracker.next().await.context("Pull request failed")?;
    println!("{}", Record { frame: &frame, sep: &args.separator });

    tracker.pushmode(None).await.context("Failed to enter push mode")?;
    for _ in 0..args.frames {
        let frame = tracker.next().await?;
        println!("{}", Record { frame: &frame, sep: &args.separator });
    }
    tracker.pullmode().await?;

    let metrics = tracker.metrics();
    tracker.close().await?;

    eprintln!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
