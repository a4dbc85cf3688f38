/// 检测日志回放 (Detection Log Replay)
///
/// 逐帧读取检测器输出的 JSON Lines 日志, 送入车辆跟踪器,
/// 输出每帧的轨迹、接近速度、TTC 与碰撞预警。
///
/// 每行一帧:
/// {"frame": 1, "width": 640, "height": 480, "fps": 30.0,
///  "detections": [{"xmin": 0.1, "ymin": 0.1, "xmax": 0.3, "ymax": 0.4, "confidence": 0.9, "label": 0}]}
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use bikeye_rs::{
    AlertWorker, Detection, FrameSize, LogAlertSink, TrackSnapshot, TrackerConfig, VehicleTracker,
};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// 回放参数
#[derive(Parser, Debug)]
#[command(author, version, about = "检测日志回放 - 车辆跟踪与碰撞预警", long_about = None)]
struct Args {
    /// 检测日志 (JSON Lines)
    #[arg(short, long)]
    input: PathBuf,

    /// 跟踪器配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "tracker_config.json")]
    config: PathBuf,

    /// 日志未记录帧率时使用的帧率
    #[arg(long, default_value_t = 15.0)]
    fps: f64,

    /// 禁用告警线程
    #[arg(long, default_value_t = false)]
    no_alert: bool,

    /// 以JSON格式输出每帧轨迹
    #[arg(long, default_value_t = false)]
    json: bool,

    /// 按帧率节奏回放 (默认尽快处理)
    #[arg(long, default_value_t = false)]
    realtime: bool,
}

/// 日志中的一帧
#[derive(Deserialize, Debug)]
struct FrameRecord {
    frame: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    detections: Vec<Detection>,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    frame: u64,
    warning: bool,
    tracks: &'a [TrackSnapshot],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("🚀 碰撞预警回放启动");
    log::info!("📂 检测日志: {}", args.input.display());

    let config = TrackerConfig::load(&args.config);
    config.print_summary();
    let mut tracker = VehicleTracker::new(config.clone()).context("跟踪器配置非法")?;

    // ========== 启动告警线程 ==========
    let mut worker = if args.no_alert {
        None
    } else {
        let sink = LogAlertSink::new(Duration::from_millis(config.alert_clip_ms));
        let worker = AlertWorker::spawn(
            tracker.warning_flag(),
            sink,
            Duration::from_millis(config.alert_poll_interval_ms),
        )
        .context("告警线程启动失败")?;
        Some(worker)
    };

    // ========== 逐帧回放 ==========
    let file = File::open(&args.input)
        .with_context(|| format!("无法打开检测日志 {}", args.input.display()))?;

    let mut processed = 0u64;
    let mut skipped = 0u64;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("读取检测日志失败")?;
        if line.trim().is_empty() {
            continue;
        }

        let record: FrameRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("⚠️  第 {} 行解析失败: {}", line_no + 1, e);
                skipped += 1;
                continue;
            }
        };

        let fps = record.fps.unwrap_or(args.fps);
        let frame = FrameSize::new(record.width, record.height);
        match tracker.update(&record.detections, frame, record.frame, fps) {
            Ok(tracks) => {
                processed += 1;
                print_frame(record.frame, &tracks, tracker.has_warning(), args.json)?;
                if args.realtime {
                    thread::sleep(Duration::from_secs_f64(1.0 / fps));
                }
            }
            Err(e) => {
                log::warn!("⚠️  帧 {} 跳过: {}", record.frame, e);
                skipped += 1;
            }
        }
    }

    log::info!(
        "📊 回放完成: 处理 {} 帧, 跳过 {} 帧 | {}",
        processed,
        skipped,
        tracker.get_stats()
    );

    if let Some(worker) = worker.as_mut() {
        worker.stop();
    }
    Ok(())
}

/// 输出一帧的跟踪结果
fn print_frame(frame: u64, tracks: &[TrackSnapshot], warning: bool, json: bool) -> Result<()> {
    if json {
        let output = FrameOutput {
            frame,
            warning,
            tracks,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "帧 {} | 车辆 {} | 预警 {}",
        frame,
        tracks.len(),
        if warning { "⚠️" } else { "-" }
    );
    for track in tracks {
        let [x1, y1, x2, y2] = track.bbox;
        println!(
            "  ID: {} | Speed: {:.1}% | TTC: {:.1}s | bbox ({}, {}, {}, {}){}",
            track.id,
            track.speed,
            track.ttc,
            x1,
            y1,
            x2,
            y2,
            if track.warning {
                " | WARNING: Approaching vehicle!"
            } else {
                ""
            }
        );
    }
    Ok(())
}
