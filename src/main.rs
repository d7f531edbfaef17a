//! 示教机器 - 演示
//!
//! 用合成的纯色帧代替摄像头：训练两个标签，再看分类结果，
//! 最后保存 / 加载 / 清除标签。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use teachable_machine::utils::time::{format_mmss_ms, now};
use teachable_machine::{
    Frame, FrameLoop, GridPoolExtractor, ReplaySource, SessionEvent, TeachableConfig,
    TeachableSession,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match std::env::var("TM_CONFIG") {
        Ok(path) => TeachableConfig::from_file(path)?,
        Err(_) => TeachableConfig::default(),
    }
    .apply_env()?;

    info!("╔══════════════════════════════════════════════╗");
    info!("║     示教机器 - k 近邻图像分类                ║");
    info!("╚══════════════════════════════════════════════╝");
    info!("配置: {:?}", config);
    let started = now();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(log_events(event_rx));

    let interval = Duration::from_millis(config.frame_interval_ms);
    let mut session = TeachableSession::new(config, Box::new(GridPoolExtractor::new(8)))
        .with_event_channel(event_tx);
    session.load()?;

    let session = Arc::new(Mutex::new(session));
    let frame_loop = Arc::new(FrameLoop::new(Arc::clone(&session), interval));

    info!("\n=== 训练「红」===");
    session.lock().start_training("红")?;
    run_frames(&frame_loop, red_frames(), 20).await;

    info!("\n=== 训练「绿」===");
    session.lock().start_training("绿")?;
    run_frames(&frame_loop, green_frames(), 20).await;
    session.lock().stop_training();

    info!("\n=== 分类 ===");
    for (name, frame) in [("偏红", tinted([200, 60, 40])), ("偏绿", tinted([50, 190, 70]))] {
        let prediction = session.lock().process_frame(&frame)?;
        let label = session.lock().classification().map(str::to_string);
        info!(
            "  {} @ {} -> {:?} {:?}",
            name,
            format_mmss_ms(frame.timestamp),
            label,
            prediction.map(|p| p.confidences)
        );
    }

    info!("\n=== 保存 / 加载 ===");
    let model = session.lock().save_model("红")?;
    session.lock().clear("红")?;
    session.lock().load_model("红", &model)?;
    info!("  红: {} 个样本", session.lock().sample_count("红")?);

    let snapshot = session.lock().snapshot()?;
    info!("  快照: {} 个标签, {} 字节", snapshot.classes.len(), snapshot.to_json()?.len());

    info!("\n=== 清除「绿」===");
    session.lock().clear("绿")?;
    info!("  统计: {:?}", session.lock().stats());

    info!("总耗时 {}", format_mmss_ms(now() - started));

    // 关闭事件通道
    drop(frame_loop);
    drop(session);
    events.await?;

    Ok(())
}

async fn run_frames(frame_loop: &Arc<FrameLoop>, frames: Vec<Frame>, count: usize) {
    let source = ReplaySource::new(frames).stop_after(count, frame_loop.handle());
    let stats = frame_loop.run(source).await;
    info!("  帧循环: {:?}", stats);
}

async fn log_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Confidences { .. } => {} // 每帧都有，太多
            other => info!("  事件: {}", other.to_json().unwrap_or_default()),
        }
    }
}

// ============================================================
// 模拟数据生成
// ============================================================

fn tinted(rgb: [u8; 3]) -> Frame {
    Frame::solid(rgb, 0.0, 64, 48)
}

fn red_frames() -> Vec<Frame> {
    (0..5u8)
        .map(|i| tinted([230 - i * 5, 20 + i * 3, 30]))
        .collect()
}

fn green_frames() -> Vec<Frame> {
    (0..5u8)
        .map(|i| tinted([30, 220 - i * 4, 40 + i * 2]))
        .collect()
}
