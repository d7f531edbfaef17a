//! 帧循环
//!
//! 每个 tick 从帧源取一帧，交给会话处理，处理完成后才进入下一个 tick。
//! 同一时间最多只有一帧在处理，训练和分类不会并发修改样本。
//! `stop` 递增代数，正在处理的帧会跑完，但结果被丢弃。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::buffer::frame::Frame;
use crate::core::session::TeachableSession;
use crate::error::TeachableError;

/// 多个任务共享的会话
pub type SharedSession = Arc<Mutex<TeachableSession>>;

/// 帧源 (摄像头)
pub trait FrameSource: Send {
    /// 下一帧；视频没有在播放时返回 None
    fn next_frame(&mut self) -> Option<Frame>;
}

/// 帧循环统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLoopStats {
    /// tick 次数
    pub ticks: u64,
    /// 已提交的帧
    pub processed: u64,
    /// 没有帧或会话未就绪
    pub skipped: u64,
    /// 处理出错
    pub failed: u64,
    /// 停止后被丢弃的结果
    pub discarded: u64,
}

/// 停止帧循环的句柄
#[derive(Debug, Clone)]
pub struct LoopHandle {
    generation: Arc<AtomicU64>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    /// 停止正在运行的循环
    ///
    /// 只作用于当前这一代；循环没有运行时调用无效，之后的 `run` 照常开始。
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_tx.send_replace(true);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// 帧循环
pub struct FrameLoop {
    session: SharedSession,
    interval: Duration,
    handle: LoopHandle,
}

impl FrameLoop {
    pub fn new(session: SharedSession, interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            session,
            interval,
            handle: LoopHandle {
                generation: Arc::new(AtomicU64::new(0)),
                stop_tx: Arc::new(stop_tx),
            },
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// 运行直到 `stop`
    ///
    /// 每次调用开始新的一代，仍在运行的旧循环被唤醒后退出，
    /// 它正在处理的帧结果被丢弃。同一时间只有一个循环在驱动会话。
    pub async fn run<S: FrameSource + 'static>(&self, mut source: S) -> FrameLoopStats {
        let generation = self.handle.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.handle.stop_tx.send_replace(false);
        let mut stop_rx = self.handle.stop_tx.subscribe();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = FrameLoopStats::default();
        info!("帧循环启动: 第 {} 代, 间隔 {:?}", generation, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => {}
            }
            if self.handle.generation() != generation {
                break;
            }
            stats.ticks += 1;

            let Some(frame) = source.next_frame() else {
                stats.skipped += 1;
                continue;
            };

            // 在阻塞线程上处理，等它结束再取下一帧
            let session = Arc::clone(&self.session);
            let result = tokio::task::spawn_blocking(move || session.lock().observe(&frame)).await;

            match result {
                Ok(Ok(outcome)) => {
                    if self.handle.generation() != generation {
                        debug!("丢弃已停止循环的结果: t={:.3}", outcome.timestamp);
                        stats.discarded += 1;
                        break;
                    }
                    self.session.lock().apply(outcome);
                    stats.processed += 1;
                }
                Ok(Err(TeachableError::NotReady(reason))) => {
                    debug!("跳过帧: {}", reason);
                    stats.skipped += 1;
                }
                Ok(Err(e)) => {
                    warn!("帧处理失败: {}", e);
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!("帧处理任务异常: {}", e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "帧循环停止: 处理 {} 帧, 跳过 {}, 失败 {}, 丢弃 {}",
            stats.processed, stats.skipped, stats.failed, stats.discarded
        );
        stats
    }
}

/// 循环播放的一组帧，用于演示和测试
pub struct ReplaySource {
    frames: Vec<Frame>,
    position: usize,
    /// 播放完一遍后停止
    stop_after: Option<(usize, LoopHandle)>,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            position: 0,
            stop_after: None,
        }
    }

    /// 取出 `count` 帧后停止循环
    pub fn stop_after(mut self, count: usize, handle: LoopHandle) -> Self {
        self.stop_after = Some((count, handle));
        self
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.frames.is_empty() {
            return None;
        }
        if let Some((count, handle)) = &self.stop_after {
            if self.position >= *count {
                handle.stop();
                return None;
            }
        }

        let mut frame = self.frames[self.position % self.frames.len()].clone();
        frame.timestamp = self.position as f64 / 60.0;
        self.position += 1;
        Some(frame)
    }
}
