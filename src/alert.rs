// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预警汇总与告警线程 (Warning aggregation & alert worker)
//!
//! 帧处理线程是 [`WarningFlag`] 唯一的写入方, 告警线程是唯一的读取方。
//! 告警线程按固定间隔轮询标记; 停止信号通过通道发送, 线程在一个轮询
//! 周期内退出, 退出前关闭正在进行的告警。

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

// ========== 预警标记 ==========

/// 全局预警标记 ("任意轨迹处于预警中")
#[derive(Clone, Debug, Default)]
pub struct WarningFlag {
    inner: Arc<Mutex<bool>>,
}

impl WarningFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, warning: bool) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *guard = warning;
    }

    pub fn get(&self) -> bool {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ========== 告警输出 ==========

/// 告警输出端 (蜂鸣器、音频、LED...)
///
/// 所有方法在告警线程中调用, 必须快速返回。
pub trait AlertSink: Send + 'static {
    /// 开始一次告警 (例如播放一段提示音)
    fn start(&mut self);

    /// 本次告警是否仍在进行
    fn is_active(&self) -> bool;

    /// 立即停止告警
    fn stop(&mut self);
}

/// 日志告警: 每次告警写一条日志, 并按固定时长模拟一段提示音
pub struct LogAlertSink {
    clip: Duration,
    started: Option<Instant>,
    count: u64,
}

impl LogAlertSink {
    pub fn new(clip: Duration) -> Self {
        Self {
            clip,
            started: None,
            count: 0,
        }
    }

    /// 已触发的告警次数
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl AlertSink for LogAlertSink {
    fn start(&mut self) {
        self.count += 1;
        self.started = Some(Instant::now());
        log::warn!("🔊 碰撞预警! 车辆正在接近 (第 {} 次)", self.count);
    }

    fn is_active(&self) -> bool {
        self.started
            .map(|t| t.elapsed() < self.clip)
            .unwrap_or(false)
    }

    fn stop(&mut self) {
        if self.started.take().is_some() {
            log::info!("🔇 告警停止");
        }
    }
}

// ========== 告警线程 ==========

/// 告警线程控制消息
#[derive(Clone, Debug)]
enum AlertControl {
    Shutdown,
}

/// 后台告警线程
///
/// 标记为真时启动告警, 上一次告警结束而标记仍为真时再次启动;
/// 标记为假时停止正在进行的告警。
pub struct AlertWorker {
    control: Sender<AlertControl>,
    handle: Option<JoinHandle<()>>,
}

impl AlertWorker {
    /// 启动告警线程
    pub fn spawn<S: AlertSink>(
        flag: WarningFlag,
        sink: S,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let (control, rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("alert-worker".to_string())
            .spawn(move || alert_loop(flag, sink, rx, poll_interval))?;

        log::info!("✅ 告警线程启动 (轮询间隔 {:?})", poll_interval);
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// 停止告警线程并等待其退出 (最多约一个轮询周期)
    ///
    /// 返回后不会再有任何告警被触发。
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // 线程已退出时通道断开, 忽略发送失败
        let _ = self.control.try_send(AlertControl::Shutdown);
        if handle.join().is_err() {
            log::error!("❌ 告警线程异常退出");
        } else {
            log::info!("🛑 告警线程已停止");
        }
    }
}

impl Drop for AlertWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn alert_loop<S: AlertSink>(
    flag: WarningFlag,
    mut sink: S,
    control: Receiver<AlertControl>,
    poll_interval: Duration,
) {
    loop {
        if flag.get() {
            if !sink.is_active() {
                sink.start();
            }
        } else if sink.is_active() {
            sink.stop();
        }

        match control.recv_timeout(poll_interval) {
            Ok(AlertControl::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if sink.is_active() {
        sink.stop();
    }
}
