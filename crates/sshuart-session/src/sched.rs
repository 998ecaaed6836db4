//! 協調スケジューリングのフック

/// セッションのループが毎回呼び出すスケジューラ
///
/// RTOS では `taskYIELD()` やウォッチドッグのリセットに対応付ける。
pub trait Scheduler {
    /// 他のタスクに実行権を譲る
    fn yield_now(&mut self);

    /// ウォッチドッグに生存を通知する（任意）
    fn feed_watchdog(&mut self) {}
}

/// スピンヒントだけを出すスケジューラ
///
/// ホスト上のテストや、プリエンプティブなスケジューラ上で使う。
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinScheduler;

impl Scheduler for SpinScheduler {
    fn yield_now(&mut self) {
        core::hint::spin_loop();
    }
}
