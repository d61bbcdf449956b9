//! 持续模式驱动循环

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::Result;
use crate::search_engine::manager::LogQueryEngine;
use crate::search_engine::session::{BatchResult, SearchHandle};

async fn drain_steps<F>(
    engine: &LogQueryEngine,
    handle: &mut SearchHandle,
    on_batch: &mut F,
) -> Result<()>
where
    F: FnMut(&BatchResult),
{
    loop {
        let batch = engine.step(handle)?;
        if !batch.records.is_empty() || batch.done {
            on_batch(&batch);
        }
        if batch.done {
            return Ok(());
        }
        tokio::task::yield_now().await;
    }
}

/**
 * 运行一次搜索并持续跟踪最新分段
 *
 * 先把搜索执行到结束，然后按配置的间隔轮询。每个非空批次（以及轮转通知）
 * 交给 `on_batch`。取消、窗口结束、达到列表上限或跟踪失败时返回。
 */
pub async fn run_follow<F>(
    engine: &LogQueryEngine,
    handle: &mut SearchHandle,
    mut on_batch: F,
) -> Result<()>
where
    F: FnMut(&BatchResult),
{
    drain_steps(engine, handle, &mut on_batch).await?;
    engine.enable_follow(handle);
    if !handle.is_following() {
        debug!(search_id = %handle.id(), state = ?handle.state(), "Nothing to follow");
        return Ok(());
    }

    let cancel = handle.cancel_token();
    let mut ticker = interval(Duration::from_millis(engine.config().follow_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = ticker.tick() => {}
        }

        let batch = engine.poll_follow(handle)?;
        if batch.rotated {
            on_batch(&batch);
            drain_steps(engine, handle, &mut on_batch).await?;
        } else if !batch.records.is_empty() {
            on_batch(&batch);
        }

        if !handle.is_following() {
            info!(
                search_id = %handle.id(),
                tail = ?handle.tail_state(),
                "Follow loop finished"
            );
            return Ok(());
        }
    }
}
