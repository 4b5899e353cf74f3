//! 进度流 - 编排层
//!
//! 基于游标的轮询读取：每次取游标之后的事件依次交付，没有新事件时睡眠固定间隔，
//! 任务到达终态且没有剩余事件时结束。

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::RegistryError;
use crate::infrastructure::JobRegistry;
use crate::models::job::Event;

/// 按 id 升序交付的事件流
pub type EventStream = BoxStream<'static, Event>;

struct Cursor {
    registry: Arc<JobRegistry>,
    job_id: String,
    last_event_id: u64,
    pending: VecDeque<Event>,
    poll_interval: Duration,
}

/// 订阅任务进度
///
/// 任务不存在时立即返回 `NotFound`；订阅期间任务被清理则流直接结束
pub fn stream_events(
    registry: Arc<JobRegistry>,
    job_id: &str,
    last_event_id: u64,
    poll_interval: Duration,
) -> Result<EventStream, RegistryError> {
    let first = registry.events_after(job_id, last_event_id)?;

    let cursor = Cursor {
        registry,
        job_id: job_id.to_string(),
        last_event_id,
        pending: first.events.into(),
        poll_interval,
    };

    let events = stream::unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(event) = cursor.pending.pop_front() {
                cursor.last_event_id = event.id;
                return Some((event, cursor));
            }

            let batch = match cursor
                .registry
                .events_after(&cursor.job_id, cursor.last_event_id)
            {
                Ok(batch) => batch,
                Err(e) => {
                    debug!("进度流结束: {}", e);
                    return None;
                }
            };

            if batch.events.is_empty() {
                if batch.status.is_terminal() {
                    return None;
                }
                tokio::time::sleep(cursor.poll_interval).await;
            } else {
                cursor.pending.extend(batch.events);
            }
        }
    });

    Ok(events.boxed())
}
