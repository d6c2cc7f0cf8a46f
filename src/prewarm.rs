//! 空闲预热任务
//!
//! 显式调度、可取消：`schedule` 记录候选对象，宿主在空闲时调用 `run_idle`
//! 逐个渲染，直到截止时间或队列为空。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sc_rendering::DrawableId;

/// 预热任务句柄
#[derive(Debug, Clone, Default)]
pub struct PrewarmHandle {
    cancelled: Arc<AtomicBool>,
}

impl PrewarmHandle {
    /// 取消任务，剩余对象不再渲染
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// 预热任务
#[derive(Debug, Default)]
pub struct PrewarmTask {
    queue: VecDeque<DrawableId>,
    handle: PrewarmHandle,
}

impl PrewarmTask {
    pub fn new(ids: impl IntoIterator<Item = DrawableId>) -> Self {
        Self {
            queue: ids.into_iter().collect(),
            handle: PrewarmHandle::default(),
        }
    }

    pub fn handle(&self) -> PrewarmHandle {
        self.handle.clone()
    }

    /// 取出下一个对象；已取消时清空队列
    pub fn next_id(&mut self) -> Option<DrawableId> {
        if self.handle.is_cancelled() {
            self.queue.clear();
            return None;
        }
        self.queue.pop_front()
    }

    /// 截止时间到达时把未处理的对象放回队首
    pub fn requeue(&mut self, id: DrawableId) {
        self.queue.push_front(id);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// 队列为空或已取消
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() || self.handle.is_cancelled()
    }

    /// 从队列中移除某个对象（对象被删除或修改时）
    pub fn forget(&mut self, id: DrawableId) {
        self.queue.retain(|&queued| queued != id);
    }
}
