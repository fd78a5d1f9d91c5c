//! 工具执行池
//!
//! 后台工具执行各自独立成任务；Semaphore 只限制同时「运行中」的数量，
//! 排队中的执行仍计入会话的 pending 集合。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 进程级工具并发限制（所有会话共享）
#[derive(Clone, Debug)]
pub struct ToolPool {
    semaphore: Arc<Semaphore>,
}

impl ToolPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// 获取执行许可；池被关闭时返回 None
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ToolPool {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let pool = ToolPool::new(2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(ToolPool::new(0).available(), 1);
    }
}
