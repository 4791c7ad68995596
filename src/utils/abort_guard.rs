use tokio::task::{AbortHandle, JoinHandle};

/// Aborts a spawned task when dropped. Aborting a task that already finished is a no-op.
pub struct AbortOnDrop(AbortHandle);

impl AbortOnDrop {
    pub fn new<T>(task: &JoinHandle<T>) -> Self {
        Self(task.abort_handle())
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dropping_the_guard_aborts_the_task() {
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        drop(AbortOnDrop::new(&task));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn finished_task_keeps_its_output() {
        let task = tokio::spawn(async { 7 });
        let guard = AbortOnDrop::new(&task);
        tokio::task::yield_now().await;
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        drop(guard);
        assert_eq!(task.await.unwrap(), 7);
    }
}
