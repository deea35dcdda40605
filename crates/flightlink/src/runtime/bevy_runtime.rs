use std::future::Future;

use super::{JoinHandle, Runtime};

impl Runtime for bevy::tasks::TaskPool {
    type JoinHandle = Option<bevy::tasks::Task<()>>;

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle {
        tracing::trace!("[TaskPool::spawn] Spawning and detaching task");
        self.spawn(task).detach();
        None
    }
}

impl JoinHandle for Option<bevy::tasks::Task<()>> {
    fn abort(&mut self) {
        self.take();
    }
}
