use std::future::Future;
use std::sync::Arc;

use bevy::prelude::Resource;

mod bevy_runtime;

/// A runtime that can drive the engine's loops.
///
/// The loops only rely on executor independent primitives, so any executor
/// able to spawn `Send` futures works.
pub trait Runtime: Send + Sync + 'static {
    /// Handle to a spawned task.
    type JoinHandle: JoinHandle;

    /// Spawns `task` onto the runtime.
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle;
}

/// A handle to a spawned task.
pub trait JoinHandle: Send + 'static {
    /// Stops the task if the runtime supports it.
    ///
    /// Runtimes that detach their tasks make this a no-op; the loops still
    /// stop through their [`StopToken`](crate::StopToken).
    fn abort(&mut self);
}

/// The runtime used by [`FlightLinkPlugin`](crate::FlightLinkPlugin) to spawn
/// the engine loops.
///
/// The runtime is shared so that connect tasks spawned on it can start the
/// loops on the same runtime once connected.
#[derive(Resource)]
pub struct FlightLinkRuntime<RT: Runtime = bevy::tasks::TaskPool>(pub Arc<RT>);

impl<RT: Runtime> FlightLinkRuntime<RT> {
    /// Wraps `runtime`.
    pub fn new(runtime: RT) -> Self {
        Self(Arc::new(runtime))
    }
}

pub(crate) fn run_async<F, RT>(task: F, runtime: &RT) -> Box<dyn JoinHandle>
where
    F: Future<Output = ()> + Send + 'static,
    RT: Runtime,
{
    Box::new(runtime.spawn(task))
}
