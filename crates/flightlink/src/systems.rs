use std::sync::Arc;

use async_channel::Receiver;
use bevy::prelude::*;

use crate::runtime::run_async;
use crate::{
    FlightLink, FlightLinkRuntime, LinkAdvisory, LinkCommand, PropertyChanged, Runtime, SyncEngine,
    Transport,
};

pub(crate) fn handle_link_commands<T: Transport, RT: Runtime>(
    link: Res<FlightLink<T>>,
    runtime: Option<Res<FlightLinkRuntime<RT>>>,
    mut commands: MessageReader<LinkCommand>,
    mut driving: Local<bool>,
) {
    for command in commands.read() {
        if let LinkCommand::SetControl { control, value } = command {
            if let Err(err) = link.set_control(*control, *value) {
                warn!("Ignoring {:?} input: {}", control, err);
            }
            continue;
        }

        let Some(runtime) = runtime.as_ref() else {
            error!(
                "{:?} needs a FlightLinkRuntime resource, none was inserted",
                command
            );
            continue;
        };

        if !*driving {
            // Detached, it ends once the resource and its sender are dropped.
            drop(run_async(
                drive_lifecycle(
                    link.engine().clone(),
                    runtime.0.clone(),
                    link.lifecycle.receiver.clone(),
                ),
                &*runtime.0,
            ));
            *driving = true;
        }

        if let Err(err) = link.lifecycle.sender.try_send(command.clone()) {
            error!("Could not queue {:?}: {}", command, err);
        }
    }
}

/// Runs lifecycle commands one at a time, so a `Disconnect` written after a
/// `Connect` always wins.
async fn drive_lifecycle<T: Transport, RT: Runtime>(
    engine: SyncEngine<T>,
    runtime: Arc<RT>,
    commands: Receiver<LinkCommand>,
) {
    while let Ok(command) = commands.recv().await {
        debug!("Running {:?}", command);
        match command {
            LinkCommand::Connect => match engine.connect_configured().await {
                Ok(()) => {
                    if let Err(err) = engine.start(&*runtime) {
                        error!("Could not start syncing: {}", err);
                    }
                }
                Err(err) => warn!("Connection failed: {}", err),
            },
            LinkCommand::Disconnect => engine.disconnect().await,
            LinkCommand::Reconnect => engine.reconnect().await,
            LinkCommand::SetControl { .. } => (),
        }
    }
    debug!("Lifecycle commands closed");
}

pub(crate) fn relay_link_events<T: Transport>(
    link: Res<FlightLink<T>>,
    mut changes: MessageWriter<PropertyChanged>,
    mut advisories: MessageWriter<LinkAdvisory>,
) {
    while let Ok(field) = link.changes.try_recv() {
        changes.write(PropertyChanged {
            field,
            value: link.store().get(field),
        });
    }

    while let Ok(advisory) = link.advisories.try_recv() {
        advisories.write(LinkAdvisory(advisory));
    }
}
