//! Session Driver
//!
//! Merges channel events and local input into one queue and feeds the
//! state machine one event at a time. The channel is closed on every
//! return path.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::game::role::Role;
use crate::network::channel::SessionChannel;
use crate::network::protocol::{JoinRequest, RoomToken};
use crate::network::session::{GameSession, LocalInput, SessionEvent, SessionView};

/// Receives a snapshot after every transition that changed the session.
pub trait SessionObserver {
    /// Called with the post-transition snapshot.
    fn on_update(&mut self, view: &SessionView);
}

impl<F: FnMut(&SessionView)> SessionObserver for F {
    fn on_update(&mut self, view: &SessionView) {
        self(view)
    }
}

/// Why [`run_session`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// Session reached Disconnected or Errored.
    Terminal,
    /// Local input source ended.
    UserLeft,
    /// Channel stopped delivering events without a terminal event.
    ChannelEnded,
}

/// Connect to `room` as `role` and run the session until it ends.
pub async fn join_room<O: SessionObserver>(
    config: &ClientConfig,
    room: RoomToken,
    role: Role,
    inputs: mpsc::Receiver<LocalInput>,
    observer: &mut O,
) -> (DriverExit, SessionView) {
    let request = JoinRequest {
        room,
        joining: role.is_joiner(),
    };
    info!("Joining room {} as {} player", request.room, role);
    let channel = SessionChannel::connect(config, request);
    run_session(channel, role, inputs, observer).await
}

/// Drive a session over an already started channel.
pub async fn run_session<O: SessionObserver>(
    mut channel: SessionChannel,
    role: Role,
    mut inputs: mpsc::Receiver<LocalInput>,
    observer: &mut O,
) -> (DriverExit, SessionView) {
    let mut session = GameSession::new(role, channel.handle());
    observer.on_update(&session.view());

    let exit = loop {
        let event = tokio::select! {
            event = channel.next_event() => match event {
                Some(event) => SessionEvent::Channel(event),
                None => break DriverExit::ChannelEnded,
            },
            input = inputs.recv() => match input {
                Some(input) => SessionEvent::Local(input),
                None => break DriverExit::UserLeft,
            },
        };

        debug!("Session event: {:?}", event);
        if session.handle(event) {
            observer.on_update(&session.view());
        }
        if session.is_terminal() {
            break DriverExit::Terminal;
        }
    };

    info!("Session finished: {:?}", exit);
    channel.close().await;
    (exit, session.view())
}
