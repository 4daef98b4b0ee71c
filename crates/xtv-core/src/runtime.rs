//! Message-passing host loop
//!
//! A spawned task owns the [`PlayerController`]; everything else talks to
//! it through a [`PlayerHandle`]. The loop keeps at most one timer armed:
//! the controller's next deadline.

use crate::{
    controller::{Command, PlayerController, PlayerEvent},
    element::{FullscreenTarget, MediaElement},
    engine::EngineFactory,
    Error, PlaybackRequest, PlayerIntent, PlayerSnapshot, Result,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

enum Message {
    Event(PlayerEvent),
    Load {
        request: PlaybackRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Unmount,
}

/// Handle to a controller running on its own task
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<PlayerSnapshot>,
    intents: Option<mpsc::UnboundedReceiver<PlayerIntent>>,
    task: JoinHandle<()>,
}

/// Move `controller` onto a new task
pub fn spawn_player<M, C, F>(mut controller: PlayerController<M, C, F>) -> PlayerHandle
where
    M: MediaElement + Send + 'static,
    C: FullscreenTarget + Send + 'static,
    F: EngineFactory + Send + 'static,
    F::Engine: Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let state = controller.subscribe();
    let intents = controller.take_intents();

    let task = tokio::spawn(async move {
        let origin = Instant::now();
        loop {
            let message = match controller.next_deadline() {
                Some(deadline) => tokio::select! {
                    message = rx.recv() => message,
                    _ = tokio::time::sleep_until(origin + deadline) => {
                        controller.dispatch(PlayerEvent::Tick, origin.elapsed());
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            match message {
                Some(Message::Event(event)) => controller.dispatch(event, origin.elapsed()),
                Some(Message::Load { request, reply }) => {
                    let result = controller.load(request, origin.elapsed());
                    if reply.send(result).is_err() {
                        debug!("Load caller went away");
                    }
                }
                Some(Message::Unmount) | None => {
                    controller.unmount();
                    break;
                }
            }
        }
        info!("Player task stopped");
    });

    PlayerHandle {
        tx,
        state,
        intents,
        task,
    }
}

impl PlayerHandle {
    /// Post an event to the controller
    pub fn dispatch(&self, event: PlayerEvent) -> Result<()> {
        self.tx
            .send(Message::Event(event))
            .map_err(|_| Error::NotMounted)
    }

    pub fn command(&self, command: Command) -> Result<()> {
        self.dispatch(PlayerEvent::Command(command))
    }

    /// Start a session and wait for the attach outcome
    pub async fn load(&self, request: PlaybackRequest) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Message::Load { request, reply })
            .map_err(|_| Error::NotMounted)?;
        response.await.map_err(|_| Error::NotMounted)?
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.state.clone()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.state.borrow().clone()
    }

    pub fn take_intents(&mut self) -> Option<mpsc::UnboundedReceiver<PlayerIntent>> {
        self.intents.take()
    }

    /// Tear the controller down and wait for its task to finish
    pub async fn unmount(self) {
        if self.tx.send(Message::Unmount).is_err() {
            debug!("Player task already stopped");
        }
        if let Err(e) = self.task.await {
            debug!(error = %e, "Player task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{headless_controller, HostCall};
    use crate::playback::MediaEvent;
    use crate::{ContentKind, PlayerConfig, PlayerPhase};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_controls_hide_after_inactivity() {
        let (controller, _log) = headless_controller(PlayerConfig::default());
        let handle = spawn_player(controller);
        handle
            .load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie))
            .await
            .unwrap();
        handle
            .dispatch(PlayerEvent::Media(MediaEvent::LoadedMetadata {
                duration: Some(100.0),
            }))
            .unwrap();
        handle.dispatch(PlayerEvent::Media(MediaEvent::Play)).unwrap();

        let state = handle.subscribe();
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(state.borrow().controls_visible);
        assert!(state.borrow().playback.is_playing);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!state.borrow().controls_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_player_keeps_controls() {
        let (controller, _log) = headless_controller(PlayerConfig::default());
        let handle = spawn_player(controller);
        handle
            .load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.snapshot().controls_visible);
        assert_eq!(handle.snapshot().phase, PlayerPhase::Loading);
    }

    #[tokio::test]
    async fn test_intents_reach_the_page() {
        let (controller, _log) = headless_controller(PlayerConfig::default());
        let mut handle = spawn_player(controller);
        let mut intents = handle.take_intents().unwrap();

        handle.command(Command::Back).unwrap();
        assert_eq!(intents.recv().await, Some(PlayerIntent::Back));
    }

    #[tokio::test]
    async fn test_load_reports_attach_errors() {
        let (controller, _log) = headless_controller(PlayerConfig::default());
        let handle = spawn_player(controller);
        let result = handle
            .load(PlaybackRequest::new("  ", ContentKind::Live))
            .await;
        assert!(matches!(result, Err(Error::InvalidStreamUrl(_))));
    }

    #[tokio::test]
    async fn test_unmount_tears_down() {
        let (controller, log) = headless_controller(PlayerConfig::default());
        let handle = spawn_player(controller);
        handle
            .load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live))
            .await
            .unwrap();
        let tx = handle.tx.clone();

        handle.unmount().await;
        assert_eq!(log.count(&HostCall::EngineDestroy), 1);
        assert!(tx.send(Message::Unmount).is_err());
    }
}
