use std::fmt;

use glam::Vec3;
use spiralstream_common::InstanceId;

use crate::generator::Placement;

/// Notifications produced by every change to streamed content.
///
/// Collaborators that index content externally (renderers, targeting)
/// subscribe to these instead of polling.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    PlacementSpawned(Placement),
    PlacementRemoved(Placement),
    /// Render and collider toggled without freeing the placement.
    PlacementVisibility { id: InstanceId, visible: bool },
    EnemySpawned { id: InstanceId, position: Vec3 },
    EnemyRemoved { id: InstanceId },
    ProjectileFired { id: InstanceId, owner: InstanceId },
    ProjectileReleased { id: InstanceId },
}

/// Handle returned by [`EventHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&StreamEvent)>;

/// Per-level event dispatcher.
///
/// Each level owns its own hub, so independent levels never see each
/// other's events. Emitted events go to every listener and, while recording
/// is on, to a log the owner drains.
pub struct EventHub {
    listeners: Vec<(ListenerId, Listener)>,
    log: Vec<StreamEvent>,
    recording: bool,
    next_listener: u64,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            log: Vec::new(),
            recording: true,
            next_listener: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&StreamEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Detach a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: StreamEvent) {
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        if self.recording {
            self.log.push(event);
        }
    }

    /// Turn the drainable log on or off. Listeners are unaffected.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
        if !recording {
            self.log.clear();
        }
    }

    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.log)
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.log
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.log.len())
            .field("recording", &self.recording)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spiralstream_common::PoolKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn removed(slot: u32) -> StreamEvent {
        StreamEvent::EnemyRemoved {
            id: InstanceId::unowned(PoolKind::Enemy, slot, 1),
        }
    }

    #[test]
    fn listeners_receive_events_and_log_records_them() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut hub = EventHub::new();
        hub.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        hub.emit(removed(0));
        hub.emit(removed(1));

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(hub.drain_events().len(), 2);
        assert!(hub.events().is_empty());
    }

    #[test]
    fn unsubscribe_detaches_listener() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let mut hub = EventHub::new();
        let id = hub.subscribe(move |_| *sink.borrow_mut() += 1);

        hub.emit(removed(0));
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(removed(1));

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn separate_hubs_do_not_cross_talk() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let mut a = EventHub::new();
        let mut b = EventHub::new();
        a.subscribe(move |_| *sink.borrow_mut() += 1);

        b.emit(removed(0));
        assert_eq!(*count.borrow(), 0);
        assert!(a.events().is_empty());
    }

    #[test]
    fn recording_off_keeps_listeners() {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let mut hub = EventHub::new();
        hub.subscribe(move |_| *sink.borrow_mut() += 1);
        hub.set_recording(false);

        hub.emit(removed(0));
        assert_eq!(*count.borrow(), 1);
        assert!(hub.events().is_empty());
    }
}
